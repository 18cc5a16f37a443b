//! Pull request records as seen by the scorer and the training pipeline

use crate::error::ScoringError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Request field names
pub const FIELD_LINES_ADDED: &str = "lines_added";
pub const FIELD_LINES_DELETED: &str = "lines_deleted";
pub const FIELD_FILES_CHANGED: &str = "files_changed";
pub const FIELD_AUTHOR_ASSOCIATION: &str = "author_association";

/// Columns that identify or label a record and must never become features
pub const NON_FEATURE_FIELDS: [&str; 2] = ["pr_number", "build_status"];

/// Relationship of the PR author to the repository.
///
/// Known GitHub values map to dedicated variants; anything else is kept
/// (upper-cased) in `Other` so the one-hot column name stays stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthorAssociation {
    Owner,
    Member,
    Collaborator,
    Contributor,
    FirstTimeContributor,
    FirstTimer,
    Mannequin,
    None,
    Other(String),
}

impl AuthorAssociation {
    /// Canonical upper-case value, as reported by the source-control API
    pub fn as_str(&self) -> &str {
        match self {
            Self::Owner => "OWNER",
            Self::Member => "MEMBER",
            Self::Collaborator => "COLLABORATOR",
            Self::Contributor => "CONTRIBUTOR",
            Self::FirstTimeContributor => "FIRST_TIME_CONTRIBUTOR",
            Self::FirstTimer => "FIRST_TIMER",
            Self::Mannequin => "MANNEQUIN",
            Self::None => "NONE",
            Self::Other(value) => value,
        }
    }

    /// Parse a raw value; blank strings mean "not provided"
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self::from(trimmed.to_string()))
    }
}

impl From<String> for AuthorAssociation {
    fn from(raw: String) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "OWNER" => Self::Owner,
            "MEMBER" => Self::Member,
            "COLLABORATOR" => Self::Collaborator,
            "CONTRIBUTOR" => Self::Contributor,
            "FIRST_TIME_CONTRIBUTOR" => Self::FirstTimeContributor,
            "FIRST_TIMER" => Self::FirstTimer,
            "MANNEQUIN" => Self::Mannequin,
            "NONE" => Self::None,
            _ => Self::Other(upper),
        }
    }
}

impl From<AuthorAssociation> for String {
    fn from(value: AuthorAssociation) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AuthorAssociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural metrics of one pull request.
///
/// Counts are unsigned, so the non-negativity invariant holds by construction.
/// `extra` carries additional numeric columns (pre-computed features) that the
/// schema may or may not know about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub lines_added: u64,
    #[serde(default)]
    pub lines_deleted: u64,
    #[serde(default)]
    pub files_changed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_association: Option<AuthorAssociation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl RawRecord {
    /// Create a record from the three count fields
    pub fn new(lines_added: u64, lines_deleted: u64, files_changed: u64) -> Self {
        Self {
            lines_added,
            lines_deleted,
            files_changed,
            ..Default::default()
        }
    }

    /// Attach an author association
    pub fn with_author(mut self, association: AuthorAssociation) -> Self {
        self.author_association = Some(association);
        self
    }

    /// Attach an additional numeric column
    pub fn with_extra(mut self, name: impl Into<String>, value: f64) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Validate and convert an inbound request body.
    ///
    /// `lines_added` is required; at least one of `lines_deleted` and
    /// `files_changed` must be present and the other defaults to 0.
    /// Additional numeric fields are kept in `extra`; non-numeric unknown
    /// fields are ignored.
    pub fn from_request(body: &Value) -> Result<Self, ScoringError> {
        let object = body.as_object().ok_or_else(|| {
            ScoringError::InputValidation("request body must be a JSON object".to_string())
        })?;

        let lines_added = count_field(object, FIELD_LINES_ADDED)?.ok_or_else(|| {
            ScoringError::InputValidation(format!("missing required field `{FIELD_LINES_ADDED}`"))
        })?;
        let lines_deleted = count_field(object, FIELD_LINES_DELETED)?;
        let files_changed = count_field(object, FIELD_FILES_CHANGED)?;
        if lines_deleted.is_none() && files_changed.is_none() {
            return Err(ScoringError::InputValidation(format!(
                "at least one of `{FIELD_LINES_DELETED}` or `{FIELD_FILES_CHANGED}` is required"
            )));
        }

        let author_association = match object.get(FIELD_AUTHOR_ASSOCIATION) {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => AuthorAssociation::parse(raw),
            Some(other) => {
                return Err(ScoringError::InputValidation(format!(
                    "`{FIELD_AUTHOR_ASSOCIATION}` must be a string, got {other}"
                )))
            }
        };

        let extra = object
            .iter()
            .filter(|(name, _)| !is_reserved_field(name))
            .filter_map(|(name, value)| {
                value
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .map(|v| (name.clone(), v))
            })
            .collect();

        Ok(Self {
            lines_added,
            lines_deleted: lines_deleted.unwrap_or(0),
            files_changed: files_changed.unwrap_or(0),
            author_association,
            extra,
        })
    }
}

fn is_reserved_field(name: &str) -> bool {
    matches!(
        name,
        FIELD_LINES_ADDED | FIELD_LINES_DELETED | FIELD_FILES_CHANGED | FIELD_AUTHOR_ASSOCIATION
    ) || NON_FEATURE_FIELDS.contains(&name)
}

/// Read a non-negative integer field; `null` is treated as absent.
fn count_field(object: &Map<String, Value>, name: &str) -> Result<Option<u64>, ScoringError> {
    let value = match object.get(name) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    if let Some(count) = value.as_u64() {
        return Ok(Some(count));
    }

    // Integral floats (10.0) are accepted, fractional or negative values are not
    match value.as_f64() {
        Some(v) if v < 0.0 => Err(ScoringError::InputValidation(format!(
            "`{name}` must be >= 0, got {v}"
        ))),
        Some(v) if v.is_finite() && v.fract() == 0.0 && v <= u64::MAX as f64 => {
            Ok(Some(v as u64))
        }
        _ => Err(ScoringError::InputValidation(format!(
            "`{name}` must be a non-negative integer, got {value}"
        ))),
    }
}

/// Binary build outcome used as the training label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Success,
    Failure,
}

impl Label {
    /// Map a `build_status` value (0 = success, 1 = failure)
    pub fn from_status(status: f64) -> Option<Self> {
        if status == 0.0 {
            Some(Self::Success)
        } else if status == 1.0 {
            Some(Self::Failure)
        } else {
            None
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failure)
    }

    /// 1.0 for failure, 0.0 for success
    pub fn target(self) -> f64 {
        if self.is_failure() {
            1.0
        } else {
            0.0
        }
    }
}
