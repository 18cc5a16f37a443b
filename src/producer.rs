//! Replies to scoring requests over NATS

use crate::types::ScoreResponse;
use anyhow::{Context, Result};
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes a [`ScoreResponse`] to a request's reply inbox
#[derive(Clone)]
pub struct ReplyPublisher {
    client: Client,
}

impl ReplyPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn reply(&self, reply_to: Subject, response: &ScoreResponse) -> Result<()> {
        let payload = response.to_bytes();
        self.client
            .publish(reply_to.clone(), payload.into())
            .await
            .with_context(|| format!("failed to publish reply to {reply_to}"))?;

        debug!(reply_to = %reply_to, error = response.is_error(), "Reply published");
        Ok(())
    }
}
