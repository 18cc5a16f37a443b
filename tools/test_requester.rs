//! Test Request Generator
//!
//! Sends synthetic pull request descriptions to the scoring service and logs
//! the replies. Falls back to a dry run when NATS is unreachable.

use clap::Parser;
use pr_risk_prediction::types::ScoreResponse;
use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "test-requester", about = "Send synthetic PR scoring requests")]
struct Args {
    #[arg(long, default_value = "nats://localhost:4222")]
    nats_url: String,

    #[arg(long, default_value = "pr.risk.score")]
    subject: String,

    /// Number of requests to send
    #[arg(long, default_value_t = 100)]
    count: u64,

    /// Share of requests shaped like large, risky changes
    #[arg(long, default_value_t = 0.2)]
    risky_rate: f64,

    #[arg(long, default_value_t = 100)]
    delay_ms: u64,

    /// Print requests without connecting
    #[arg(long)]
    dry_run: bool,
}

/// Request body in the shape the service accepts
#[derive(Debug, Clone, Serialize)]
struct PrRequest {
    lines_added: u64,
    lines_deleted: u64,
    files_changed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    author_association: Option<&'static str>,
}

struct RequestGenerator {
    rng: rand::rngs::ThreadRng,
}

impl RequestGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    fn generate_routine(&mut self) -> PrRequest {
        PrRequest {
            lines_added: self.rng.gen_range(1..120),
            lines_deleted: self.rng.gen_range(0..60),
            files_changed: self.rng.gen_range(1..6),
            author_association: self.author(&["MEMBER", "OWNER", "COLLABORATOR"]),
        }
    }

    fn generate_risky(&mut self) -> PrRequest {
        PrRequest {
            lines_added: self.rng.gen_range(800..5000),
            lines_deleted: self.rng.gen_range(0..40),
            files_changed: self.rng.gen_range(15..80),
            author_association: self.author(&["FIRST_TIME_CONTRIBUTOR", "CONTRIBUTOR", "NONE"]),
        }
    }

    /// Occasionally omit the association to exercise the all-zero one-hot path
    fn author(&mut self, choices: &[&'static str]) -> Option<&'static str> {
        if self.rng.gen_bool(0.1) {
            return None;
        }
        Some(choices[self.rng.gen_range(0..choices.len())])
    }

    fn draw(&mut self, risky_rate: f64) -> (PrRequest, bool) {
        if self.rng.gen_bool(risky_rate) {
            (self.generate_risky(), true)
        } else {
            (self.generate_routine(), false)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_requester=info".parse()?),
        )
        .init();

    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.risky_rate) {
        anyhow::bail!("--risky-rate must be in [0, 1], got {}", args.risky_rate);
    }
    info!(?args, "Starting test requester");

    if args.dry_run {
        return run_dry_mode(&args).await;
    }

    let client = match async_nats::connect(&args.nats_url).await {
        Ok(c) => {
            info!(url = %args.nats_url, "Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(&args).await;
        }
    };

    let mut generator = RequestGenerator::new();
    let mut scored = 0u64;
    let mut errors = 0u64;

    for i in 0..args.count {
        let (request, risky) = generator.draw(args.risky_rate);
        let payload = serde_json::to_vec(&request)?;

        match client.request(args.subject.clone(), payload.into()).await {
            Ok(reply) => match serde_json::from_slice::<ScoreResponse>(&reply.payload) {
                Ok(ScoreResponse::Score(body)) => {
                    scored += 1;
                    info!(
                        request = i + 1,
                        risky,
                        lines_added = request.lines_added,
                        risk_score = body.risk_score,
                        decision = ?body.decision,
                        "Scored"
                    );
                }
                Ok(ScoreResponse::Error(body)) => {
                    errors += 1;
                    warn!(request = i + 1, kind = %body.kind, error = %body.error, "Service error");
                }
                Err(e) => {
                    errors += 1;
                    warn!(request = i + 1, error = %e, "Unreadable reply");
                }
            },
            Err(e) => {
                errors += 1;
                warn!(request = i + 1, error = %e, "Request failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
    }

    info!(sent = args.count, scored, errors, "Completed");
    Ok(())
}

async fn run_dry_mode(args: &Args) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RequestGenerator::new();
    for i in 0..args.count {
        let (request, risky) = generator.draw(args.risky_rate);
        if (i + 1) % 10 == 0 || i == 0 {
            info!(risky, "Sample request {}: {}", i + 1, serde_json::to_string(&request)?);
        }
        tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
    }
    Ok(())
}
