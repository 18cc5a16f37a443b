//! PR Risk Scoring Service - Main Entry Point
//!
//! Answers scoring requests arriving over NATS request/reply. Requests are
//! handled in parallel, bounded by `pipeline.workers`.

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use pr_risk_prediction::{
    config::AppConfig,
    consumer::RequestConsumer,
    logging::init_logging,
    metrics::{MetricsReporter, ServiceMetrics},
    models::ArtifactStore,
    producer::ReplyPublisher,
    scoring::RiskScorer,
    service::ScoringService,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "pr-risk-service", about = "Serve PR failure-risk scores over NATS")]
struct Args {
    /// Configuration file
    #[arg(long, env = "PR_RISK_CONFIG", default_value = "config/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    init_logging(&config.logging, "pr_risk_prediction")?;

    info!("Starting PR Risk Scoring Service");
    info!(mode = ?config.scoring.mode, "Configuration loaded successfully");

    let metrics = Arc::new(ServiceMetrics::new());

    // A failed load keeps the service up but answers every request with a
    // configuration error
    let store = ArtifactStore::from_config(&config.artifacts);
    let scorer = RiskScorer::load(&store, &config.scoring);
    if !scorer.is_ready() {
        warn!("Scorer unavailable, all requests will be refused");
    }
    let service = Arc::new(ScoringService::new(
        scorer,
        config.scoring.mode,
        metrics.clone(),
    ));

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(
        client.clone(),
        &config.nats.request_subject,
        &config.nats.queue_group,
    );
    let publisher = ReplyPublisher::new(client.clone());

    let num_workers = config.pipeline.workers;
    info!(
        workers = num_workers,
        subject = %consumer.subject(),
        queue_group = %consumer.queue_group(),
        "Starting request loop"
    );

    let semaphore = Arc::new(Semaphore::new(num_workers));
    let handled = Arc::new(AtomicU64::new(0));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("worker semaphore closed")?;

        let service = service.clone();
        let publisher = publisher.clone();
        let handled = handled.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let response = service.handle_payload(&message.payload);

            match message.reply {
                Some(reply_to) => {
                    if let Err(e) = publisher.reply(reply_to, &response).await {
                        error!(error = %e, "Failed to publish reply");
                    }
                }
                None => warn!("Request without reply subject, dropping response"),
            }

            let count = handled.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                let latency = metrics.latency_stats();
                info!(
                    handled = count,
                    throughput = format!("{:.1} req/s", metrics.throughput()),
                    avg_latency_us = latency.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}
