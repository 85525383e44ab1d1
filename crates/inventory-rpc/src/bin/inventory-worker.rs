//! Worker: answers queued inventory queries from the upstream, with retries.

use clap::Parser;
use inventory_rpc::telemetry::{self, AuditListener};
use inventory_rpc::{shutdown_signal, warn_on_deadline_mismatch, HttpUpstream, WorkerSettings};
use inventory_rpc_amqp::{boot, AmqpWorkChannel};
use inventory_rpc_fallback::FileStore;
use inventory_rpc_retry::{RetryExecutor, Worker};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = WorkerSettings::parse();
    telemetry::init(&settings.log_path)?;
    warn_on_deadline_mismatch(
        settings.rpc_timeout,
        settings.upstream_timeout,
        settings.max_retries,
    );

    let topology = settings.topology();
    let (channel, attempts) = boot(&settings.boot_policy(), |_attempt| {
        AmqpWorkChannel::connect(&settings.amqp_url, topology.clone())
    })
    .await?;
    telemetry::log_boot(attempts);

    let upstream = HttpUpstream::new(settings.upstream_url.clone(), settings.upstream_timeout)?;
    let store = Arc::new(FileStore::new(settings.cache_file.clone()));
    let config = settings
        .retry_config()
        .event_listener(Arc::new(AuditListener))
        .build();

    let mut worker = Worker::new(channel, RetryExecutor::new(upstream, store, config));
    let result = worker.run_until(shutdown_signal()).await;

    let (channel, _executor) = worker.into_parts();
    channel.close().await;

    let processed = result?;
    info!(processed, "worker stopped");
    Ok(())
}
