//! HTTP front door: `GET /consulta` answered through the broker.

use clap::Parser;
use inventory_rpc::telemetry::{self, AuditListener};
use inventory_rpc::{app, shutdown_signal, warn_on_deadline_mismatch, ProxySettings};
use inventory_rpc_amqp::AmqpSessionFactory;
use inventory_rpc_fallback::FileStore;
use inventory_rpc_router::ReplyRouter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = ProxySettings::parse();
    telemetry::init(&settings.log_path)?;
    warn_on_deadline_mismatch(
        settings.rpc_timeout,
        settings.upstream_timeout,
        settings.max_retries,
    );

    let config = settings
        .router_config()
        .event_listener(Arc::new(AuditListener))
        .build();
    let router = ReplyRouter::new(
        Arc::new(AmqpSessionFactory::new(settings.amqp_url.clone(), settings.exchange.clone())),
        Arc::new(FileStore::new(settings.cache_file.clone())),
        config,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, deadline_ms = settings.rpc_timeout.as_millis() as u64, "proxy listening");

    axum::serve(listener, app(router))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("proxy stopped");
    Ok(())
}
