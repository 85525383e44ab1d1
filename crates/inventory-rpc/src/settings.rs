//! Process configuration, read once from flags and the environment.

use clap::Parser;
use inventory_rpc_amqp::BootPolicy;
use inventory_rpc_core::Topology;
use inventory_rpc_retry::{RetryConfig, RetryConfigBuilder};
use inventory_rpc_router::{ReplyRouterConfig, ReplyRouterConfigBuilder};
use std::path::PathBuf;
use std::time::Duration;

/// Parses a non-negative number of seconds such as `1.8`.
pub fn parse_seconds(raw: &str) -> Result<Duration, String> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("`{raw}` is not a number of seconds"))?;
    Duration::try_from_secs_f64(seconds).map_err(|err| format!("`{raw}`: {err}"))
}

fn parse_millis(raw: &str) -> Result<Duration, String> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| format!("`{raw}` is not a number of milliseconds"))
}

/// Front door settings.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "inventory-proxy",
    about = "HTTP front door answering inventory queries through the broker"
)]
pub struct ProxySettings {
    /// Broker URL
    #[arg(long, env = "AMQP_URL", default_value = "amqp://guest:guest@mq:5672/%2F")]
    pub amqp_url: String,

    /// Exchange queries are published to
    #[arg(long, env = "EXCHANGE", default_value = "inventory.ex")]
    pub exchange: String,

    /// Routing key of the work queue
    #[arg(long, env = "RK_QUERY", default_value = "inventory.query")]
    pub rk_query: String,

    /// Caller-facing deadline, in seconds
    #[arg(long, env = "RPC_TIMEOUT", default_value = "1.8", value_parser = parse_seconds)]
    pub rpc_timeout: Duration,

    /// Longest single wait on the reply queue, in milliseconds
    #[arg(long, env = "POLL_SLICE_MS", default_value = "50", value_parser = parse_millis)]
    pub poll_slice: Duration,

    /// JSON Lines log file
    #[arg(long, env = "LOG_PATH", default_value = "/var/log/consulta/proxy.jsonl")]
    pub log_path: PathBuf,

    /// Last-known-good record
    #[arg(long, env = "CACHE_FILE", default_value = "/var/cache/consulta/last_good.json")]
    pub cache_file: PathBuf,

    /// HTTP port
    #[arg(long, env = "PORT", default_value_t = 80)]
    pub port: u16,

    /// Worker per-attempt timeout, in seconds (startup check only)
    #[arg(long, env = "UPSTREAM_TIMEOUT", default_value = "1.5", value_parser = parse_seconds)]
    pub upstream_timeout: Duration,

    /// Worker retry limit (startup check only)
    #[arg(long, env = "MAX_RETRIES", default_value_t = 2)]
    pub max_retries: u32,
}

impl ProxySettings {
    /// Router configuration for these settings.
    pub fn router_config(&self) -> ReplyRouterConfigBuilder {
        ReplyRouterConfig::builder()
            .deadline(self.rpc_timeout)
            .poll_slice(self.poll_slice)
            .query_routing_key(self.rk_query.clone())
            .name("proxy")
    }
}

/// Worker settings.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "inventory-worker",
    about = "Consumes inventory queries and answers them from the upstream"
)]
pub struct WorkerSettings {
    /// Broker URL
    #[arg(long, env = "AMQP_URL", default_value = "amqp://guest:guest@mq:5672/%2F")]
    pub amqp_url: String,

    /// Exchange the queues are bound to
    #[arg(long, env = "EXCHANGE", default_value = "inventory.ex")]
    pub exchange: String,

    /// Work queue
    #[arg(long, env = "QUEUE_MAIN", default_value = "inventory.q")]
    pub queue_main: String,

    /// Routing key of the work queue
    #[arg(long, env = "RK_QUERY", default_value = "inventory.query")]
    pub rk_query: String,

    /// Delay queue for retries
    #[arg(long, env = "QUEUE_RETRY_2S", default_value = "inventory.retry.2s")]
    pub queue_retry: String,

    /// Routing key of the delay queue
    #[arg(long, env = "RK_RETRY", default_value = "inventory.retry")]
    pub rk_retry: String,

    /// Time a retry copy waits before returning to the work queue, in milliseconds
    #[arg(long, env = "RETRY_TTL_MS", default_value = "2000", value_parser = parse_millis)]
    pub retry_ttl: Duration,

    /// Recirculations before the fallback record is replied
    #[arg(long, env = "MAX_RETRIES", default_value_t = 2)]
    pub max_retries: u32,

    /// Per-attempt upstream timeout, in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT", default_value = "1.5", value_parser = parse_seconds)]
    pub upstream_timeout: Duration,

    /// Upstream inventory endpoint
    #[arg(long, env = "UPSTREAM_URL", default_value = "https://maestria.codezor.dev/consulta")]
    pub upstream_url: String,

    /// JSON Lines log file
    #[arg(long, env = "LOG_PATH", default_value = "/var/log/consulta/worker.jsonl")]
    pub log_path: PathBuf,

    /// Last-known-good record
    #[arg(long, env = "CACHE_FILE", default_value = "/var/cache/consulta/last_good.json")]
    pub cache_file: PathBuf,

    /// Connection attempts at startup
    #[arg(long, env = "BOOT_ATTEMPTS", default_value_t = 30)]
    pub boot_attempts: u32,

    /// Pause between connection attempts, in milliseconds
    #[arg(long, env = "BOOT_BACKOFF_MS", default_value = "1000", value_parser = parse_millis)]
    pub boot_backoff: Duration,

    /// Proxy caller deadline, in seconds (startup check only)
    #[arg(long, env = "RPC_TIMEOUT", default_value = "1.8", value_parser = parse_seconds)]
    pub rpc_timeout: Duration,
}

impl WorkerSettings {
    /// Broker objects declared by the worker.
    pub fn topology(&self) -> Topology {
        Topology::default()
            .exchange(self.exchange.clone())
            .main_queue(self.queue_main.clone())
            .query_routing_key(self.rk_query.clone())
            .retry_queue(self.queue_retry.clone())
            .retry_routing_key(self.rk_retry.clone())
            .retry_delay(self.retry_ttl)
    }

    /// Retry executor configuration for these settings.
    pub fn retry_config(&self) -> RetryConfigBuilder {
        RetryConfig::builder()
            .max_retries(self.max_retries)
            .attempt_timeout(self.upstream_timeout)
            .retry_routing_key(self.rk_retry.clone())
            .name("worker")
    }

    /// Startup connection policy.
    pub fn boot_policy(&self) -> BootPolicy {
        BootPolicy::fixed(self.boot_attempts, self.boot_backoff)
    }
}
