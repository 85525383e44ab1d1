//! JSON Lines logging and the audit listener.
//!
//! Every record is one JSON object per line with a timestamp added by the
//! formatter. Protocol events become `request`, `attempt`, `recirculate` and
//! `boot` records carrying `type`, `outcome`, `corr_id`, `attempt`,
//! `from_cache`, `duration_ms` and `error`. Only `attempt` records describe an
//! upstream call, so counting them by `outcome` gives per-attempt totals.

use inventory_rpc_core::{EventListener, RpcEvent};
use inventory_rpc_retry::AttemptEvent;
use inventory_rpc_router::RouterEvent;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Path reported in `request` records.
pub const REQUEST_PATH: &str = "/consulta";

/// Opens `path` for appending, creating missing parent directories.
pub fn open_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Builds the JSON subscriber writing to `writer`.
///
/// The level defaults to `info` and can be overridden with `RUST_LOG`.
pub fn subscriber(writer: BoxMakeWriter) -> impl tracing::Subscriber + Send + Sync {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(writer)
        .finish()
}

/// Installs the global subscriber, appending to `path`.
///
/// Falls back to stderr when the file cannot be opened.
pub fn init(path: &Path) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let (writer, unavailable) = match open_log(path) {
        Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), None),
        Err(err) => (BoxMakeWriter::new(io::stderr), Some(err)),
    };
    tracing::subscriber::set_global_default(subscriber(writer))?;

    if let Some(err) = unavailable {
        tracing::warn!(
            path = %path.display(),
            error = %err,
            "log file unavailable, logging to stderr"
        );
    }
    Ok(())
}

/// Logs the worker's successful broker connection.
pub fn log_boot(attempts: u32) {
    info!("type" = "boot", attempts, "worker connected");
}

/// Turns router and executor events into audit records.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditListener;

impl EventListener<RouterEvent> for AuditListener {
    fn on_event(&self, event: &RouterEvent) {
        info!(
            "type" = "request",
            path = REQUEST_PATH,
            outcome = event.outcome().as_str(),
            corr_id = event.correlation_id(),
            from_cache = event.from_cache(),
            duration_ms = event.duration().as_millis() as u64,
            error = event.error(),
            source = event.source_name(),
        );
    }
}

impl EventListener<AttemptEvent> for AuditListener {
    fn on_event(&self, event: &AttemptEvent) {
        match event {
            AttemptEvent::Attempt {
                correlation_id,
                attempt,
                outcome,
                error,
                duration,
                ..
            } => info!(
                "type" = "attempt",
                outcome = outcome.as_str(),
                corr_id = correlation_id.as_deref(),
                attempt = *attempt,
                duration_ms = duration.as_millis() as u64,
                error = error.as_deref(),
            ),
            AttemptEvent::Recirculated {
                correlation_id,
                next_attempt,
                cause,
                ..
            } => info!(
                "type" = "recirculate",
                cause = cause.as_str(),
                corr_id = correlation_id.as_deref(),
                next_attempt = *next_attempt,
            ),
            AttemptEvent::Fallback {
                correlation_id,
                attempt,
                ..
            } => info!(
                "type" = "attempt",
                outcome = event.outcome().as_str(),
                corr_id = correlation_id.as_deref(),
                attempt = *attempt,
                from_cache = true,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_rpc_retry::AttemptOutcome;
    use inventory_rpc_router::RouterOutcome;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn records(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn capture<F: FnOnce()>(f: F) -> Vec<Value> {
        let sink = Capture::default();
        let writer = sink.clone();
        let subscriber = subscriber(BoxMakeWriter::new(move || writer.clone()));
        tracing::subscriber::with_default(subscriber, f);
        sink.records()
    }

    #[test]
    fn request_records_are_flat_json() {
        let records = capture(|| {
            AuditListener.on_event(&RouterEvent::Fallback {
                source_name: "proxy".to_string(),
                timestamp: Instant::now(),
                correlation_id: "c-1".to_string(),
                outcome: RouterOutcome::TimeoutFallback,
                error: None,
                duration: Duration::from_millis(1802),
            });
        });

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["type"], "request");
        assert_eq!(record["path"], "/consulta");
        assert_eq!(record["outcome"], "timeout_fallback");
        assert_eq!(record["corr_id"], "c-1");
        assert_eq!(record["from_cache"], true);
        assert_eq!(record["duration_ms"], 1802);
        assert!(record.get("error").is_none());
        assert!(record.get("timestamp").is_some());
    }

    #[test]
    fn attempt_records_carry_errors() {
        let records = capture(|| {
            AuditListener.on_event(&AttemptEvent::Attempt {
                source_name: "worker".to_string(),
                timestamp: Instant::now(),
                correlation_id: Some("c-2".to_string()),
                attempt: 1,
                outcome: AttemptOutcome::Error,
                error: Some("upstream returned status 502".to_string()),
                duration: Duration::from_millis(12),
            });
            AuditListener.on_event(&AttemptEvent::Fallback {
                source_name: "worker".to_string(),
                timestamp: Instant::now(),
                correlation_id: Some("c-2".to_string()),
                attempt: 2,
            });
        });

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["type"], "attempt");
        assert_eq!(records[0]["attempt"], 1);
        assert_eq!(records[0]["error"], "upstream returned status 502");
        assert_eq!(records[1]["outcome"], "fallback_cache");
        assert_eq!(records[1]["from_cache"], true);
    }

    #[test]
    fn recirculation_does_not_count_as_an_attempt() {
        let attempt = |n: u32, outcome: AttemptOutcome| AttemptEvent::Attempt {
            source_name: "worker".to_string(),
            timestamp: Instant::now(),
            correlation_id: Some("c-3".to_string()),
            attempt: n,
            outcome,
            error: (outcome != AttemptOutcome::Ok).then(|| "upstream timed out".to_string()),
            duration: Duration::from_millis(1500),
        };
        let recirculated = |next: u32| AttemptEvent::Recirculated {
            source_name: "worker".to_string(),
            timestamp: Instant::now(),
            correlation_id: Some("c-3".to_string()),
            next_attempt: next,
            cause: AttemptOutcome::UpstreamTimeout,
        };

        let records = capture(|| {
            AuditListener.on_event(&attempt(0, AttemptOutcome::UpstreamTimeout));
            AuditListener.on_event(&recirculated(1));
            AuditListener.on_event(&attempt(1, AttemptOutcome::UpstreamTimeout));
            AuditListener.on_event(&recirculated(2));
            AuditListener.on_event(&attempt(2, AttemptOutcome::Ok));
        });

        let outcomes: Vec<&str> = records
            .iter()
            .filter(|r| r["type"] == "attempt")
            .map(|r| r["outcome"].as_str().unwrap())
            .collect();
        assert_eq!(outcomes, ["upstream_timeout", "upstream_timeout", "ok"]);

        let hops: Vec<&Value> = records.iter().filter(|r| r["type"] == "recirculate").collect();
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0]["next_attempt"], 1);
        assert_eq!(hops[1]["next_attempt"], 2);
        assert_eq!(hops[0]["cause"], "upstream_timeout");
        assert!(hops.iter().all(|r| r.get("outcome").is_none()));
    }

    #[test]
    fn boot_record() {
        let records = capture(|| log_boot(3));
        assert_eq!(records[0]["type"], "boot");
        assert_eq!(records[0]["attempts"], 3);
        assert_eq!(records[0]["message"], "worker connected");
    }

    #[test]
    fn log_file_parents_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/proxy.jsonl");
        open_log(&path).unwrap();
        assert!(path.exists());
    }
}
