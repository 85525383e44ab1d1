//! HTTP upstream used by the worker.

use futures::future::BoxFuture;
use inventory_rpc_retry::{Query, UpstreamError};
use serde_json::Value;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

/// Calls `GET <url>` and decodes the body as JSON.
///
/// Any non-2xx status is a failure. The client's own timeout is set to the
/// per-attempt timeout so a slow upstream is reported as
/// [`UpstreamError::Timeout`] rather than a transport error.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    url: String,
}

impl HttpUpstream {
    /// Creates an upstream for `url` with a request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// The upstream URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn classify(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        UpstreamError::Timeout
    } else if err.is_decode() {
        UpstreamError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
        UpstreamError::Status(status.as_u16())
    } else {
        UpstreamError::Transport(err.to_string())
    }
}

impl Service<Query> for HttpUpstream {
    type Response = Value;
    type Error = UpstreamError;
    type Future = BoxFuture<'static, Result<Value, UpstreamError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _query: Query) -> Self::Future {
        let request = self.client.get(&self.url);
        Box::pin(async move {
            let response = request.send().await.map_err(classify)?;
            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::Status(status.as_u16()));
            }
            response.json::<Value>().await.map_err(classify)
        })
    }
}
