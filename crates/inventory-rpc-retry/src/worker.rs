//! Consumption loop owning all broker I/O on the worker side.

use crate::handler::{MessageHandler, TerminalState};
use inventory_rpc_core::{BrokerError, Delivery, WorkChannel};
use std::future::Future;
use thiserror::Error;

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// Errors that stop the worker loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The work queue could not be read.
    #[error("failed to receive delivery: {0}")]
    Receive(#[source] BrokerError),

    /// The reply or retry copy could not be published; the delivery stays unacked.
    #[error("failed to publish outcome of delivery {tag}: {source}")]
    Publish { tag: u64, source: BrokerError },

    /// The delivery could not be acknowledged.
    #[error("failed to acknowledge delivery {tag}: {source}")]
    Ack { tag: u64, source: BrokerError },
}

/// Drives a [`MessageHandler`] over a [`WorkChannel`], one delivery at a time.
///
/// For every delivery the outbound message is published before the ack, so
/// a crash in between duplicates a request instead of losing it.
pub struct Worker<C, H> {
    channel: C,
    handler: H,
    processed: u64,
}

impl<C, H> Worker<C, H>
where
    C: WorkChannel,
    H: MessageHandler,
{
    /// Creates a worker consuming `channel` with `handler`.
    pub fn new(channel: C, handler: H) -> Self {
        Self {
            channel,
            handler,
            processed: 0,
        }
    }

    /// Number of deliveries fully handled so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Returns the handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Returns the channel and the handler.
    pub fn into_parts(self) -> (C, H) {
        (self.channel, self.handler)
    }

    /// Waits for one delivery and handles it.
    ///
    /// Returns `Ok(None)` once the channel is closed.
    pub async fn process_one(&mut self) -> Result<Option<TerminalState>, WorkerError> {
        match self.channel.next_delivery().await.map_err(WorkerError::Receive)? {
            Some(delivery) => self.handle(delivery).await.map(Some),
            None => Ok(None),
        }
    }

    /// Handles deliveries until the channel closes or an error occurs.
    pub async fn run(&mut self) -> Result<u64, WorkerError> {
        self.run_until(std::future::pending()).await
    }

    /// Handles deliveries until `shutdown` resolves, the channel closes or an
    /// error occurs.
    ///
    /// Shutdown is only observed between deliveries; a delivery being handled
    /// is always published and acknowledged first. Returns the number of
    /// deliveries handled.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<u64, WorkerError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let next = tokio::select! {
                _ = &mut shutdown => {
                    #[cfg(feature = "tracing")]
                    debug!(processed = self.processed, "Worker shutting down");
                    return Ok(self.processed);
                }
                next = self.channel.next_delivery() => next.map_err(WorkerError::Receive)?,
            };
            match next {
                Some(delivery) => {
                    self.handle(delivery).await?;
                }
                None => {
                    #[cfg(feature = "tracing")]
                    debug!(processed = self.processed, "Work channel closed");
                    return Ok(self.processed);
                }
            }
        }
    }

    async fn handle(&mut self, delivery: Delivery) -> Result<TerminalState, WorkerError> {
        let tag = delivery.tag;
        let disposition = self.handler.handle(delivery.envelope).await;
        let state = disposition.state();

        if let Some((destination, envelope)) = disposition.outbound() {
            if let Err(source) = self.channel.publish(&destination, envelope).await {
                #[cfg(feature = "tracing")]
                warn!(tag = tag.0, error = %source, "Publish failed, leaving delivery unacked");
                return Err(WorkerError::Publish { tag: tag.0, source });
            }
        }

        self.channel
            .ack(tag)
            .await
            .map_err(|source| WorkerError::Ack { tag: tag.0, source })?;
        self.processed += 1;

        #[cfg(feature = "tracing")]
        debug!(tag = tag.0, state = state.as_str(), "Delivery handled");

        Ok(state)
    }
}
