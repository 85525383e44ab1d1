//! Per-call reply sessions for the router.

use crate::codec;
use crate::declare::declare_exchange;
use crate::error::AmqpError;
use futures::future::BoxFuture;
use futures::StreamExt;
use inventory_rpc_core::{BrokerError, Envelope, ReplySession, SessionFactory};
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::debug;

/// Opens one AMQP connection and private reply queue per request.
///
/// Sessions are never pooled: each carries its own connection, so a broken
/// connection affects exactly one caller.
#[derive(Debug, Clone)]
pub struct AmqpSessionFactory {
    url: String,
    exchange: String,
}

impl AmqpSessionFactory {
    /// Creates a factory connecting to `url` and publishing through `exchange`.
    pub fn new(url: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: exchange.into(),
        }
    }

    async fn open_session(&self) -> Result<AmqpSession, AmqpError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(AmqpError::Connect)?;
        match prepare(&connection, &self.exchange).await {
            Ok((channel, reply_to, consumer)) => Ok(AmqpSession {
                connection,
                channel,
                exchange: self.exchange.clone(),
                reply_to,
                consumer,
            }),
            Err(err) => {
                let _ = connection.close(200, "OK").await;
                Err(err)
            }
        }
    }
}

async fn prepare(
    connection: &Connection,
    exchange: &str,
) -> Result<(Channel, String, Consumer), AmqpError> {
    let channel = connection.create_channel().await?;
    declare_exchange(&channel, exchange).await?;

    let queue = channel
        .queue_declare(
            "",
            QueueDeclareOptions {
                exclusive: true,
                auto_delete: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(AmqpError::declare("reply queue"))?;
    let reply_to = queue.name().as_str().to_string();

    // Replies are acknowledged on receipt; stray ones are simply dropped.
    let consumer = channel
        .basic_consume(
            &reply_to,
            "",
            BasicConsumeOptions {
                no_ack: true,
                exclusive: true,
                ..BasicConsumeOptions::default()
            },
            FieldTable::default(),
        )
        .await?;

    Ok((channel, reply_to, consumer))
}

impl SessionFactory for AmqpSessionFactory {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn ReplySession>, BrokerError>> {
        Box::pin(async move {
            let session = self.open_session().await?;
            #[cfg(feature = "tracing")]
            debug!(reply_to = %session.reply_to, "Reply session opened");
            Ok(Box::new(session) as Box<dyn ReplySession>)
        })
    }
}

/// A router session: one connection, one channel, one exclusive reply queue.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    exchange: String,
    reply_to: String,
    consumer: Consumer,
}

impl ReplySession for AmqpSession {
    fn reply_to(&self) -> &str {
        &self.reply_to
    }

    fn publish<'a>(
        &'a mut self,
        routing_key: &'a str,
        envelope: &'a Envelope,
    ) -> BoxFuture<'a, Result<(), BrokerError>> {
        Box::pin(async move {
            let failed = |err: lapin::Error| BrokerError::Publish {
                destination: routing_key.to_string(),
                reason: err.to_string(),
            };
            self.channel
                .basic_publish(
                    &self.exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    &envelope.payload,
                    codec::properties(envelope, codec::PERSISTENT),
                )
                .await
                .map_err(failed)?
                .await
                .map_err(failed)?;
            Ok(())
        })
    }

    fn next_reply(
        &mut self,
        wait: Duration,
    ) -> BoxFuture<'_, Result<Option<Envelope>, BrokerError>> {
        Box::pin(async move {
            match tokio::time::timeout(wait, self.consumer.next()).await {
                Err(_elapsed) => Ok(None),
                Ok(Some(Ok(delivery))) => {
                    Ok(Some(codec::envelope(&delivery.properties, delivery.data)))
                }
                Ok(Some(Err(err))) => Err(BrokerError::Consume(err.to_string())),
                Ok(None) => Err(AmqpError::Closed(format!("reply queue {}", self.reply_to)).into()),
            }
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            // The reply queue is exclusive and auto-delete, so it goes with the channel.
            let _ = self.channel.close(200, "OK").await;
            let _ = self.connection.close(200, "OK").await;
        })
    }
}
