//! Worker-side AMQP channel: prefetch 1, manual acks, persistent publishes.

use crate::codec;
use crate::declare::declare_topology;
use crate::error::AmqpError;
use futures::future::BoxFuture;
use futures::StreamExt;
use inventory_rpc_core::{
    BrokerError, Delivery, DeliveryTag, Destination, Envelope, Topology, WorkChannel,
};
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};

#[cfg(feature = "tracing")]
use tracing::debug;

const CONSUMER_TAG: &str = "inventory-worker";

/// The worker's single channel: declares the topology, consumes the work
/// queue with prefetch 1 and publishes replies and retry copies.
pub struct AmqpWorkChannel {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    topology: Topology,
}

impl AmqpWorkChannel {
    /// Connects, declares `topology` and starts consuming the work queue.
    pub async fn connect(url: &str, topology: Topology) -> Result<Self, AmqpError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(AmqpError::Connect)?;
        match Self::consume(&connection, &topology).await {
            Ok((channel, consumer)) => {
                #[cfg(feature = "tracing")]
                debug!(
                    queue = %topology.main_queue,
                    exchange = %topology.exchange,
                    "Consuming work queue"
                );
                Ok(Self {
                    connection,
                    channel,
                    consumer,
                    topology,
                })
            }
            Err(err) => {
                let _ = connection.close(200, "OK").await;
                Err(err)
            }
        }
    }

    async fn consume(
        connection: &Connection,
        topology: &Topology,
    ) -> Result<(Channel, Consumer), AmqpError> {
        let channel = connection.create_channel().await?;
        declare_topology(&channel, topology).await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;
        let consumer = channel
            .basic_consume(
                &topology.main_queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok((channel, consumer))
    }

    /// Returns the declared topology.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Closes the channel and the connection. Unacked deliveries are requeued by the broker.
    pub async fn close(self) {
        let _ = self.channel.close(200, "OK").await;
        let _ = self.connection.close(200, "OK").await;
    }
}

impl WorkChannel for AmqpWorkChannel {
    fn next_delivery(&mut self) -> BoxFuture<'_, Result<Option<Delivery>, BrokerError>> {
        Box::pin(async move {
            match self.consumer.next().await {
                Some(Ok(delivery)) => Ok(Some(Delivery {
                    tag: DeliveryTag(delivery.delivery_tag),
                    envelope: codec::envelope(&delivery.properties, delivery.data),
                })),
                Some(Err(err)) => Err(BrokerError::Consume(err.to_string())),
                None => Ok(None),
            }
        })
    }

    fn publish<'a>(
        &'a mut self,
        destination: &'a Destination,
        envelope: &'a Envelope,
    ) -> BoxFuture<'a, Result<(), BrokerError>> {
        Box::pin(async move {
            let (exchange, routing_key, delivery_mode) = match destination {
                Destination::Route(key) => (
                    self.topology.exchange.as_str(),
                    key.as_str(),
                    codec::PERSISTENT,
                ),
                // Default exchange; an unknown queue name drops the reply.
                Destination::ReplyTo(queue) => ("", queue.as_str(), codec::TRANSIENT),
            };
            let failed = |err: lapin::Error| BrokerError::Publish {
                destination: routing_key.to_string(),
                reason: err.to_string(),
            };
            self.channel
                .basic_publish(
                    exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    &envelope.payload,
                    codec::properties(envelope, delivery_mode),
                )
                .await
                .map_err(failed)?
                .await
                .map_err(failed)?;
            Ok(())
        })
    }

    fn ack(&mut self, tag: DeliveryTag) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(async move {
            self.channel
                .basic_ack(tag.0, BasicAckOptions::default())
                .await
                .map_err(|err| BrokerError::Ack {
                    tag: tag.0,
                    reason: err.to_string(),
                })
        })
    }
}
