//! Idempotent declaration of the exchange, queues and bindings.

use crate::error::AmqpError;
use inventory_rpc_core::Topology;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{Channel, ExchangeKind};

/// Arguments turning the retry queue into a delay line back to the work queue.
pub fn retry_queue_arguments(topology: &Topology) -> FieldTable {
    let rule = topology.dead_letter_rule();
    let mut arguments = FieldTable::default();
    arguments.insert(
        ShortString::from("x-message-ttl"),
        AMQPValue::LongInt(rule.ttl_millis()),
    );
    arguments.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(LongString::from(rule.exchange.as_str())),
    );
    arguments.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(LongString::from(rule.routing_key.as_str())),
    );
    arguments
}

fn durable() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    }
}

/// Declares the exchange only, as the router needs nothing else.
pub async fn declare_exchange(channel: &Channel, exchange: &str) -> Result<(), AmqpError> {
    channel
        .exchange_declare(
            exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(AmqpError::declare(format!("exchange {exchange}")))
}

/// Declares the exchange, both queues and their bindings. Idempotent.
pub async fn declare_topology(channel: &Channel, topology: &Topology) -> Result<(), AmqpError> {
    declare_exchange(channel, &topology.exchange).await?;

    channel
        .queue_declare(&topology.main_queue, durable(), FieldTable::default())
        .await
        .map_err(AmqpError::declare(format!("queue {}", topology.main_queue)))?;
    channel
        .queue_bind(
            &topology.main_queue,
            &topology.exchange,
            &topology.query_routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(AmqpError::declare(format!("binding {}", topology.query_routing_key)))?;

    channel
        .queue_declare(&topology.retry_queue, durable(), retry_queue_arguments(topology))
        .await
        .map_err(AmqpError::declare(format!("queue {}", topology.retry_queue)))?;
    channel
        .queue_bind(
            &topology.retry_queue,
            &topology.exchange,
            &topology.retry_routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(AmqpError::declare(format!("binding {}", topology.retry_routing_key)))?;

    Ok(())
}
