//! In-process broker with the same routing semantics as the AMQP topology.
//!
//! Used by tests and benches, and by embedders that run proxy and worker in
//! one process. Routing keys are bound to queues exactly as
//! [`Topology`] declares them; the delay queue dead-letters every message back
//! under the query key after its TTL; reply queues are exclusive and vanish
//! when their session closes, after which replies to them are dropped.

use crate::broker::{Delivery, DeliveryTag, ReplySession, SessionFactory, WorkChannel};
use crate::envelope::Envelope;
use crate::error::BrokerError;
use crate::topology::{DeadLetterRule, Destination, Topology};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uuid::Uuid;

type Consumer = Arc<AsyncMutex<mpsc::UnboundedReceiver<Envelope>>>;

struct Queue {
    tx: mpsc::UnboundedSender<Envelope>,
    consumer: Consumer,
    dead_letter: Option<DeadLetterRule>,
}

impl Queue {
    fn new(dead_letter: Option<DeadLetterRule>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            consumer: Arc::new(AsyncMutex::new(rx)),
            dead_letter,
        }
    }
}

#[derive(Default)]
struct Counters {
    queries: AtomicU64,
    retries: AtomicU64,
    dead_lettered: AtomicU64,
    replies: AtomicU64,
    replies_dropped: AtomicU64,
    acks: AtomicU64,
}

/// Snapshot of what went through a [`MemoryBroker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryStats {
    /// Queries published by router sessions.
    pub queries_published: u64,
    /// Copies published to the retry routing key.
    pub retries_published: u64,
    /// Messages that expired from the delay queue and were redelivered.
    pub dead_lettered: u64,
    /// Replies delivered to a live reply queue.
    pub replies_delivered: u64,
    /// Replies addressed to a reply queue that no longer exists.
    pub replies_dropped: u64,
    /// Deliveries acknowledged by workers.
    pub acks: u64,
}

struct Inner {
    topology: Topology,
    bindings: HashMap<String, String>,
    queues: Mutex<HashMap<String, Queue>>,
    counters: Counters,
    next_tag: AtomicU64,
    unavailable: AtomicBool,
}

/// An in-memory broker declaring a [`Topology`].
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    /// Declares `topology`: exchange bindings, work queue and delay queue.
    pub fn new(topology: Topology) -> Self {
        let mut queues = HashMap::new();
        queues.insert(topology.main_queue.clone(), Queue::new(None));
        queues.insert(
            topology.retry_queue.clone(),
            Queue::new(Some(topology.dead_letter_rule())),
        );

        let mut bindings = HashMap::new();
        bindings.insert(
            topology.query_routing_key.clone(),
            topology.main_queue.clone(),
        );
        bindings.insert(
            topology.retry_routing_key.clone(),
            topology.retry_queue.clone(),
        );

        Self {
            inner: Arc::new(Inner {
                topology,
                bindings,
                queues: Mutex::new(queues),
                counters: Counters::default(),
                next_tag: AtomicU64::new(1),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the declared topology.
    pub fn topology(&self) -> &Topology {
        &self.inner.topology
    }

    /// Makes every subsequent [`SessionFactory::open`] fail, simulating an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns a snapshot of the traffic counters.
    pub fn stats(&self) -> MemoryStats {
        let c = &self.inner.counters;
        MemoryStats {
            queries_published: c.queries.load(Ordering::SeqCst),
            retries_published: c.retries.load(Ordering::SeqCst),
            dead_lettered: c.dead_lettered.load(Ordering::SeqCst),
            replies_delivered: c.replies.load(Ordering::SeqCst),
            replies_dropped: c.replies_dropped.load(Ordering::SeqCst),
            acks: c.acks.load(Ordering::SeqCst),
        }
    }

    /// Returns the number of live reply queues.
    pub fn reply_queue_count(&self) -> usize {
        let bound: Vec<&String> = self.inner.bindings.values().collect();
        self.lock_queues()
            .keys()
            .filter(|name| !bound.contains(name))
            .count()
    }

    /// Opens a worker channel consuming the work queue.
    pub fn work_channel(&self) -> MemoryWorkChannel {
        let consumer = self
            .lock_queues()
            .get(&self.inner.topology.main_queue)
            .map(|q| Arc::clone(&q.consumer));
        MemoryWorkChannel {
            broker: self.clone(),
            consumer,
            unacked: None,
        }
    }

    fn lock_queues(&self) -> std::sync::MutexGuard<'_, HashMap<String, Queue>> {
        // A poisoned map only means a test panicked mid-publish; the data is still usable.
        self.inner
            .queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Routes `envelope` through the exchange. Unroutable messages are dropped.
    fn route(&self, routing_key: &str, envelope: Envelope) {
        let Some(queue_name) = self.inner.bindings.get(routing_key) else {
            return;
        };
        let queues = self.lock_queues();
        let Some(queue) = queues.get(queue_name) else {
            return;
        };
        match &queue.dead_letter {
            Some(rule) => {
                let rule = rule.clone();
                let broker = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(rule.message_ttl).await;
                    broker
                        .inner
                        .counters
                        .dead_lettered
                        .fetch_add(1, Ordering::SeqCst);
                    broker.route(&rule.routing_key, envelope);
                });
            }
            None => {
                let _ = queue.tx.send(envelope);
            }
        }
    }

    /// Delivers straight to a named queue through the default exchange.
    fn deliver(&self, queue_name: &str, envelope: Envelope) {
        let delivered = match self.lock_queues().get(queue_name) {
            Some(queue) => queue.tx.send(envelope).is_ok(),
            None => false,
        };
        let counter = if delivered {
            &self.inner.counters.replies
        } else {
            &self.inner.counters.replies_dropped
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("topology", &self.inner.topology)
            .field("stats", &self.stats())
            .finish()
    }
}

impl SessionFactory for MemoryBroker {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn ReplySession>, BrokerError>> {
        Box::pin(async move {
            if self.inner.unavailable.load(Ordering::SeqCst) {
                return Err(BrokerError::Unavailable(
                    "memory broker marked unavailable".to_string(),
                ));
            }
            let name = format!("amq.gen-{}", Uuid::new_v4().simple());
            let queue = Queue::new(None);
            let consumer = Arc::clone(&queue.consumer);
            self.lock_queues().insert(name.clone(), queue);
            Ok(Box::new(MemorySession {
                broker: self.clone(),
                reply_to: name,
                consumer,
            }) as Box<dyn ReplySession>)
        })
    }
}

/// A router session on a [`MemoryBroker`].
pub struct MemorySession {
    broker: MemoryBroker,
    reply_to: String,
    consumer: Consumer,
}

impl ReplySession for MemorySession {
    fn reply_to(&self) -> &str {
        &self.reply_to
    }

    fn publish<'a>(
        &'a mut self,
        routing_key: &'a str,
        envelope: &'a Envelope,
    ) -> BoxFuture<'a, Result<(), BrokerError>> {
        Box::pin(async move {
            self.broker
                .inner
                .counters
                .queries
                .fetch_add(1, Ordering::SeqCst);
            self.broker.route(routing_key, envelope.clone());
            Ok(())
        })
    }

    fn next_reply(
        &mut self,
        wait: Duration,
    ) -> BoxFuture<'_, Result<Option<Envelope>, BrokerError>> {
        Box::pin(async move {
            let mut rx = self.consumer.lock().await;
            match tokio::time::timeout(wait, rx.recv()).await {
                Ok(Some(envelope)) => Ok(Some(envelope)),
                Ok(None) => Err(BrokerError::Consume(format!(
                    "reply queue {} was deleted",
                    self.reply_to
                ))),
                Err(_elapsed) => Ok(None),
            }
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.broker.lock_queues().remove(&self.reply_to);
        })
    }
}

/// A worker channel on a [`MemoryBroker`] with prefetch 1.
pub struct MemoryWorkChannel {
    broker: MemoryBroker,
    consumer: Option<Consumer>,
    unacked: Option<DeliveryTag>,
}

impl WorkChannel for MemoryWorkChannel {
    fn next_delivery(&mut self) -> BoxFuture<'_, Result<Option<Delivery>, BrokerError>> {
        Box::pin(async move {
            if let Some(tag) = self.unacked {
                return Err(BrokerError::Consume(format!(
                    "delivery {} is still unacknowledged (prefetch 1)",
                    tag.0
                )));
            }
            let Some(consumer) = self.consumer.as_ref() else {
                return Ok(None);
            };
            let envelope = consumer.lock().await.recv().await;
            Ok(envelope.map(|envelope| {
                let tag = DeliveryTag(self.broker.inner.next_tag.fetch_add(1, Ordering::SeqCst));
                self.unacked = Some(tag);
                Delivery { tag, envelope }
            }))
        })
    }

    fn publish<'a>(
        &'a mut self,
        destination: &'a Destination,
        envelope: &'a Envelope,
    ) -> BoxFuture<'a, Result<(), BrokerError>> {
        Box::pin(async move {
            match destination {
                Destination::Route(routing_key) => {
                    if *routing_key == self.broker.inner.topology.retry_routing_key {
                        self.broker
                            .inner
                            .counters
                            .retries
                            .fetch_add(1, Ordering::SeqCst);
                    }
                    self.broker.route(routing_key, envelope.clone());
                }
                Destination::ReplyTo(queue) => self.broker.deliver(queue, envelope.clone()),
            }
            Ok(())
        })
    }

    fn ack(&mut self, tag: DeliveryTag) -> BoxFuture<'_, Result<(), BrokerError>> {
        Box::pin(async move {
            if self.unacked != Some(tag) {
                return Err(BrokerError::Ack {
                    tag: tag.0,
                    reason: "unknown delivery tag".to_string(),
                });
            }
            self.unacked = None;
            self.broker.inner.counters.acks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}
