//! Topic registry, push fan-out and subscriber streams

use std::collections::HashMap;
use std::future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use fleet_codec::{validate_topic, CodecError, Envelope};
use fleet_config::{BrokerConfig, ConfigError};
use fleet_types::BoundedHistory;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::subscription::Subscription;

/// One topic: history and live subscribers behind a single lock
pub(crate) struct Topic {
    name: String,
    state: Mutex<TopicState>,
}

struct TopicState {
    history: BoundedHistory<String>,
    subscribers: HashMap<u64, mpsc::Sender<String>>,
}

impl Topic {
    fn new(name: String, history_size: NonZeroUsize) -> Self {
        Self {
            name,
            state: Mutex::new(TopicState {
                history: BoundedHistory::with_capacity(history_size),
                subscribers: HashMap::new(),
            }),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn remove_subscriber(&self, id: u64) -> bool {
        self.state.lock().subscribers.remove(&id).is_some()
    }

    /// Record `line` and offer it to every subscriber. Returns deliveries.
    fn publish(&self, line: String) -> usize {
        let mut state = self.state.lock();
        state.history.enqueue(line.clone());

        let mut delivered = 0;
        let topic = &self.name;
        state
            .subscribers
            .retain(|subscriber_id, sender| match sender.try_send(line.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(%topic, subscriber_id, "Subscriber queue full, message dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%topic, subscriber_id, "Reaping closed subscriber");
                    false
                }
            });
        delivered
    }
}

struct BrokerInner {
    topics: DashMap<String, Arc<Topic>>,
    history_size: NonZeroUsize,
    subscriber_queue: NonZeroUsize,
    next_subscriber_id: AtomicU64,
}

/// In-process pub/sub registry. Cheap to clone; clones share all topics.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    /// Create a broker; fails fast on zero capacities.
    pub fn new(config: BrokerConfig) -> Result<Self> {
        config.validate()?;
        let history_size = NonZeroUsize::new(config.history_size)
            .ok_or_else(|| ConfigError::invalid("broker.history_size", "must be greater than 0"))?;
        let subscriber_queue = NonZeroUsize::new(config.subscriber_queue).ok_or_else(|| {
            ConfigError::invalid("broker.subscriber_queue", "must be greater than 0")
        })?;

        info!(
            history_size = history_size.get(),
            subscriber_queue = subscriber_queue.get(),
            "Broker initialized"
        );

        Ok(Self {
            inner: Arc::new(BrokerInner {
                topics: DashMap::new(),
                history_size,
                subscriber_queue,
                next_subscriber_id: AtomicU64::new(1),
            }),
        })
    }

    /// Lazily create or fetch a topic
    fn topic(&self, name: &str) -> Arc<Topic> {
        if let Some(topic) = self.inner.topics.get(name) {
            return Arc::clone(topic.value());
        }
        let history_size = self.inner.history_size;
        let entry = self
            .inner
            .topics
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(topic = %name, "Created topic");
                Arc::new(Topic::new(name.to_string(), history_size))
            });
        Arc::clone(entry.value())
    }

    /// Wrap `value` in an envelope and publish it under `topic`.
    ///
    /// Returns the number of subscribers the line was handed to. Fails only
    /// if the value cannot be represented as JSON.
    pub fn push<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> Result<usize> {
        let envelope = Envelope::from_value(topic, value)?;
        self.push_envelope(&envelope)
    }

    /// Publish a pre-built envelope under its own topic
    pub fn push_envelope(&self, envelope: &Envelope) -> Result<usize> {
        let line = envelope.to_json()?;
        self.push_raw(&envelope.topic, line)
    }

    /// Publish an already-encoded line as-is. No envelope is built, so
    /// envelope and typed subscribers skip lines that are not envelopes.
    /// Fails on an empty or blank topic.
    pub fn push_raw(&self, topic: &str, line: impl Into<String>) -> Result<usize> {
        validate_topic(topic)?;
        let delivered = self.topic(topic).publish(line.into());
        debug!(%topic, delivered, "Pushed");
        Ok(delivered)
    }

    /// Subscribe to `topic`: history snapshot first, then live lines.
    ///
    /// Registration and snapshot share one critical section so nothing is
    /// lost or repeated between them.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let topic = self.topic(topic);
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.inner.subscriber_queue.get());

        let replay = {
            let mut state = topic.state.lock();
            state.subscribers.insert(id, sender);
            state.history.snapshot()
        };

        debug!(topic = %topic.name(), subscriber_id = id, replay = replay.len(), "Subscriber registered");
        Subscription::new(id, topic, replay, receiver)
    }

    /// Decoded envelopes; lines that fail to decode are logged and skipped
    pub fn subscribe_envelopes(
        &self,
        topic: &str,
    ) -> impl Stream<Item = Envelope> + Send + Unpin + 'static {
        self.subscribe(topic).filter_map(|line| {
            let decoded = match Envelope::from_line(&line) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable line");
                    None
                }
            };
            future::ready(decoded)
        })
    }

    /// Payloads decoded as `T`; absent or mismatched payloads are skipped
    pub fn subscribe_typed<T>(&self, topic: &str) -> impl Stream<Item = T> + Send + Unpin + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.subscribe_envelopes(topic).filter_map(|envelope| {
            let decoded = match envelope.decode_payload::<T>() {
                Ok(value) => Some(value),
                Err(CodecError::MissingPayload { topic }) => {
                    debug!(%topic, "Skipping envelope without payload");
                    None
                }
                Err(e) => {
                    warn!(topic = %envelope.topic, error = %e, "Skipping mismatched payload");
                    None
                }
            };
            future::ready(decoded)
        })
    }

    /// Raw payload JSON text of each envelope, untouched
    pub fn subscribe_payloads(
        &self,
        topic: &str,
    ) -> impl Stream<Item = String> + Send + Unpin + 'static {
        self.subscribe_envelopes(topic)
            .filter_map(|envelope| future::ready(envelope.payload_raw().map(str::to_string)))
    }

    /// Known topic names, sorted
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.topics.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    /// Live subscribers of `topic`; 0 for unknown topics (does not create)
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map(|t| t.state.lock().subscribers.len())
            .unwrap_or(0)
    }

    /// History snapshot of `topic`; empty for unknown topics (does not create)
    pub fn history(&self, topic: &str) -> Vec<String> {
        self.inner
            .topics
            .get(topic)
            .map(|t| t.state.lock().history.snapshot())
            .unwrap_or_default()
    }

    /// End every live subscription. Queued lines are still yielded, then the
    /// streams finish. History is kept and later subscriptions work normally.
    pub fn close(&self) {
        let mut closed = 0;
        for topic in self.inner.topics.iter() {
            let mut state = topic.state.lock();
            closed += state.subscribers.len();
            state.subscribers.clear();
        }
        info!(closed_subscribers = closed, "Broker closed");
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("topics", &self.inner.topics.len())
            .field("history_size", &self.inner.history_size)
            .field("subscriber_queue", &self.inner.subscriber_queue)
            .finish()
    }
}
