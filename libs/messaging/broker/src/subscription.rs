//! Subscriber handle returned by [`crate::Broker::subscribe`]

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::broker::Topic;

/// Lazy, single-pass stream of encoded envelope lines for one topic.
///
/// Yields the history snapshot taken at subscribe time, oldest first, then
/// live pushes. Ends only when the broker is closed; dropping the handle is
/// the cancellation path and deregisters the subscriber.
pub struct Subscription {
    id: u64,
    topic: Arc<Topic>,
    replay: VecDeque<String>,
    receiver: mpsc::Receiver<String>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        topic: Arc<Topic>,
        replay: Vec<String>,
        receiver: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            id,
            topic,
            replay: replay.into(),
            receiver,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        self.topic.name()
    }

    /// History entries not yet yielded
    pub fn pending_replay(&self) -> usize {
        self.replay.len()
    }
}

impl Stream for Subscription {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        if let Some(line) = self.replay.pop_front() {
            return Poll::Ready(Some(line));
        }
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.topic.remove_subscriber(self.id) {
            debug!(topic = %self.topic.name(), subscriber_id = self.id, "Subscriber deregistered");
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic.name())
            .field("pending_replay", &self.replay.len())
            .finish()
    }
}
