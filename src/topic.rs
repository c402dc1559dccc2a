//! Named topics and the forwarders that aggregate them.
//!
//! Each upstream subsystem publishes to its own topic; a forwarder task
//! per topic moves messages into the engine's single aggregation queue so
//! the router sees one ordered stream per source.

use crate::constants::TOPIC_CAPACITY;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// A named broadcast topic.
///
/// Publishing with no live subscriber drops the message silently, which is
/// exactly what happens to events published after engine teardown.
#[derive(Debug)]
pub struct Topic<T> {
    name: String,
    sender: broadcast::Sender<T>,
}

impl<T: Clone> Topic<T> {
    /// Create a topic with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            name: name.into(),
            sender,
        }
    }

    /// Topic name, used in log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish a message to every current subscriber.
    pub fn publish(&self, message: T) {
        match self
            .sender
            .send(message)
        {
            Ok(subscribers) => trace!("Topic '{}' delivered to {} subscribers", self.name, subscribers),
            Err(_) => trace!("Topic '{}' has no subscribers, message dropped", self.name),
        }
    }

    /// Subscribe to messages published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender
            .subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .receiver_count()
    }
}

impl<T> Clone for Topic<T> {
    fn clone(&self) -> Self {
        Self {
            name: self
                .name
                .clone(),
            sender: self
                .sender
                .clone(),
        }
    }
}

/// Spawn a task forwarding everything from `topic` into `sink`.
///
/// The task stops when the shutdown flag flips, when the sink's receiver
/// is gone, or when the topic's sender is dropped. A lagged subscription
/// loses messages and logs how many.
pub(crate) fn spawn_forwarder<T>(
    topic: &Topic<T>,
    sink: mpsc::UnboundedSender<T>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
{
    let mut subscription = topic.subscribe();
    let name = topic
        .name()
        .to_string();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                message = subscription.recv() => match message {
                    Ok(message) => {
                        if sink
                            .send(message)
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(count)) => {
                        warn!("Topic '{}' subscription lagged, {} messages lost", name, count);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("Forwarder for topic '{}' stopped", name);
    })
}
