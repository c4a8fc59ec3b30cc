use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use plaza_types::{EventKind, PushEvent, Topic};

use crate::frame::{Frame, GatewayError};
use crate::transport::PushTransport;

pub type Handler = Arc<dyn Fn(&PushEvent) + Send + Sync>;

struct Registration {
    id: Uuid,
    kind: EventKind,
    handler: Handler,
}

/// Topic-based fan-out of push events to local handlers.
///
/// The first subscription to a topic joins it on the transport and the last one
/// to go leaves it. Each delivered event reaches each matching subscription at
/// most once; nothing is buffered or replayed.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    transport: Arc<dyn PushTransport>,

    /// topic -> live registrations
    topics: Mutex<HashMap<Topic, Vec<Registration>>>,

    /// Fires after the transport re-established its connection.
    reconnect_tx: broadcast::Sender<()>,
}

impl EventBus {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        let (reconnect_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(BusInner {
                transport,
                topics: Mutex::new(HashMap::new()),
                reconnect_tx,
            }),
        }
    }

    /// Registers `handler` for `kind` events on `topic`. Dropping (or disposing)
    /// the returned subscription releases the handler.
    pub fn subscribe<F>(&self, topic: Topic, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        let joined = {
            let mut topics = self.inner.topics.lock();
            let regs = topics.entry(topic.clone()).or_default();
            regs.push(Registration { id, kind, handler: Arc::new(handler) });
            regs.len() == 1
        };

        if joined {
            debug!("Joining topic {}", topic);
            self.inner.transport.join(&topic);
        }
        trace!("Subscribed {} on {} ({})", kind, topic, id);

        Subscription {
            bus: Arc::downgrade(&self.inner),
            topic,
            id,
        }
    }

    /// Releases every handler registered on `topic`.
    pub fn unsubscribe(&self, topic: &Topic) {
        let removed = self.inner.topics.lock().remove(topic);
        if let Some(regs) = removed {
            debug!("Leaving topic {} ({} handlers released)", topic, regs.len());
            self.inner.transport.leave(topic);
        }
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.inner.topics.lock().contains_key(topic)
    }

    pub fn handler_count(&self, topic: &Topic) -> usize {
        self.inner.topics.lock().get(topic).map_or(0, Vec::len)
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.inner.topics.lock().keys().cloned().collect()
    }

    /// Hands an already decoded event to the handlers registered for its kind on
    /// `topic`. Returns how many handlers ran.
    pub fn deliver(&self, topic: &Topic, event: &PushEvent) -> usize {
        let kind = event.kind();
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<Handler> = {
            let topics = self.inner.topics.lock();
            match topics.get(topic) {
                Some(regs) => regs
                    .iter()
                    .filter(|r| r.kind == kind)
                    .map(|r| r.handler.clone())
                    .collect(),
                None => Vec::new(),
            }
        };

        if handlers.is_empty() {
            trace!("No handler for {} on {}", kind, topic);
        }
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    /// Decodes a relay frame and delivers it. Unknown event names are dropped.
    pub fn ingest(&self, frame: Frame) -> Result<usize, GatewayError> {
        match frame {
            Frame::Event { channel, event, data } => {
                let Some(kind) = EventKind::from_name(&event) else {
                    trace!("Ignoring unknown event '{}' on {}", event, channel);
                    return Ok(0);
                };
                let topic = Topic::from_wire(&channel);
                let decoded = PushEvent::decode(kind, data).map_err(|e| {
                    warn!("Undecodable {} payload on {}: {}", kind, channel, e);
                    GatewayError::Payload { event: kind, source: e }
                })?;
                Ok(self.deliver(&topic, &decoded))
            }
            Frame::Control { reconnected } => {
                if reconnected {
                    self.notify_reconnected();
                }
                Ok(0)
            }
        }
    }

    /// Signals listeners that events may have been lost while disconnected.
    pub fn notify_reconnected(&self) {
        debug!("Push transport reconnected");
        let _ = self.inner.reconnect_tx.send(());
    }

    pub fn reconnects(&self) -> broadcast::Receiver<()> {
        self.inner.reconnect_tx.subscribe()
    }
}

impl BusInner {
    /// Removes one registration, but only if it is still present.
    fn release(&self, topic: &Topic, id: Uuid) {
        let emptied = {
            let mut topics = self.topics.lock();
            let Some(regs) = topics.get_mut(topic) else {
                return;
            };
            regs.retain(|r| r.id != id);
            if regs.is_empty() {
                topics.remove(topic);
                true
            } else {
                false
            }
        };

        if emptied {
            debug!("Leaving topic {}", topic);
            self.transport.leave(topic);
        }
    }
}

/// Disposer for one handler registration.
#[must_use = "dropping a subscription releases its handler"]
pub struct Subscription {
    bus: Weak<BusInner>,
    topic: Topic,
    id: Uuid,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.release(&self.topic, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish()
    }
}
