use std::collections::HashSet;

use parking_lot::Mutex;
use tracing::info;

use plaza_types::Topic;

/// The external relay connection as seen by the bus: it is only told which
/// topics to join and leave. Inbound frames are handed to
/// [`EventBus::ingest`](crate::EventBus::ingest) by whoever owns the socket.
pub trait PushTransport: Send + Sync {
    fn join(&self, topic: &Topic);

    fn leave(&self, topic: &Topic);
}

/// Tracks the joined topic set in memory, for relay bridges that poll it and for tests.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<TransportState>,
}

#[derive(Default)]
struct TransportState {
    joined: HashSet<Topic>,
    joins: usize,
    leaves: usize,
}

impl MemoryTransport {
    pub fn is_joined(&self, topic: &Topic) -> bool {
        self.state.lock().joined.contains(topic)
    }

    pub fn joined(&self) -> Vec<Topic> {
        self.state.lock().joined.iter().cloned().collect()
    }

    pub fn joins(&self) -> usize {
        self.state.lock().joins
    }

    pub fn leaves(&self) -> usize {
        self.state.lock().leaves
    }
}

impl PushTransport for MemoryTransport {
    fn join(&self, topic: &Topic) {
        let mut state = self.state.lock();
        state.joined.insert(topic.clone());
        state.joins += 1;
        info!("join {}", topic);
    }

    fn leave(&self, topic: &Topic) {
        let mut state = self.state.lock();
        state.joined.remove(topic);
        state.leaves += 1;
        info!("leave {}", topic);
    }
}
