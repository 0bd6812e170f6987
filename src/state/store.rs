use crate::state::device_state::DeviceState;
use tracing::trace;

pub type Listener = Box<dyn FnMut(&DeviceState, &DeviceState) + Send>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Holds the one authoritative `DeviceState`. Every `set` is a full replace
/// and listeners see `(previous, next)` in subscription order.
pub struct StateStore {
    state: DeviceState,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl StateStore {
    pub fn new(initial: DeviceState) -> Self {
        Self {
            state: initial,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn get(&self) -> &DeviceState {
        &self.state
    }

    /// Replace the state, stamp the next revision and notify subscribers.
    /// Returns the revision assigned to `next`.
    pub fn set(&mut self, mut next: DeviceState) -> u64 {
        next.revision = self.state.revision + 1;
        let previous = std::mem::replace(&mut self.state, next);
        trace!("state revision {} -> {}", previous.revision, self.state.revision);
        for (_, listener) in self.listeners.iter_mut() {
            listener(&previous, &self.state);
        }
        self.state.revision
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&DeviceState, &DeviceState) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        before != self.listeners.len()
    }
}
