//! The process-wide status store.
//!
//! Holds the reduced `StatusState` behind an atomic swap for lock-free
//! reads. Dispatch is serialized by a mutex: reduce against the current
//! snapshot, swap the result in, nudge the change feed. Reducer transitions
//! therefore run synchronously on the dispatch path, in arrival order.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::{debug, warn};

use statuskit_store::{reduce, Message, StatusState};

/// The action channel seam: anything that accepts status messages and can
/// produce a consistent state snapshot. Implemented by `StatusStore`; hosts
/// with their own bus implement it to route the same messages themselves.
pub trait StatusBackend: Send + Sync {
    /// Apply a message. Reductions are serialized; completion messages from
    /// async tasks arrive through the same path as synchronous updates.
    fn dispatch(&self, message: Message);

    /// An owned snapshot of the current state — consistent even if a
    /// dispatch swaps in new state concurrently.
    fn snapshot(&self) -> Arc<StatusState>;
}

impl<B: StatusBackend + ?Sized> StatusBackend for Arc<B> {
    fn dispatch(&self, message: Message) {
        (**self).dispatch(message)
    }

    fn snapshot(&self) -> Arc<StatusState> {
        (**self).snapshot()
    }
}

/// Default in-process store.
pub struct StatusStore {
    state: ArcSwap<StatusState>,
    dispatch_lock: Mutex<()>,
    changed: watch::Sender<u64>,
}

impl StatusStore {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            state: ArcSwap::new(Arc::new(StatusState::default())),
            dispatch_lock: Mutex::new(()),
            changed,
        }
    }

    /// Change feed: the value bumps after every dispatch. Receivers await
    /// it instead of polling snapshots.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBackend for StatusStore {
    fn dispatch(&self, message: Message) {
        let _serialized = self.dispatch_lock.lock().unwrap();
        let current = self.state.load_full();
        match &message {
            Message::Update { name, .. } | Message::Destroy { name }
                if !current.values.contains_key(name) =>
            {
                // Reduces to a no-op; worth a trace since it usually means a
                // completion raced an unmount.
                warn!(
                    message = message.message_type(),
                    name = name.as_str(),
                    "message for unmounted slice"
                );
            }
            _ => {}
        }
        let next = reduce(Some(current.as_ref()), &message);
        self.state.store(Arc::new(next));
        debug!(
            message = message.message_type(),
            name = message.name(),
            "dispatched"
        );
        self.changed.send_modify(|v| *v = v.wrapping_add(1));
    }

    fn snapshot(&self) -> Arc<StatusState> {
        self.state.load_full()
    }
}
