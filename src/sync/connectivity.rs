//! Connectivity Monitor - Injectable backend-availability signal
//!
//! One shared flag answering "is the backend reachable right now", owned
//! by an explicit service object rather than a process-wide global.
//! Constructed once at startup and passed by `Arc` to everything that
//! needs it: orchestrators consult it to decide between pushing directly
//! and queueing, the host flips it from its transport layer and reacts to
//! regained connectivity (drain the queue, trigger syncs) through the
//! subscription callbacks.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

pub struct ConnectivityMonitor {
    online: AtomicBool,
    listeners: Mutex<Vec<Listener>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        Self {
            online: AtomicBool::new(initially_online),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Update the flag. Listeners are notified only on an actual change.
    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return;
        }

        log::info!(
            "Backend connectivity changed: {}",
            if online { "online" } else { "offline" }
        );

        // Snapshot outside the lock so a listener can subscribe without
        // deadlocking.
        let listeners: Vec<Listener> = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(online))).is_err() {
                log::error!("Connectivity listener panicked; monitor unaffected");
            }
        }
    }

    /// Register a callback invoked with the new state on every change.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().push(Arc::new(listener));
    }
}

// ============================================================================
// Tests
// ============================================================================
