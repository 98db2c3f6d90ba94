//! Location surface.
//!
//! The router reads and writes locations (`path?query`) through a
//! [`History`]. Hosts plug in their own transport; [`MemoryHistory`] keeps
//! everything in memory.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Called with the new location after every change.
pub type Listener = Arc<dyn Fn(&str) + Send + Sync>;

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(usize);

pub trait History: Send + Sync {
    /// Current location.
    fn location(&self) -> String;

    /// Add a new entry and notify listeners.
    fn push(&self, location: &str);

    /// Replace the current entry and notify listeners.
    fn replace(&self, location: &str);

    fn listen(&self, listener: Listener) -> ListenerId;

    fn unlisten(&self, id: ListenerId);
}

struct Entries {
    stack: Vec<String>,
    index: usize,
}

/// In-memory history with a back stack.
pub struct MemoryHistory {
    entries: Mutex<Entries>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: Mutex<usize>,
}

impl MemoryHistory {
    pub fn new(initial: &str) -> Self {
        Self {
            entries: Mutex::new(Entries {
                stack: vec![initial.to_string()],
                index: 0,
            }),
            listeners: RwLock::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Step back one entry. Returns false at the start of the stack.
    pub fn back(&self) -> bool {
        let location = {
            let mut entries = self.entries.lock();
            if entries.index == 0 {
                return false;
            }
            entries.index -= 1;
            entries.stack[entries.index].clone()
        };
        self.notify(&location);
        true
    }

    /// Every entry up to and including the current one.
    pub fn entries(&self) -> Vec<String> {
        let entries = self.entries.lock();
        entries.stack[..=entries.index].to_vec()
    }

    fn notify(&self, location: &str) {
        // Snapshot so listeners may push without deadlocking.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(location);
        }
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("/")
    }
}

impl History for MemoryHistory {
    fn location(&self) -> String {
        let entries = self.entries.lock();
        entries.stack[entries.index].clone()
    }

    fn push(&self, location: &str) {
        {
            let mut entries = self.entries.lock();
            let next = entries.index + 1;
            entries.stack.truncate(next);
            entries.stack.push(location.to_string());
            entries.index = next;
        }
        tracing::debug!(location = %location, "History push");
        self.notify(location);
    }

    fn replace(&self, location: &str) {
        {
            let mut entries = self.entries.lock();
            let index = entries.index;
            entries.stack[index] = location.to_string();
        }
        self.notify(location);
    }

    fn listen(&self, listener: Listener) -> ListenerId {
        let id = {
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            ListenerId(*next_id)
        };
        self.listeners.write().push((id, listener));
        id
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.write().retain(|(other, _)| *other != id);
    }
}
