//! Single-owner entry into an engine.

use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};

use crate::error::{BridgeError, BridgeResult};

/// Serializes host threads entering one runtime and rejects same-thread re-entry.
#[derive(Debug, Default)]
pub struct EngineGuard {
    /// Held for the whole time a thread is inside the engine
    entry: Mutex<()>,
    /// Thread currently inside the engine
    owner: Mutex<Option<ThreadId>>,
}

impl EngineGuard {
    /// Enter the engine, blocking while another thread is inside.
    ///
    /// # Errors
    /// Returns `Reentrant` if the calling thread is already inside.
    pub fn enter(&self) -> BridgeResult<Entered<'_>> {
        let current = thread::current().id();
        if *self.owner.lock() == Some(current) {
            tracing::warn!("Rejected re-entrant engine call from {current:?}");
            return Err(BridgeError::Reentrant);
        }
        let entry = self.entry.lock();
        *self.owner.lock() = Some(current);
        Ok(Entered {
            guard: self,
            _entry: entry,
        })
    }

    /// Whether the calling thread is inside the engine.
    pub fn is_held_by_current_thread(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }
}

/// Proof that the current thread owns the engine; releases it on drop.
pub struct Entered<'guard> {
    /// Guard this entry belongs to
    guard: &'guard EngineGuard,
    /// Entry lock, released after the owner is cleared
    _entry: MutexGuard<'guard, ()>,
}

impl Drop for Entered<'_> {
    fn drop(&mut self) {
        *self.guard.owner.lock() = None;
    }
}
