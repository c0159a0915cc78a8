//! Handle bookkeeping and cached lookups for one bridge.

/// Host exception types.
mod exception_types;
/// Integer handles.
mod handles;
/// Cached script helpers.
mod intrinsics;
/// Arenas.
mod state;

pub use exception_types::{ExceptionFactory, ExceptionTypes};
pub use handles::{FunctionHandle, ObjectHandle, PromiseHandles};
pub use handles::GlobalRef;
pub use intrinsics::{Intrinsic, Intrinsics};
pub use state::BridgeState;

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::host::Host;

/// State shared between a bridge and every callable it installed.
pub struct BridgeShared {
    /// Arenas; never held across host callbacks or script calls
    state: Mutex<BridgeState>,
    /// Cached script helpers
    pub intrinsics: Intrinsics,
    /// Host exception types for script to host error mapping
    pub exception_types: Arc<ExceptionTypes>,
    /// Receives evaluation exceptions and promise rejections
    pub host: Arc<dyn Host>,
}

// SAFETY: the only non-thread-safe parts are the `Persistent` values in the arenas and the
// intrinsic cache, which hold a raw runtime pointer. They are only saved, restored or dropped
// inside `EngineRef::with*`, that is while the runtime's `EngineGuard` is held, so no two
// threads touch them at once.
#[allow(unsafe_code, reason = "Persistent script values are only used under the engine guard")]
unsafe impl Send for BridgeShared {}

// SAFETY: see the `Send` impl; shared access goes through the same guard.
#[allow(unsafe_code, reason = "Persistent script values are only used under the engine guard")]
unsafe impl Sync for BridgeShared {}

impl BridgeShared {
    /// Create empty state for a bridge.
    pub fn new(host: Arc<dyn Host>, exception_types: Arc<ExceptionTypes>) -> Self {
        Self {
            state: Mutex::new(BridgeState::default()),
            intrinsics: Intrinsics::default(),
            exception_types,
            host,
        }
    }

    /// Lock the arenas.
    pub fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock()
    }

    /// Release every script value and host reference. Must run inside the engine lock.
    pub fn teardown(&self) {
        let mut state = self.state.lock();
        tracing::debug!(
            "Releasing bridge state: {} callables, {} created functions",
            state.managed_count(),
            state.created_function_count()
        );
        state.clear();
        drop(state);
        self.intrinsics.clear();
        self.exception_types.invalidate_all();
    }
}
