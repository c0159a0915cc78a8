//! The host side of the callback protocol.

use rquickjs::Ctx;

use crate::bridge::eval;
use crate::error::BridgeResult;
use crate::registry::{BridgeShared, FunctionHandle, ObjectHandle};
use crate::value::{HostThrowable, HostValue};

/// Result of a host callback. An `Err` is raised inside script as an exception.
pub type HostResult<T> = Result<T, HostThrowable>;

/// Host object model backing the members a bridge defines.
///
/// Callbacks run synchronously on the thread that is executing script. They may re-enter
/// the engine only through the `CallScope` they receive.
pub trait Host: Send + Sync {
    /// Read a property of a defined object.
    ///
    /// # Errors
    /// The returned throwable is raised in script.
    fn on_call_getter(
        &self,
        scope: &CallScope<'_, '_>,
        object: ObjectHandle,
        property: &str,
    ) -> HostResult<HostValue>;

    /// Write a property of a defined object.
    ///
    /// # Errors
    /// The returned throwable is raised in script.
    fn on_call_setter(
        &self,
        scope: &CallScope<'_, '_>,
        object: ObjectHandle,
        property: &str,
        value: HostValue,
    ) -> HostResult<()>;

    /// Invoke a function of a defined object, or a global function.
    ///
    /// For async functions the first two arguments are the resolve and reject handles
    /// (see `PromiseHandles::split`) and the returned value is ignored.
    ///
    /// # Errors
    /// The returned throwable is raised in script, or rejects the promise of an async call.
    fn on_call_function(
        &self,
        scope: &CallScope<'_, '_>,
        object: ObjectHandle,
        function: &str,
        args: Vec<HostValue>,
    ) -> HostResult<HostValue>;

    /// An evaluation failed with this throwable.
    fn set_eval_exception(&self, _throwable: &HostThrowable) {}

    /// A promise was rejected with nothing observing it.
    fn set_unhandled_promise_rejection(&self, _reason: HostValue) {}

    /// A handler was attached to a previously unhandled rejection.
    fn clear_handled_promise_rejection(&self) {}
}

/// Access to the engine from inside a host callback.
pub struct CallScope<'scope, 'js> {
    /// Context currently running script
    ctx: &'scope Ctx<'js>,
    /// Bridge the callback belongs to
    shared: &'scope BridgeShared,
}

impl<'scope, 'js> CallScope<'scope, 'js> {
    /// Scope for a callback running in `ctx`.
    pub fn new(ctx: &'scope Ctx<'js>, shared: &'scope BridgeShared) -> Self {
        Self { ctx, shared }
    }

    /// Invoke a created function, typically a promise resolver, without leaving the engine.
    ///
    /// # Errors
    /// Returns `HandleOutOfBounds` for unknown handles, or the script error if the call throws.
    pub fn call_function(&self, handle: FunctionHandle, args: Vec<HostValue>) -> BridgeResult<()> {
        eval::call_function(self.ctx, self.shared, handle, args).map_err(|error| {
            crate::marshal::surface(self.ctx, self.shared, error)
        })
    }
}
