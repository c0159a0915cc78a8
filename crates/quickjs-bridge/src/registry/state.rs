//! Per-context arenas owned by a bridge.

use core::mem;
use std::sync::Arc;

use rquickjs::{Function, Object, Persistent, Value};

use crate::bridge::CallableData;
use crate::error::{BridgeError, BridgeResult};
use crate::host::Host;
use crate::registry::handles::{FunctionHandle, GlobalRef, ObjectHandle};
use crate::value::HostThrowable;

/// Everything a bridge keeps alive for its context.
///
/// All sequences are append-only; indices are never reused while the bridge lives. Script
/// values held here must be dropped while the engine lock is held, which `clear` is for.
#[derive(Default)]
pub struct BridgeState {
    /// Closure data of every installed callable
    managed: Vec<Arc<CallableData>>,
    /// Objects defined by the host, indexed by `ObjectHandle`
    defined_objects: Vec<Persistent<Object<'static>>>,
    /// Promise resolvers, indexed by `FunctionHandle`
    created_functions: Vec<Persistent<Function<'static>>>,
    /// Hosts backing defined members
    global_refs: Vec<Arc<dyn Host>>,
    /// Promise produced by the last asynchronous evaluation
    pending_result: Option<Persistent<Value<'static>>>,
    /// Module bytecode waiting to be evaluated before the next evaluation
    modules: Vec<Vec<u8>>,
    /// Exception raised by a host callback during the current evaluation
    host_error: Option<HostThrowable>,
}

impl BridgeState {
    /// Retain closure data until teardown.
    pub fn manage(&mut self, data: Arc<CallableData>) {
        self.managed.push(data);
    }

    /// Number of callables installed so far.
    pub fn managed_count(&self) -> usize {
        self.managed.len()
    }

    /// Append a defined object and return its handle.
    pub fn push_defined_object(&mut self, object: Persistent<Object<'static>>) -> ObjectHandle {
        self.defined_objects.push(object);
        ObjectHandle::from_raw(self.defined_objects.len() as i64 - 1)
    }

    /// Look up a defined object.
    ///
    /// # Errors
    /// Returns `HandleOutOfBounds` for negative or unknown handles.
    pub fn defined_object(
        &self,
        handle: ObjectHandle,
    ) -> BridgeResult<Persistent<Object<'static>>> {
        index(handle.as_raw(), self.defined_objects.len())
            .map(|slot| self.defined_objects[slot].clone())
            .ok_or(BridgeError::HandleOutOfBounds(handle.as_raw()))
    }

    /// Append a resolve/reject pair. The handles are consecutive.
    pub fn push_resolvers(
        &mut self,
        resolve: Persistent<Function<'static>>,
        reject: Persistent<Function<'static>>,
    ) -> (FunctionHandle, FunctionHandle) {
        let resolve_handle = FunctionHandle::from_raw(self.created_functions.len() as i64);
        self.created_functions.push(resolve);
        let reject_handle = FunctionHandle::from_raw(self.created_functions.len() as i64);
        self.created_functions.push(reject);
        (resolve_handle, reject_handle)
    }

    /// Look up a created function.
    ///
    /// # Errors
    /// Returns `HandleOutOfBounds` for negative or unknown handles.
    pub fn created_function(
        &self,
        handle: FunctionHandle,
    ) -> BridgeResult<Persistent<Function<'static>>> {
        index(handle.as_raw(), self.created_functions.len())
            .map(|slot| self.created_functions[slot].clone())
            .ok_or(BridgeError::HandleOutOfBounds(handle.as_raw()))
    }

    /// Number of created functions so far.
    pub fn created_function_count(&self) -> usize {
        self.created_functions.len()
    }

    /// Retain a host for as long as the bridge lives.
    pub fn register_global_reference(&mut self, host: Arc<dyn Host>) -> GlobalRef {
        self.global_refs.push(host);
        GlobalRef(self.global_refs.len() - 1)
    }

    /// Host behind a global reference.
    pub fn global_reference(&self, reference: GlobalRef) -> Option<Arc<dyn Host>> {
        self.global_refs.get(reference.0).map(Arc::clone)
    }

    /// Drop every retained host.
    pub fn release_all_global_references(&mut self) {
        self.global_refs.clear();
    }

    /// Park a new pending result, releasing the previous one.
    pub fn set_pending_result(&mut self, promise: Persistent<Value<'static>>) {
        if self.pending_result.replace(promise).is_some() {
            tracing::debug!("Replaced an unconsumed pending result");
        }
    }

    /// Take the pending result, leaving the slot empty.
    pub fn take_pending_result(&mut self) -> Option<Persistent<Value<'static>>> {
        self.pending_result.take()
    }

    /// Queue module bytecode.
    pub fn queue_module(&mut self, bytecode: Vec<u8>) {
        self.modules.push(bytecode);
    }

    /// Take every queued module.
    pub fn take_modules(&mut self) -> Vec<Vec<u8>> {
        mem::take(&mut self.modules)
    }

    /// Record the exception a host callback raised.
    pub fn set_host_error(&mut self, throwable: HostThrowable) {
        self.host_error = Some(throwable);
    }

    /// Take the recorded host exception.
    pub fn take_host_error(&mut self) -> Option<HostThrowable> {
        self.host_error.take()
    }

    /// Release everything. Must run inside the engine lock.
    pub fn clear(&mut self) {
        self.pending_result = None;
        self.created_functions.clear();
        self.defined_objects.clear();
        self.managed.clear();
        self.modules.clear();
        self.host_error = None;
        self.release_all_global_references();
    }
}

/// Validate a raw handle against an arena length.
fn index(raw: i64, len: usize) -> Option<usize> {
    usize::try_from(raw).ok().filter(|slot| *slot < len)
}
