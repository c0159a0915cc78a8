//! The per-context bridge: host member definitions, evaluation, and async results.

/// Member declarations.
mod binding;
/// Host-backed callables.
mod callable;
/// Evaluation inside the engine scope.
pub mod eval;

pub use binding::{FunctionBinding, ObjectBinding, PropertyBinding};
pub use eval::Evaluation;
pub use callable::CallableData;

use std::sync::Arc;

use rquickjs::object::Property;
use rquickjs::{Ctx, Object, Persistent};

use crate::engine::{EngineRef, JsContext};
use crate::error::{BridgeError, BridgeResult};
use crate::host::Host;
use crate::marshal::surface;
use crate::registry::{BridgeShared, ExceptionTypes, FunctionHandle, GlobalRef, ObjectHandle};
use crate::rejection;
use crate::value::HostValue;

/// File name used when a request does not name one.
pub const DEFAULT_FILENAME: &str = "main.js";

/// Source code to evaluate or compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalRequest {
    /// Source text
    code: String,
    /// Name used in stack traces, and the module name for modules
    filename: String,
    /// Evaluate as an ES module
    module: bool,
    /// Park the resulting promise instead of converting the completion value
    async_result: bool,
}

impl EvalRequest {
    /// An asynchronous global script request.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            filename: DEFAULT_FILENAME.to_owned(),
            module: false,
            async_result: true,
        }
    }

    /// Set the file name.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Evaluate as an ES module.
    #[must_use]
    pub fn module(mut self) -> Self {
        self.module = true;
        self
    }

    /// Convert the completion value immediately instead of parking a promise.
    #[must_use]
    pub fn synchronous(mut self) -> Self {
        self.async_result = false;
        self
    }

    /// Source text.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// File name.
    pub fn file_name(&self) -> &str {
        &self.filename
    }

    /// Whether this is a module.
    pub fn is_module(&self) -> bool {
        self.module
    }

    /// Whether the result is parked as a pending promise.
    pub fn is_async(&self) -> bool {
        self.async_result
    }
}

/// Host bindings and evaluation state for one context.
///
/// Every method enters the engine; calling one from inside a host callback on the same
/// thread fails with `Reentrant`. Use the callback's `CallScope` there instead.
pub struct Bridge {
    /// Arenas and caches; `None` once released
    shared: Option<Arc<BridgeShared>>,
    /// Context the bridge is bound to
    engine: EngineRef,
}

impl Bridge {
    /// Initialize a bridge on a context with an empty exception type registry.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` if the context or runtime is gone, or `Reentrant`.
    pub fn init(context: &JsContext, host: Arc<dyn Host>) -> BridgeResult<Self> {
        Self::init_with_exception_types(context, host, Arc::new(ExceptionTypes::new()))
    }

    /// Initialize a bridge that maps script errors through `exception_types`.
    ///
    /// Installs the runtime's promise rejection tracker, replacing that of any other bridge
    /// on the same runtime.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` if the context or runtime is gone, or `Reentrant`.
    pub fn init_with_exception_types(
        context: &JsContext,
        host: Arc<dyn Host>,
        exception_types: Arc<ExceptionTypes>,
    ) -> BridgeResult<Self> {
        let engine = context.engine()?;
        let shared = Arc::new(BridgeShared::new(host, exception_types));
        let weak = Arc::downgrade(&shared);
        engine.with_runtime(|runtime| rejection::install(runtime, weak))?;
        tracing::debug!("Bridge initialized");
        Ok(Self {
            shared: Some(shared),
            engine,
        })
    }

    /// Release every script value and host reference the bridge holds.
    ///
    /// Callables installed by the bridge throw once it is released.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` if already released.
    pub fn release(&mut self) -> BridgeResult<()> {
        let shared = self.shared.take().ok_or(BridgeError::EngineDestroyed("Bridge"))?;
        if self.engine.is_entered() {
            // Released from a callback on the thread that already owns the engine.
            shared.teardown();
            if !self.engine.clear_rejection_tracker_entered() {
                tracing::warn!("Promise rejection tracker left installed");
            }
        } else {
            self.engine.with_unchecked(|_ctx| {
                shared.teardown();
                Ok(())
            })?;
            if let Err(error) = self.engine.with_runtime_unchecked(rejection::uninstall) {
                tracing::warn!("Promise rejection tracker left installed: {error}");
            }
        }
        tracing::debug!("Bridge released");
        Ok(())
    }

    /// Whether `release` already ran.
    pub fn is_released(&self) -> bool {
        self.shared.is_none()
    }

    /// Registry used to map script errors to host types.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` after release.
    pub fn exception_types(&self) -> BridgeResult<&Arc<ExceptionTypes>> {
        Ok(&self.shared()?.exception_types)
    }

    /// Define an object backed by the bridge's host.
    ///
    /// # Errors
    /// Returns `HandleOutOfBounds` for an unknown parent, or an engine error.
    pub fn define_object(&self, binding: &ObjectBinding) -> BridgeResult<ObjectHandle> {
        let host = Arc::clone(&self.shared()?.host);
        self.define_object_with_host(binding, host)
    }

    /// Define an object whose callbacks go to `host` instead of the bridge's host.
    ///
    /// # Errors
    /// Returns `HandleOutOfBounds` for an unknown parent, or an engine error.
    pub fn define_object_with_host(
        &self,
        binding: &ObjectBinding,
        host: Arc<dyn Host>,
    ) -> BridgeResult<ObjectHandle> {
        self.run(|ctx, shared| {
            let parent = match binding.parent {
                Some(handle) if !handle.is_global() => {
                    shared.state().defined_object(handle)?.restore(ctx)?
                }
                _ => ctx.globals(),
            };
            let global_ref = shared.state().register_global_reference(host);
            let object = Object::new(ctx.clone())?;
            let handle = shared
                .state()
                .push_defined_object(Persistent::save(ctx, object.clone()));
            for property in &binding.properties {
                let data = managed(shared, handle, &property.name, global_ref);
                callable::install_property(&object, &data, property)?;
            }
            for function in &binding.functions {
                let data = managed(shared, handle, &function.name, global_ref);
                callable::install_function(ctx, &object, &data, function.is_async)?;
            }
            parent.prop(
                binding.name.as_str(),
                Property::from(object).writable().configurable(),
            )?;
            tracing::debug!(
                "Defined object {} as {handle} ({} properties, {} functions)",
                binding.name,
                binding.properties.len(),
                binding.functions.len()
            );
            Ok(handle)
        })
    }

    /// Define a function on the global scope, backed by the bridge's host. Callbacks receive
    /// `ObjectHandle::GLOBAL_THIS`.
    ///
    /// # Errors
    /// Returns an engine error if the function cannot be installed.
    pub fn define_function(&self, binding: &FunctionBinding) -> BridgeResult<()> {
        let host = Arc::clone(&self.shared()?.host);
        self.define_function_with_host(binding, host)
    }

    /// Define a global function whose callbacks go to `host`.
    ///
    /// # Errors
    /// Returns an engine error if the function cannot be installed.
    pub fn define_function_with_host(
        &self,
        binding: &FunctionBinding,
        host: Arc<dyn Host>,
    ) -> BridgeResult<()> {
        self.run(|ctx, shared| {
            let global_ref = shared.state().register_global_reference(host);
            let data = managed(shared, ObjectHandle::GLOBAL_THIS, &binding.name, global_ref);
            callable::install_function(ctx, &ctx.globals(), &data, binding.is_async)?;
            tracing::debug!("Defined global function {}", binding.name);
            Ok(())
        })
    }

    /// Evaluate a script or module.
    ///
    /// An async request returns `Evaluation::Pending`; drive jobs and call
    /// `try_resolve_execute_result` (or `await_result`) for the value.
    ///
    /// # Errors
    /// Returns `Script` or `Host` when evaluation throws, `AsyncFlagMismatch`, or a
    /// conversion error for synchronous results.
    pub fn evaluate(&self, request: &EvalRequest) -> BridgeResult<Evaluation> {
        self.run(|ctx, shared| eval::evaluate(ctx, shared, request))
    }

    /// Compile to bytecode without running.
    ///
    /// # Errors
    /// Returns `Script` for syntax errors.
    pub fn compile(&self, request: &EvalRequest) -> BridgeResult<Vec<u8>> {
        self.run(|ctx, shared| eval::compile(ctx, shared, request))
    }

    /// Run bytecode from `compile`. The result is always pending.
    ///
    /// # Errors
    /// Returns `Engine` for malformed bytecode, `Script` or `Host` when evaluation throws.
    pub fn execute(&self, bytecode: &[u8]) -> BridgeResult<Evaluation> {
        self.run(|ctx, shared| eval::execute(ctx, shared, bytecode))
    }

    /// Compile a module and queue it for evaluation before the next `evaluate`/`execute`.
    ///
    /// # Errors
    /// Returns `Script` for syntax errors.
    pub fn add_module(&self, name: &str, code: &str) -> BridgeResult<()> {
        let request = EvalRequest::new(code).filename(name).module();
        let bytecode = self.compile(&request)?;
        self.add_module_bytecode(bytecode)
    }

    /// Queue precompiled module bytecode.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` after release.
    pub fn add_module_bytecode(&self, bytecode: Vec<u8>) -> BridgeResult<()> {
        self.shared()?.state().queue_module(bytecode);
        Ok(())
    }

    /// Invoke a created function, such as a promise resolver, from outside script.
    ///
    /// # Errors
    /// Returns `HandleOutOfBounds`, conversion errors, or `Script` if the function throws.
    pub fn call_function(&self, handle: FunctionHandle, args: Vec<HostValue>) -> BridgeResult<()> {
        self.run(|ctx, shared| eval::call_function(ctx, shared, handle, args))
    }

    /// Run one job from the engine's queue. Returns whether a job ran.
    ///
    /// # Errors
    /// Returns `PendingJob` when the job threw.
    pub fn try_execute_pending_job(&self) -> BridgeResult<bool> {
        self.shared()?;
        self.engine.execute_pending_job()
    }

    /// Whether the engine has queued jobs.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` or `Reentrant`.
    pub fn is_job_pending(&self) -> BridgeResult<bool> {
        self.shared()?;
        self.engine.with_runtime(|runtime| runtime.is_job_pending())
    }

    /// Consume the pending result.
    ///
    /// # Errors
    /// Returns `NoPendingResult`, `InvalidPendingResult`, or the rejection as `Script` or
    /// `Host`.
    pub fn try_resolve_execute_result(&self) -> BridgeResult<HostValue> {
        self.run(|ctx, shared| eval::resolve_result(ctx, shared))
    }

    /// Drain the job queue, then consume the pending result.
    ///
    /// # Errors
    /// Returns `PendingJob` if a job throws, or whatever `try_resolve_execute_result` returns.
    pub fn await_result(&self) -> BridgeResult<HostValue> {
        while self.try_execute_pending_job()? {}
        self.try_resolve_execute_result()
    }

    /// Live state, or `EngineDestroyed` after release.
    fn shared(&self) -> BridgeResult<&Arc<BridgeShared>> {
        self.shared
            .as_ref()
            .ok_or(BridgeError::EngineDestroyed("Bridge"))
    }

    /// Enter the engine with the bridge state, turning a pending script exception left by
    /// the operation into a `Script` error.
    fn run<F, R>(&self, operation: F) -> BridgeResult<R>
    where
        F: for<'js> FnOnce(&Ctx<'js>, &Arc<BridgeShared>) -> BridgeResult<R> + Send,
        R: Send,
    {
        let shared = self.shared()?;
        self.engine.with(|ctx| {
            operation(&ctx, shared).map_err(|error| surface(&ctx, shared, error))
        })
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if self.shared.is_some()
            && let Err(error) = self.release()
        {
            tracing::warn!("Failed to release bridge: {error}");
        }
    }
}

/// Create closure data for a member and hand ownership to the bridge state.
fn managed(
    shared: &Arc<BridgeShared>,
    object: ObjectHandle,
    member: &str,
    global_ref: GlobalRef,
) -> Arc<CallableData> {
    let data = Arc::new(CallableData::new(
        object,
        member,
        global_ref,
        Arc::downgrade(shared),
    ));
    shared.state().manage(Arc::clone(&data));
    data
}
