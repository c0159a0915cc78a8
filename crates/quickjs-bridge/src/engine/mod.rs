//! Runtime and context lifecycle.

/// Single-owner entry guard.
mod guard;
/// Memory counters.
mod memory;
/// Raw engine calls.
pub mod raw;

pub use memory::MemoryUsage;
pub use guard::EngineGuard;

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rquickjs::{Context, Ctx, Runtime};

use crate::config::RuntimeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::exception_text;

/// Version string of the bundled `QuickJS` engine.
pub fn version() -> String {
    raw::version()
}

/// State every handle derived from a runtime shares.
#[derive(Debug)]
pub struct RuntimeShared {
    /// Cleared by `JsRuntime::destroy`
    alive: AtomicBool,
    /// Serializes entry into the engine
    pub guard: EngineGuard,
}

/// One script engine instance.
///
/// Destroying the runtime invalidates every context and bridge created from it; later
/// operations on them fail with `EngineDestroyed`.
pub struct JsRuntime {
    /// Engine, `None` once destroyed
    runtime: Option<Runtime>,
    /// Liveness and entry guard
    shared: Arc<RuntimeShared>,
    /// Limits applied at creation
    config: RuntimeConfig,
}

impl JsRuntime {
    /// Create a runtime with the configured limits.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the engine cannot allocate.
    pub fn new(config: &RuntimeConfig) -> BridgeResult<Self> {
        config.validate()?;
        let runtime = Runtime::new()?;
        if let Some(limit) = config.memory_limit {
            runtime.set_memory_limit(limit);
        }
        runtime.set_max_stack_size(config.max_stack_size);
        if let Some(threshold) = config.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
        tracing::debug!(
            "Created runtime: memory_limit={:?}, max_stack_size={}",
            config.memory_limit,
            config.max_stack_size
        );
        Ok(Self {
            runtime: Some(runtime),
            shared: Arc::new(RuntimeShared {
                alive: AtomicBool::new(true),
                guard: EngineGuard::default(),
            }),
            config: config.clone(),
        })
    }

    /// Release the engine.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` if already destroyed, or `Reentrant` from inside a callback.
    pub fn destroy(&mut self) -> BridgeResult<()> {
        let entered = self.shared.guard.enter()?;
        let runtime = self
            .runtime
            .take()
            .ok_or(BridgeError::EngineDestroyed("Runtime"))?;
        self.shared.alive.store(false, Ordering::Release);
        drop(runtime);
        drop(entered);
        tracing::debug!("Destroyed runtime");
        Ok(())
    }

    /// Whether the runtime is still usable.
    pub fn is_alive(&self) -> bool {
        self.runtime.is_some()
    }

    /// Limits the runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Force a garbage collection cycle.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` after destruction.
    pub fn run_gc(&self) -> BridgeResult<()> {
        self.with_runtime(Runtime::run_gc)
    }

    /// Change the heap limit.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` after destruction.
    pub fn set_memory_limit(&self, bytes: usize) -> BridgeResult<()> {
        self.with_runtime(|runtime| runtime.set_memory_limit(bytes))
    }

    /// Change the stack limit.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` after destruction.
    pub fn set_max_stack_size(&self, bytes: usize) -> BridgeResult<()> {
        self.with_runtime(|runtime| runtime.set_max_stack_size(bytes))
    }

    /// Read the memory counters.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` after destruction.
    pub fn memory_usage(&self) -> BridgeResult<MemoryUsage> {
        self.with_runtime(|runtime| MemoryUsage::from(runtime.memory_usage()))
    }

    /// The live engine.
    fn runtime(&self) -> BridgeResult<&Runtime> {
        self.runtime
            .as_ref()
            .ok_or(BridgeError::EngineDestroyed("Runtime"))
    }

    /// Run an operation on the engine while owning it.
    fn with_runtime<R>(&self, operation: impl FnOnce(&Runtime) -> R) -> BridgeResult<R> {
        let runtime = self.runtime()?;
        let entered = self.shared.guard.enter()?;
        let result = operation(runtime);
        drop(entered);
        Ok(result)
    }
}

/// State a context and its bridges share.
#[derive(Debug)]
pub struct ContextShared {
    /// Cleared by `JsContext::destroy`
    alive: AtomicBool,
    /// Runtime the context belongs to
    runtime: Arc<RuntimeShared>,
    /// Engine runtime address for calls made from inside a callback
    raw_runtime: raw::RuntimePtr,
}

/// One evaluation context bound to a runtime.
pub struct JsContext {
    /// Context, `None` once destroyed; shared with every `EngineRef`
    context: Option<Arc<Context>>,
    /// Liveness shared with bridges
    shared: Arc<ContextShared>,
}

impl JsContext {
    /// Create a context with the standard intrinsics.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` if the runtime was destroyed.
    pub fn new(runtime: &JsRuntime) -> BridgeResult<Self> {
        let engine = runtime.runtime()?;
        let entered = runtime.shared.guard.enter()?;
        let context = Context::full(engine)?;
        let raw_runtime = context
            .with(|ctx| raw::runtime_ptr(&ctx))
            .ok_or(BridgeError::EngineDestroyed("Runtime"))?;
        drop(entered);
        tracing::debug!("Created context");
        Ok(Self {
            context: Some(Arc::new(context)),
            shared: Arc::new(ContextShared {
                alive: AtomicBool::new(true),
                runtime: Arc::clone(&runtime.shared),
                raw_runtime,
            }),
        })
    }

    /// Release the context.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` if already destroyed, or `Reentrant` from inside a callback.
    pub fn destroy(&mut self) -> BridgeResult<()> {
        let entered = self.shared.runtime.guard.enter()?;
        let context = self
            .context
            .take()
            .ok_or(BridgeError::EngineDestroyed("Context"))?;
        self.shared.alive.store(false, Ordering::Release);
        drop(context);
        drop(entered);
        tracing::debug!("Destroyed context");
        Ok(())
    }

    /// Whether the context is still usable.
    pub fn is_alive(&self) -> bool {
        self.context.is_some() && self.shared.runtime.alive.load(Ordering::Acquire)
    }

    /// Reference used by a bridge.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` if the context or its runtime was destroyed.
    pub fn engine(&self) -> BridgeResult<EngineRef> {
        let context = self
            .context
            .as_ref()
            .ok_or(BridgeError::EngineDestroyed("Context"))?;
        let engine = EngineRef {
            context: Arc::clone(context),
            shared: Arc::clone(&self.shared),
        };
        engine.check_alive()?;
        Ok(engine)
    }
}

/// A bridge's view of its context.
#[derive(Clone)]
pub struct EngineRef {
    /// Keeps the engine allocated until the bridge is gone.
    ///
    /// Shared rather than cloned: dropping a cloned `Context` releases the engine context twice.
    context: Arc<Context>,
    /// Liveness of the context and runtime
    shared: Arc<ContextShared>,
}

impl EngineRef {
    /// Fail if the host destroyed the context or runtime.
    pub fn check_alive(&self) -> BridgeResult<()> {
        if !self.shared.runtime.alive.load(Ordering::Acquire) {
            return Err(BridgeError::EngineDestroyed("Runtime"));
        }
        if !self.shared.alive.load(Ordering::Acquire) {
            return Err(BridgeError::EngineDestroyed("Context"));
        }
        Ok(())
    }

    /// Whether the calling thread is already inside this engine.
    pub fn is_entered(&self) -> bool {
        self.shared.runtime.guard.is_held_by_current_thread()
    }

    /// Stop promise rejection reports from inside a callback on this engine.
    ///
    /// The binding's own setter needs the runtime lock the callback's outer frame holds, so
    /// this goes to the engine directly. Returns `false` when the calling thread is not inside
    /// the engine; use `with_runtime_unchecked` there.
    #[allow(unsafe_code, reason = "Raw tracker reset while the runtime lock is already held")]
    pub fn clear_rejection_tracker_entered(&self) -> bool {
        if !self.is_entered() || !self.shared.runtime.alive.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: this thread owns the engine and the runtime is alive; the `Arc<Context>`
        // held here keeps it allocated.
        unsafe { raw::clear_rejection_tracker(self.shared.raw_runtime) };
        true
    }

    /// Run a closure inside the context while owning the engine.
    ///
    /// # Errors
    /// Returns `EngineDestroyed`, `Reentrant`, or whatever the closure returns.
    pub fn with<F, R>(&self, operation: F) -> BridgeResult<R>
    where
        F: for<'js> FnOnce(Ctx<'js>) -> BridgeResult<R> + Send,
        R: Send,
    {
        self.check_alive()?;
        self.with_unchecked(operation)
    }

    /// Like `with`, but also runs after the host destroyed its handles. Used for teardown.
    ///
    /// # Errors
    /// Returns `Reentrant`, or whatever the closure returns.
    pub fn with_unchecked<F, R>(&self, operation: F) -> BridgeResult<R>
    where
        F: for<'js> FnOnce(Ctx<'js>) -> BridgeResult<R> + Send,
        R: Send,
    {
        let entered = self.shared.runtime.guard.enter()?;
        let result = self.context.with(|ctx| {
            raw::update_stack_top(&ctx);
            operation(ctx)
        });
        drop(entered);
        result
    }

    /// Run one queued job. Returns whether a job ran.
    ///
    /// # Errors
    /// Returns `EngineDestroyed`, `Reentrant`, or `PendingJob` when the job threw.
    pub fn execute_pending_job(&self) -> BridgeResult<bool> {
        self.check_alive()?;
        let entered = self.shared.runtime.guard.enter()?;
        self.context.with(|ctx| raw::update_stack_top(&ctx));
        let result = self.context.runtime().execute_pending_job().map_err(|job| {
            let text = job.0.with(|ctx| exception_text(&ctx.catch()));
            tracing::warn!("Pending job failed: {text}");
            BridgeError::PendingJob(text)
        });
        drop(entered);
        result
    }

    /// Run an operation on the runtime while owning it, outside any context scope.
    ///
    /// # Errors
    /// Returns `EngineDestroyed` or `Reentrant`.
    pub fn with_runtime<R>(&self, operation: impl FnOnce(&Runtime) -> R) -> BridgeResult<R> {
        self.check_alive()?;
        self.with_runtime_unchecked(operation)
    }

    /// Like `with_runtime`, but also runs after the host destroyed its handles.
    ///
    /// # Errors
    /// Returns `Reentrant` from inside a callback.
    pub fn with_runtime_unchecked<R>(
        &self,
        operation: impl FnOnce(&Runtime) -> R,
    ) -> BridgeResult<R> {
        let entered = self.shared.runtime.guard.enter()?;
        let result = operation(self.context.runtime());
        drop(entered);
        Ok(result)
    }
}
