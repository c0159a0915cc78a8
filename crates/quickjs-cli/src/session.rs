//! One engine with the CLI host installed.

use std::sync::Arc;

use anyhow::Result;
use quickjs_bridge::{
    Bridge, EvalRequest, Evaluation, Host, HostValue, JsContext, JsRuntime, RuntimeConfig,
    version,
};
use serde_json::to_string_pretty;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::host::{Completion, ConsoleHost};

/// Runtime, context and bridge for one CLI invocation.
///
/// Field order is drop order: the bridge releases its engine references before the context
/// and runtime go away.
pub struct Session {
    /// Bridge with `console` and `sleep` defined
    bridge: Bridge,
    /// Host backing the bridge
    host: Arc<ConsoleHost>,
    /// Fired timers waiting to resolve their promises
    completions: UnboundedReceiver<Completion>,
    /// Context the bridge is bound to
    _context: JsContext,
    /// Runtime owning the context
    runtime: JsRuntime,
}

impl Session {
    /// Create an engine with the given limits and install the CLI host.
    ///
    /// Must be called from inside a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if the engine cannot be created or the bindings cannot be defined.
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let runtime = JsRuntime::new(config)?;
        let context = JsContext::new(&runtime)?;
        let (host, completions) = ConsoleHost::new();
        let host = Arc::new(host);
        let bridge_host: Arc<dyn Host> = Arc::<ConsoleHost>::clone(&host);
        let bridge = Bridge::init(&context, bridge_host)?;
        bridge.define_object(&ConsoleHost::console_binding())?;
        bridge.define_function(&ConsoleHost::sleep_binding())?;
        tracing::debug!("Session ready on QuickJS {}", version());
        Ok(Self {
            bridge,
            host,
            completions,
            _context: context,
            runtime,
        })
    }

    /// Evaluate code and wait for its result, firing timers as they complete.
    ///
    /// # Errors
    /// Returns the script or host error the evaluation ended with.
    pub async fn run(&mut self, request: &EvalRequest) -> Result<HostValue> {
        match self.bridge.evaluate(request)? {
            Evaluation::Completed(value) => Ok(value),
            Evaluation::Pending => self.settle().await,
        }
    }

    /// Run bytecode produced by `compile` and wait for its result.
    ///
    /// # Errors
    /// Returns an error for invalid bytecode or when the script fails.
    pub async fn execute(&mut self, bytecode: &[u8]) -> Result<HostValue> {
        match self.bridge.execute(bytecode)? {
            Evaluation::Completed(value) => Ok(value),
            Evaluation::Pending => self.settle().await,
        }
    }

    /// Compile code to bytecode without running it.
    ///
    /// # Errors
    /// Returns the syntax error if the code does not compile.
    pub fn compile(&self, request: &EvalRequest) -> Result<Vec<u8>> {
        Ok(self.bridge.compile(request)?)
    }

    /// Memory counters rendered as pretty JSON.
    ///
    /// # Errors
    /// Returns an error if the runtime is gone or serialization fails.
    pub fn memory_usage(&self) -> Result<String> {
        self.runtime.run_gc()?;
        Ok(to_string_pretty(&self.runtime.memory_usage()?)?)
    }

    /// Drive jobs and timers until nothing can make progress, then take the result.
    async fn settle(&mut self) -> Result<HostValue> {
        loop {
            while self.bridge.try_execute_pending_job()? {}
            if self.host.in_flight() == 0 {
                break;
            }
            let Some(completion) = self.completions.recv().await else {
                break;
            };
            self.host.completed();
            self.bridge
                .call_function(completion.resolve, vec![completion.value])?;
        }
        Ok(self.bridge.try_resolve_execute_result()?)
    }
}
