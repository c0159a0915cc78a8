//! Bidirectional value marshalling and host callbacks for an embedded `QuickJS` engine.
//!
//! This crate provides:
//! - `JsRuntime` and `JsContext` lifecycle handles with resource limits
//! - `Bridge`, which exposes host-backed objects and functions to script
//! - Conversion between `HostValue` and script values, with cycle detection
//! - Evaluation, bytecode compilation, and async result consumption
//! - Mapping of script errors to registered host exception types
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        reason = "Allow for tests"
    )
)]

/// Host bindings and evaluation.
mod bridge;
/// Runtime limits.
mod config;
/// Runtime and context lifecycle.
mod engine;
/// Error types and result definitions.
mod error;
/// The host callback protocol.
mod host;
/// Value conversion.
mod marshal;
/// Handles, arenas and caches.
mod registry;
/// Unhandled rejection forwarding.
mod rejection;
/// Host value model.
mod value;

#[cfg(test)]
mod testing;

pub use bridge::{
    Bridge, DEFAULT_FILENAME, EvalRequest, Evaluation, FunctionBinding, ObjectBinding,
    PropertyBinding,
};
pub use config::{DEFAULT_MAX_STACK_SIZE, RuntimeConfig};
pub use engine::{JsContext, JsRuntime, MemoryUsage, version};
pub use error::{BridgeError, BridgeResult};
pub use host::{CallScope, Host, HostResult};
pub use marshal::FUNCTION_PLACEHOLDER;
pub use registry::{ExceptionFactory, ExceptionTypes, FunctionHandle, ObjectHandle, PromiseHandles};
pub use value::{
    HostList, HostMap, HostObject, HostSet, HostThrowable, HostValue, Shared, shared,
};
