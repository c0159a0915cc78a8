//! Evaluation, bytecode, and pending result handling inside one engine scope.

use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Error as QuickJsError, Persistent, Value};

use crate::bridge::EvalRequest;
use crate::engine::raw::{self, EvalFlags};
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::{Marshal, script_throwable};
use crate::registry::{BridgeShared, FunctionHandle, Intrinsic};
use crate::value::{HostThrowable, HostValue};

/// Outcome of starting an evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The script ran synchronously to this value.
    Completed(HostValue),
    /// A promise was parked; drive jobs and resolve it to get the value.
    Pending,
}

/// Evaluate a script or module.
///
/// # Errors
/// Returns `Script` or `Host` when evaluation throws, `AsyncFlagMismatch` when an async
/// request produced no promise, and conversion errors for synchronous results.
pub fn evaluate(
    ctx: &Ctx<'_>,
    shared: &BridgeShared,
    request: &EvalRequest,
) -> BridgeResult<Evaluation> {
    shared.state().take_host_error();
    load_modules(ctx, shared)?;
    let flags = EvalFlags {
        module: request.is_module(),
        async_result: request.is_async(),
        compile_only: false,
    };
    tracing::debug!(
        "Evaluating {} ({} bytes, module: {}, async: {})",
        request.file_name(),
        request.code().len(),
        flags.module,
        flags.async_result
    );
    let value = raw::eval(ctx, request.file_name(), request.code(), flags)
        .map_err(|error| eval_failure(ctx, shared, error))?;
    if request.is_async() {
        park(ctx, shared, value, !request.is_module())
    } else {
        Ok(Evaluation::Completed(Marshal::new(ctx, shared).to_host(value)?))
    }
}

/// Compile a script or module to bytecode without running it.
///
/// # Errors
/// Returns `Script` for syntax errors.
pub fn compile(
    ctx: &Ctx<'_>,
    shared: &BridgeShared,
    request: &EvalRequest,
) -> BridgeResult<Vec<u8>> {
    let flags = EvalFlags {
        module: request.is_module(),
        async_result: true,
        compile_only: true,
    };
    let compiled = raw::eval(ctx, request.file_name(), request.code(), flags)
        .map_err(|error| eval_failure(ctx, shared, error))?;
    let bytes = raw::write_bytecode(ctx, &compiled)?;
    tracing::debug!("Compiled {} to {} bytes", request.file_name(), bytes.len());
    Ok(bytes)
}

/// Run bytecode produced by `compile`. The result is always parked as pending.
///
/// # Errors
/// Returns `Engine` for malformed bytecode, `Script` or `Host` when evaluation throws, and
/// `AsyncFlagMismatch` when the bytecode was not compiled for async evaluation.
pub fn execute(
    ctx: &Ctx<'_>,
    shared: &BridgeShared,
    bytecode: &[u8],
) -> BridgeResult<Evaluation> {
    shared.state().take_host_error();
    load_modules(ctx, shared)?;
    let function = raw::read_bytecode(ctx, bytecode)?;
    let is_module = raw::is_module(&function);
    if is_module {
        raw::resolve_module(ctx, &function).map_err(|error| eval_failure(ctx, shared, error))?;
    }
    tracing::debug!("Executing {} bytes of bytecode (module: {is_module})", bytecode.len());
    let value =
        raw::eval_function(ctx, function).map_err(|error| eval_failure(ctx, shared, error))?;
    park(ctx, shared, value, !is_module)
}

/// Evaluate every queued module so that later evaluations can import them.
///
/// All modules are read before any is linked, so queue order does not matter for imports.
fn load_modules(ctx: &Ctx<'_>, shared: &BridgeShared) -> BridgeResult<()> {
    let queued = shared.state().take_modules();
    if queued.is_empty() {
        return Ok(());
    }
    tracing::debug!("Loading {} queued modules", queued.len());
    let modules = queued
        .iter()
        .map(|bytecode| raw::read_bytecode(ctx, bytecode))
        .collect::<Result<Vec<_>, _>>()?;
    for module in modules {
        raw::resolve_module(ctx, &module).map_err(|error| eval_failure(ctx, shared, error))?;
        let completion =
            raw::eval_function(ctx, module).map_err(|error| eval_failure(ctx, shared, error))?;
        drop(completion);
    }
    Ok(())
}

/// Wrap an evaluation promise so it settles with the completion value, and park it.
fn park<'js>(
    ctx: &Ctx<'js>,
    shared: &BridgeShared,
    value: Value<'js>,
    unwrap: bool,
) -> BridgeResult<Evaluation> {
    if value.as_promise().is_none() {
        return Err(BridgeError::AsyncFlagMismatch);
    }
    let adapter = shared.intrinsics.function(ctx, Intrinsic::AwaitCompletion)?;
    let settled: Value<'js> = adapter.call((value, unwrap))?;
    shared
        .state()
        .set_pending_result(Persistent::save(ctx, settled));
    Ok(Evaluation::Pending)
}

/// Take the pending result and convert its settled value.
///
/// A rejected result raises: the host exception that caused it if a callback failed,
/// otherwise the converted reason. A still-pending result yields its state string.
///
/// # Errors
/// Returns `NoPendingResult`, `InvalidPendingResult`, `Script` or `Host`.
pub fn resolve_result(ctx: &Ctx<'_>, shared: &BridgeShared) -> BridgeResult<HostValue> {
    let saved = shared
        .state()
        .take_pending_result()
        .ok_or(BridgeError::NoPendingResult)?;
    let value = saved.restore(ctx)?;
    let Some(promise) = value.as_promise() else {
        return Err(BridgeError::InvalidPendingResult);
    };
    match promise.result::<Value<'_>>() {
        None => {
            tracing::warn!("Resolved a result that is still pending; run pending jobs first");
            Ok(HostValue::from("Promise { <state>: \"pending\" }"))
        }
        Some(Ok(settled)) => Marshal::new(ctx, shared).to_host(settled),
        Some(Err(QuickJsError::Exception)) => rejected(shared, &ctx.catch()),
        Some(Err(other)) => Err(BridgeError::Engine(other)),
    }
}

/// Invoke a created function with converted arguments, discarding its result.
///
/// # Errors
/// Returns `HandleOutOfBounds` for unknown handles, conversion errors, or the pending
/// engine exception if the call throws.
pub fn call_function(
    ctx: &Ctx<'_>,
    shared: &BridgeShared,
    handle: FunctionHandle,
    args: Vec<HostValue>,
) -> BridgeResult<()> {
    let saved = shared.state().created_function(handle)?;
    let function = saved.restore(ctx)?;
    let script_args = Marshal::new(ctx, shared).args_to_script(&args)?;
    tracing::trace!("Calling created function {handle} with {} args", script_args.len());
    function.call::<_, Value<'_>>((Rest(script_args),))?;
    Ok(())
}

/// Error for a rejected result.
fn rejected(shared: &BridgeShared, reason: &Value<'_>) -> BridgeResult<HostValue> {
    if reason.is_null() {
        return Ok(HostValue::Null);
    }
    let error = classify(shared, reason);
    report(shared, &error);
    Err(error)
}

/// Map a failed `raw` call to a bridge error, consuming the pending exception.
fn eval_failure(ctx: &Ctx<'_>, shared: &BridgeShared, error: QuickJsError) -> BridgeError {
    if !matches!(error, QuickJsError::Exception) {
        return BridgeError::Engine(error);
    }
    let thrown = ctx.catch();
    let error = classify(shared, &thrown);
    report(shared, &error);
    error
}

/// `Host` when the thrown value is the error a host callback raised, `Script` otherwise.
fn classify(shared: &BridgeShared, thrown: &Value<'_>) -> BridgeError {
    let stashed = shared.state().take_host_error();
    match stashed {
        Some(throwable) if raised_as(thrown, &throwable) => BridgeError::Host(throwable),
        _ => BridgeError::Script(script_throwable(&shared.exception_types, thrown)),
    }
}

/// Whether a thrown script value is the script form of a host throwable.
fn raised_as(thrown: &Value<'_>, throwable: &HostThrowable) -> bool {
    thrown
        .as_exception()
        .and_then(|exception| {
            exception
                .as_object()
                .get::<_, Option<Coerced<String>>>("name")
                .ok()
                .flatten()
        })
        .is_some_and(|Coerced(name)| name == throwable.script_name())
}

/// Tell the host about a failed evaluation.
fn report(shared: &BridgeShared, error: &BridgeError) {
    tracing::debug!("Evaluation failed: {error}");
    shared.host.set_eval_exception(&error.to_throwable());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::with_shared;

    /// Tests that a synchronous request converts the completion value directly.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_synchronous_evaluation() {
        with_shared(|ctx, shared| {
            let request = EvalRequest::new("[1, 'two']").synchronous();
            let result = evaluate(&ctx, shared, &request).expect("evaluation should succeed");
            let Evaluation::Completed(HostValue::List(items)) = result else {
                panic!("expected a completed list");
            };
            assert_eq!(
                *items.read(),
                vec![HostValue::Long(1), HostValue::from("two")]
            );
        });
    }

    /// Tests that an async evaluation unwraps the completion record once settled.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_async_completion_unwrapped() {
        with_shared(|ctx, shared| {
            let request = EvalRequest::new("await Promise.resolve(20); 20 + 1");
            let result = evaluate(&ctx, shared, &request).expect("evaluation should succeed");
            assert_eq!(result, Evaluation::Pending);
            while ctx.execute_pending_job() {}
            let value = resolve_result(&ctx, shared).expect("result should resolve");
            assert_eq!(value, HostValue::Long(21));
            assert!(matches!(
                resolve_result(&ctx, shared),
                Err(BridgeError::NoPendingResult)
            ));
        });
    }

    /// Tests the shape of an uncaught script error.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_thrown_error_shape() {
        with_shared(|ctx, shared| {
            let request = EvalRequest::new("throw new RangeError('too far')").synchronous();
            let error = evaluate(&ctx, shared, &request).unwrap_err();
            let BridgeError::Script(throwable) = error else {
                panic!("expected a script error");
            };
            assert!(throwable.is_bridge_exception());
            let message = throwable.message().expect("message should be set");
            assert!(message.starts_with("RangeError: too far"), "{message}");
        });
    }

    /// Tests the state string for a result resolved before its jobs ran.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_resolve_before_jobs() {
        with_shared(|ctx, shared| {
            let request = EvalRequest::new("await new Promise(() => {})");
            evaluate(&ctx, shared, &request).expect("evaluation should start");
            let value = resolve_result(&ctx, shared).expect("pending state should be reported");
            assert_eq!(value, HostValue::from("Promise { <state>: \"pending\" }"));
        });
    }

    /// Tests that a rejection with `null` resolves to `Null` instead of raising.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_null_rejection() {
        with_shared(|ctx, shared| {
            let request = EvalRequest::new("await Promise.reject(null)");
            evaluate(&ctx, shared, &request).expect("evaluation should start");
            while ctx.execute_pending_job() {}
            assert_eq!(resolve_result(&ctx, shared).expect("null reason"), HostValue::Null);
        });
    }

    /// Tests that a non-error rejection reason is rendered into the bridge exception.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_value_rejection() {
        with_shared(|ctx, shared| {
            let request = EvalRequest::new("await Promise.reject(42)");
            evaluate(&ctx, shared, &request).expect("evaluation should start");
            while ctx.execute_pending_job() {}
            let error = resolve_result(&ctx, shared).unwrap_err();
            let BridgeError::Script(throwable) = error else {
                panic!("expected a script error");
            };
            assert_eq!(throwable.message(), Some("42"));
        });
    }

    /// Tests compiling and executing a script through bytecode.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_compile_then_execute() {
        with_shared(|ctx, shared| {
            let request = EvalRequest::new("const base = 40; base + 2").filename("answer.js");
            let bytecode = compile(&ctx, shared, &request).expect("compile should succeed");
            assert!(!bytecode.is_empty());
            let started = execute(&ctx, shared, &bytecode).expect("execute should start");
            assert_eq!(started, Evaluation::Pending);
            while ctx.execute_pending_job() {}
            assert_eq!(
                resolve_result(&ctx, shared).expect("result should resolve"),
                HostValue::Long(42)
            );
        });
    }

    /// Tests that syntax errors surface from compilation.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_compile_syntax_error() {
        with_shared(|ctx, shared| {
            let request = EvalRequest::new("let = ;");
            let error = compile(&ctx, shared, &request).unwrap_err();
            let BridgeError::Script(throwable) = error else {
                panic!("expected a script error");
            };
            assert!(
                throwable
                    .message()
                    .is_some_and(|message| message.starts_with("SyntaxError")),
                "{throwable}"
            );
        });
    }

    /// Tests that unknown created function handles are rejected.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_call_unknown_function() {
        with_shared(|ctx, shared| {
            let error = call_function(&ctx, shared, FunctionHandle::from_raw(3), Vec::new())
                .unwrap_err();
            assert!(matches!(error, BridgeError::HandleOutOfBounds(3)));
        });
    }
}
