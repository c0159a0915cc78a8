//! Engine calls that the safe binding does not expose: evaluation with explicit flags,
//! bytecode serialization, value tags and stack bounds.
#![allow(
    unsafe_code,
    reason = "Direct QuickJS calls for bytecode, eval flags and stack bounds"
)]

use core::ptr::{self, NonNull};
use core::slice;
use std::ffi::{CStr, CString};

use rquickjs::{Ctx, Error as QuickJsError, Result as QuickJsResult, Value, qjs};

/// How a source text is evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalFlags {
    /// Evaluate as an ES module instead of a global script
    pub module: bool,
    /// Return a promise of the completion value (global scripts only)
    pub async_result: bool,
    /// Compile without running
    pub compile_only: bool,
}

impl EvalFlags {
    /// Raw flag word.
    fn bits(self) -> i32 {
        let mut bits = if self.module {
            qjs::JS_EVAL_TYPE_MODULE
        } else {
            qjs::JS_EVAL_TYPE_GLOBAL
        };
        if self.async_result && !self.module {
            bits |= qjs::JS_EVAL_FLAG_ASYNC;
        }
        if self.compile_only {
            bits |= qjs::JS_EVAL_FLAG_COMPILE_ONLY;
        }
        bits as i32
    }
}

/// Evaluate (or compile) source text under a file name.
///
/// # Errors
/// Returns `Exception` when the script throws; the exception stays pending in `ctx`.
pub fn eval<'js>(
    ctx: &Ctx<'js>,
    filename: &str,
    code: &str,
    flags: EvalFlags,
) -> QuickJsResult<Value<'js>> {
    let source = CString::new(code)?;
    let file = CString::new(filename)?;
    // SAFETY: both strings are NUL terminated and outlive the call; the length excludes the
    // terminator as the engine expects, and the context pointer is live for `'js`.
    let raw = unsafe {
        qjs::JS_Eval(
            ctx.as_raw().as_ptr(),
            source.as_ptr(),
            code.len() as _,
            file.as_ptr(),
            flags.bits(),
        )
    };
    adopt(ctx, raw)
}

/// Serialize compiled bytecode or a module.
///
/// # Errors
/// Returns `Exception` if the engine cannot serialize the value.
pub fn write_bytecode<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> QuickJsResult<Vec<u8>> {
    let mut len = 0;
    // SAFETY: the value is borrowed, not consumed, and belongs to this context.
    let buffer = unsafe {
        qjs::JS_WriteObject(
            ctx.as_raw().as_ptr(),
            &mut len,
            value.as_raw(),
            (qjs::JS_WRITE_OBJ_BYTECODE | qjs::JS_WRITE_OBJ_REFERENCE) as i32,
        )
    };
    if buffer.is_null() {
        return Err(QuickJsError::Exception);
    }
    // SAFETY: on success the engine returns a buffer of exactly `len` initialized bytes.
    let bytes = unsafe { slice::from_raw_parts(buffer, len as usize) }.to_vec();
    // SAFETY: the buffer was allocated by this context's allocator and is freed once.
    unsafe { qjs::js_free(ctx.as_raw().as_ptr(), buffer.cast()) };
    Ok(bytes)
}

/// Deserialize bytecode produced by `write_bytecode`.
///
/// # Errors
/// Returns `Exception` if the buffer is not valid bytecode for this engine version.
pub fn read_bytecode<'js>(ctx: &Ctx<'js>, bytes: &[u8]) -> QuickJsResult<Value<'js>> {
    // SAFETY: the engine copies out of the borrowed buffer and does not retain it.
    let raw = unsafe {
        qjs::JS_ReadObject(
            ctx.as_raw().as_ptr(),
            bytes.as_ptr(),
            bytes.len() as _,
            qjs::JS_READ_OBJ_BYTECODE as i32,
        )
    };
    adopt(ctx, raw)
}

/// Link a deserialized module against the modules already loaded.
///
/// # Errors
/// Returns `Exception` if an import cannot be resolved.
pub fn resolve_module<'js>(ctx: &Ctx<'js>, module: &Value<'js>) -> QuickJsResult<()> {
    // SAFETY: the module value is borrowed and belongs to this context.
    let status = unsafe { qjs::JS_ResolveModule(ctx.as_raw().as_ptr(), module.as_raw()) };
    if status < 0 {
        return Err(QuickJsError::Exception);
    }
    Ok(())
}

/// Run deserialized bytecode or a module.
///
/// # Errors
/// Returns `Exception` when the code throws.
pub fn eval_function<'js>(ctx: &Ctx<'js>, function: Value<'js>) -> QuickJsResult<Value<'js>> {
    let context = ctx.as_raw().as_ptr();
    // SAFETY: `JS_EvalFunction` consumes one reference; the duplicate handed over here is that
    // reference, and `function` still releases its own when dropped.
    let raw = unsafe {
        qjs::JS_EvalFunction(context, qjs::JS_DupValue(context, function.as_raw()))
    };
    drop(function);
    adopt(ctx, raw)
}

/// Whether a value is compiled script bytecode.
pub fn is_bytecode(value: &Value<'_>) -> bool {
    // SAFETY: reading the tag does not touch the referenced object.
    unsafe { qjs::JS_VALUE_GET_NORM_TAG(value.as_raw()) == qjs::JS_TAG_FUNCTION_BYTECODE }
}

/// Whether a value is a compiled module.
pub fn is_module(value: &Value<'_>) -> bool {
    // SAFETY: reading the tag does not touch the referenced object.
    unsafe { qjs::JS_VALUE_GET_NORM_TAG(value.as_raw()) == qjs::JS_TAG_MODULE }
}

/// Re-read the stack bounds for the calling thread.
pub fn update_stack_top(ctx: &Ctx<'_>) {
    // SAFETY: the runtime pointer comes from a live context and the runtime lock is held.
    unsafe { qjs::JS_UpdateStackTop(qjs::JS_GetRuntime(ctx.as_raw().as_ptr())) };
}

/// Address of the engine runtime a context belongs to.
///
/// Only dereferenced while the calling thread already owns the engine.
#[derive(Debug, Clone, Copy)]
pub struct RuntimePtr(NonNull<qjs::JSRuntime>);

// SAFETY: the pointer is only passed to the engine by a thread holding the runtime's entry
// guard, so it is never used from two threads at once.
unsafe impl Send for RuntimePtr {}

// SAFETY: see the `Send` impl.
unsafe impl Sync for RuntimePtr {}

/// Runtime of a live context.
pub fn runtime_ptr(ctx: &Ctx<'_>) -> Option<RuntimePtr> {
    // SAFETY: the context pointer is live for the duration of the borrow.
    NonNull::new(unsafe { qjs::JS_GetRuntime(ctx.as_raw().as_ptr()) }).map(RuntimePtr)
}

/// Stop reporting promise rejections to the binding's tracker.
///
/// For callers already inside the engine, where the binding's own setter would wait on the
/// runtime lock their outer frame holds. The boxed tracker stays owned by the binding and is
/// replaced or freed by it later.
///
/// # Safety
/// The calling thread must own the engine and the runtime must still be alive.
pub unsafe fn clear_rejection_tracker(runtime: RuntimePtr) {
    // SAFETY: upheld by the caller.
    unsafe { qjs::JS_SetHostPromiseRejectionTracker(runtime.0.as_ptr(), None, ptr::null_mut()) };
}

/// Version string of the bundled engine.
pub fn version() -> String {
    // SAFETY: the engine returns a pointer to a static NUL terminated string.
    unsafe { CStr::from_ptr(qjs::JS_GetVersion()) }
        .to_string_lossy()
        .into_owned()
}

/// Take ownership of a raw result, turning the exception marker into an error.
fn adopt<'js>(ctx: &Ctx<'js>, raw: qjs::JSValue) -> QuickJsResult<Value<'js>> {
    // SAFETY: reading the tag does not touch the referenced object.
    if unsafe { qjs::JS_VALUE_GET_NORM_TAG(raw) } == qjs::JS_TAG_EXCEPTION {
        return Err(QuickJsError::Exception);
    }
    // SAFETY: `raw` is an owned reference returned by the engine for this context.
    Ok(unsafe { Value::from_raw(ctx.clone(), raw) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    /// Tests the flag word for each evaluation mode.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_eval_flag_bits() {
        let global = EvalFlags::default().bits();
        assert_eq!(global, qjs::JS_EVAL_TYPE_GLOBAL as i32);

        let module = EvalFlags {
            module: true,
            async_result: true,
            compile_only: false,
        }
        .bits();
        assert_eq!(module & qjs::JS_EVAL_FLAG_ASYNC as i32, 0);
        assert_ne!(module & qjs::JS_EVAL_TYPE_MODULE as i32, 0);

        let compile = EvalFlags {
            module: false,
            async_result: true,
            compile_only: true,
        }
        .bits();
        assert_ne!(compile & qjs::JS_EVAL_FLAG_COMPILE_ONLY as i32, 0);
        assert_ne!(compile & qjs::JS_EVAL_FLAG_ASYNC as i32, 0);
    }

    /// Tests that bytecode survives a write and read and runs once loaded.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_bytecode_round_trip_runs() {
        let runtime = Runtime::new().expect("runtime should start");
        let context = Context::full(&runtime).expect("context should start");
        context.with(|ctx| {
            let flags = EvalFlags {
                compile_only: true,
                ..EvalFlags::default()
            };
            let compiled = eval(&ctx, "answer.js", "6 * 7", flags).expect("code should compile");
            assert!(is_bytecode(&compiled));
            let bytes = write_bytecode(&ctx, &compiled).expect("bytecode should serialize");
            let loaded = read_bytecode(&ctx, &bytes).expect("bytecode should load");
            let value = eval_function(&ctx, loaded).expect("bytecode should run");
            assert_eq!(value.as_int(), Some(42));
            assert!(runtime_ptr(&ctx).is_some());
        });
    }

    /// Tests that the version string is not empty.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
