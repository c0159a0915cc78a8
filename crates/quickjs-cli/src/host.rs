//! Host objects the CLI exposes to scripts: `console` and `sleep`.

use std::io::{self, Write as _};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use quickjs_bridge::{
    CallScope, FunctionBinding, FunctionHandle, Host, HostResult, HostThrowable, HostValue,
    ObjectBinding, ObjectHandle, PromiseHandles,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::sleep;

/// Name of the logging object.
pub const CONSOLE: &str = "console";

/// Console methods that write to stdout.
const STDOUT_METHODS: [&str; 3] = ["log", "info", "debug"];

/// Console methods that write to stderr.
const STDERR_METHODS: [&str; 2] = ["warn", "error"];

/// A timer that fired and the resolver to call with its value.
#[derive(Debug)]
pub struct Completion {
    /// Resolver of the promise the script is awaiting
    pub resolve: FunctionHandle,
    /// Value to settle the promise with
    pub value: HostValue,
}

/// Host backing `console` and `sleep`.
#[derive(Debug)]
pub struct ConsoleHost {
    /// Runtime timers are spawned on
    runtime: Handle,
    /// Where fired timers are reported
    completions: UnboundedSender<Completion>,
    /// Timers spawned but not yet delivered to the session
    in_flight: AtomicUsize,
}

impl ConsoleHost {
    /// Create the host and the receiving end of its timer channel.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn new() -> (Self, UnboundedReceiver<Completion>) {
        let (sender, receiver) = unbounded_channel();
        let host = Self {
            runtime: Handle::current(),
            completions: sender,
            in_flight: AtomicUsize::new(0),
        };
        (host, receiver)
    }

    /// Bindings for the `console` object.
    pub fn console_binding() -> ObjectBinding {
        STDOUT_METHODS
            .iter()
            .chain(STDERR_METHODS.iter())
            .fold(ObjectBinding::new(CONSOLE), |binding, method| {
                binding.with_function(FunctionBinding::new(*method))
            })
    }

    /// Binding for the global `sleep(ms)`.
    pub fn sleep_binding() -> FunctionBinding {
        FunctionBinding::asynchronous("sleep")
    }

    /// Number of timers whose completion has not been taken yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Record that a completion was taken off the channel.
    pub fn completed(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Spawn a timer that resolves after `millis`.
    fn start_timer(&self, mut args: Vec<HostValue>) -> HostResult<HostValue> {
        let handles = PromiseHandles::split(&mut args)?;
        let millis = args.first().and_then(HostValue::as_f64).unwrap_or(0.0);
        let delay = Duration::try_from_secs_f64(millis / 1000.0).map_err(|_| {
            HostThrowable::new("RangeError", format!("Invalid sleep duration: {millis}"))
        })?;
        let sender = self.completions.clone();
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        tracing::trace!("Timer for {delay:?} resolves {}", handles.resolve);
        self.runtime.spawn(async move {
            sleep(delay).await;
            if sender
                .send(Completion {
                    resolve: handles.resolve,
                    value: HostValue::Unit,
                })
                .is_err()
            {
                tracing::debug!("Session ended before timer {} fired", handles.resolve);
            }
        });
        Ok(HostValue::Unit)
    }
}

impl Host for ConsoleHost {
    fn on_call_getter(
        &self,
        _scope: &CallScope<'_, '_>,
        object: ObjectHandle,
        property: &str,
    ) -> HostResult<HostValue> {
        Err(HostThrowable::new(
            "ReferenceError",
            format!("Unknown property {property} on object {object}"),
        ))
    }

    fn on_call_setter(
        &self,
        _scope: &CallScope<'_, '_>,
        object: ObjectHandle,
        property: &str,
        _value: HostValue,
    ) -> HostResult<()> {
        Err(HostThrowable::new(
            "ReferenceError",
            format!("Unknown property {property} on object {object}"),
        ))
    }

    fn on_call_function(
        &self,
        _scope: &CallScope<'_, '_>,
        object: ObjectHandle,
        function: &str,
        args: Vec<HostValue>,
    ) -> HostResult<HostValue> {
        if object.is_global() {
            return match function {
                "sleep" => self.start_timer(args),
                other => Err(unknown_function(other)),
            };
        }
        let line = join(&args);
        let written = if STDOUT_METHODS.contains(&function) {
            writeln!(io::stdout().lock(), "{line}")
        } else if STDERR_METHODS.contains(&function) {
            writeln!(io::stderr().lock(), "{line}")
        } else {
            return Err(unknown_function(function));
        };
        written.map_err(|error| {
            HostThrowable::new("Error", format!("console.{function}: {error}"))
        })?;
        Ok(HostValue::Unit)
    }

    fn set_eval_exception(&self, throwable: &HostThrowable) {
        tracing::debug!("Evaluation failed: {throwable}");
    }

    fn set_unhandled_promise_rejection(&self, reason: HostValue) {
        tracing::warn!("Unhandled promise rejection: {reason}");
    }

    fn clear_handled_promise_rejection(&self) {
        tracing::debug!("Promise rejection was handled late");
    }
}

/// Space separated rendering of console arguments.
fn join(args: &[HostValue]) -> String {
    args.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Error for a member the host does not implement.
fn unknown_function(name: &str) -> HostThrowable {
    HostThrowable::new("TypeError", format!("{name} is not a function"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests how console arguments are rendered.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_join_arguments() {
        let args = vec![
            HostValue::from("count:"),
            HostValue::Int(3),
            HostValue::list([HostValue::Int(1), HostValue::Int(2)]),
        ];
        assert_eq!(join(&args), "count: 3 [1, 2]");
        assert_eq!(join(&[]), "");
    }

    /// Tests the console binding's members.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_console_binding() {
        let binding = ConsoleHost::console_binding();
        assert_eq!(binding.name, CONSOLE);
        let names: Vec<_> = binding
            .functions
            .iter()
            .map(|function| function.name.as_str())
            .collect();
        assert_eq!(names, ["log", "info", "debug", "warn", "error"]);
        assert!(binding.functions.iter().all(|function| !function.is_async));
        assert!(ConsoleHost::sleep_binding().is_async);
    }
}
