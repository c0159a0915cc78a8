//! Integer handles into the bridge arenas.

use core::fmt;

use crate::value::{HostThrowable, HostValue};

/// Handle of an object defined through the bridge, or of the global scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(i64);

impl ObjectHandle {
    /// The script global scope.
    pub const GLOBAL_THIS: Self = Self(-1);

    /// Wrap a raw handle value.
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    pub const fn as_raw(self) -> i64 {
        self.0
    }

    /// Whether this is the global scope handle.
    pub const fn is_global(self) -> bool {
        self.0 == Self::GLOBAL_THIS.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Handle of a script function created by the bridge (promise resolvers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle(i64);

impl FunctionHandle {
    /// Wrap a raw handle value.
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw handle value.
    pub const fn as_raw(self) -> i64 {
        self.0
    }
}

impl fmt::Display for FunctionHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Index of a host object retained for the lifetime of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalRef(pub usize);

/// Resolve and reject handles passed in front of an async call's arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromiseHandles {
    /// Settles the promise with a value
    pub resolve: FunctionHandle,
    /// Settles the promise with a reason
    pub reject: FunctionHandle,
}

impl PromiseHandles {
    /// Take the two handles off the front of an async call's argument list.
    ///
    /// # Errors
    /// Returns an error if fewer than two arguments are present or either is not an integer.
    pub fn split(args: &mut Vec<HostValue>) -> Result<Self, HostThrowable> {
        if args.len() < 2 {
            return Err(HostThrowable::bridge_exception(
                "Invoking async functions requires resolve and reject handles.",
            ));
        }
        let resolve = handle_arg(&args[0], "resolve")?;
        let reject = handle_arg(&args[1], "reject")?;
        args.drain(..2);
        Ok(Self { resolve, reject })
    }
}

/// Read one promise handle argument.
fn handle_arg(value: &HostValue, role: &str) -> Result<FunctionHandle, HostThrowable> {
    value.as_i64().map(FunctionHandle::from_raw).ok_or_else(|| {
        HostThrowable::bridge_exception(format!(
            "Unexpected {role} handle type {}, expected: Long",
            value.kind_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests that the handles are removed from the argument list.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_split_promise_handles() {
        let mut args = vec![
            HostValue::Long(4),
            HostValue::Long(5),
            HostValue::from("payload"),
        ];
        let handles = PromiseHandles::split(&mut args).expect("handles should parse");
        assert_eq!(handles.resolve, FunctionHandle::from_raw(4));
        assert_eq!(handles.reject, FunctionHandle::from_raw(5));
        assert_eq!(args, vec![HostValue::from("payload")]);
    }

    /// Tests malformed handle lists.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_split_rejects_bad_args() {
        let mut short = vec![HostValue::Long(1)];
        PromiseHandles::split(&mut short).unwrap_err();

        let mut wrong = vec![HostValue::from("1"), HostValue::Long(2)];
        let error = PromiseHandles::split(&mut wrong).unwrap_err();
        assert_eq!(
            error.message(),
            Some("Unexpected resolve handle type String, expected: Long")
        );
        assert_eq!(wrong.len(), 2);
    }

    /// Tests the global scope handle.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_global_handle() {
        assert!(ObjectHandle::GLOBAL_THIS.is_global());
        assert_eq!(ObjectHandle::GLOBAL_THIS.as_raw(), -1);
        assert!(!ObjectHandle::from_raw(0).is_global());
    }
}
