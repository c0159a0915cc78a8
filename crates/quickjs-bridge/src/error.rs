use core::result::Result as CoreResult;
use std::io::Error as IoError;

use rquickjs::Error as QuickJsError;
use thiserror::Error;
use toml::de::Error as TomlError;

use crate::value::HostThrowable;

/// Result type for bridge operations.
pub type BridgeResult<T> = CoreResult<T, BridgeError>;

/// Errors surfaced by the bridge to host callers.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The runtime, context or bridge state behind a handle was released.
    #[error("{0} is already destroyed.")]
    EngineDestroyed(&'static str),

    /// A value has no conversion rule in the requested direction.
    #[error("Cannot convert type '{0}'.")]
    UnsupportedType(String),

    /// A container references itself during conversion.
    #[error("Unable to map objects with circular reference.")]
    CircularReference,

    /// A script constructor lookup failed or a mapping precondition was violated.
    #[error("TypeMappingError: {0}")]
    TypeMapping(String),

    /// Script code threw. The throwable carries `name: message\nstack`.
    #[error("{0}")]
    Script(HostThrowable),

    /// A host callback raised this throwable while script was running.
    #[error("{0}")]
    Host(HostThrowable),

    /// An asynchronous evaluation did not produce a promise.
    #[error("Evaluation was requested as async but the script did not return a promise.")]
    AsyncFlagMismatch,

    /// The pending result slot is empty.
    #[error("Result promise not found. Have you evaluated a script?")]
    NoPendingResult,

    /// The pending result slot holds something other than a promise.
    #[error("Invalid result promise object.")]
    InvalidPendingResult,

    /// An object or function handle does not index a live entry.
    #[error("Invalid handle: {0}")]
    HandleOutOfBounds(i64),

    /// The calling thread is already inside this engine.
    #[error("Re-entrant call into the engine from the thread that is running it; use the callback scope instead.")]
    Reentrant,

    /// Driving the job queue failed at the engine level.
    #[error("Failed to execute pending jobs. {0}")]
    PendingJob(String),

    /// A low-level engine failure (allocation, limits, bytecode).
    #[error("QuickJS error: {0}")]
    Engine(#[from] QuickJsError),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether this error comes from misusing the bridge protocol rather than from script
    /// or host behavior. Such errors never succeed on retry.
    pub fn is_caller_bug(&self) -> bool {
        matches!(
            self,
            Self::EngineDestroyed(_)
                | Self::NoPendingResult
                | Self::InvalidPendingResult
                | Self::HandleOutOfBounds(_)
                | Self::Reentrant
                | Self::AsyncFlagMismatch
        )
    }

    /// Throwable view of this error, used when it has to cross into a host exception slot.
    pub fn to_throwable(&self) -> HostThrowable {
        match self {
            Self::Script(throwable) | Self::Host(throwable) => throwable.clone(),
            other => HostThrowable::bridge_exception(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    /// Tests the messages that hosts rely on for protocol errors.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_error_display() {
        assert_eq!(
            BridgeError::NoPendingResult.to_string(),
            "Result promise not found. Have you evaluated a script?"
        );
        assert_eq!(
            BridgeError::InvalidPendingResult.to_string(),
            "Invalid result promise object."
        );
        assert_eq!(
            BridgeError::CircularReference.to_string(),
            "Unable to map objects with circular reference."
        );
        assert_eq!(
            BridgeError::HandleOutOfBounds(-3).to_string(),
            "Invalid handle: -3"
        );
        assert_eq!(
            BridgeError::EngineDestroyed("Runtime").to_string(),
            "Runtime is already destroyed."
        );
    }

    /// Tests that script errors display the joined script message unchanged.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_script_error_display() {
        let throwable = HostThrowable::bridge_exception("Error: x\n    at <eval> (main.js:1)");
        let error = BridgeError::Script(throwable);
        assert!(error.to_string().starts_with("Error: x"));
    }

    /// Tests caller bug classification.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_is_caller_bug() {
        assert!(BridgeError::NoPendingResult.is_caller_bug());
        assert!(BridgeError::HandleOutOfBounds(9).is_caller_bug());
        assert!(BridgeError::Reentrant.is_caller_bug());
        assert!(!BridgeError::CircularReference.is_caller_bug());
        assert!(!BridgeError::UnsupportedType("Symbol".to_owned()).is_caller_bug());
    }

    /// Tests that host throwables keep their type when converted back.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_to_throwable_keeps_host_type() {
        let original = HostThrowable::new("app::errors::Denied", "no access");
        let error = BridgeError::Host(original.clone());
        assert_eq!(error.to_throwable(), original);

        let wrapped = BridgeError::CircularReference.to_throwable();
        assert_eq!(wrapped.type_name(), HostThrowable::BRIDGE_EXCEPTION);
        assert_eq!(
            wrapped.message(),
            Some("Unable to map objects with circular reference.")
        );
    }

    /// Tests conversion from I/O errors.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_error_from_io() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: BridgeError = io_error.into();
        assert!(matches!(error, BridgeError::Io(_)));
    }
}
