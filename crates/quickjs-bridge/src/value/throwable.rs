//! Host-side exception values.

use core::error::Error as CoreError;
use core::fmt;

/// Separator between path segments of a host type name.
const HOST_SEPARATOR: &str = "::";

/// Separator between path segments of a script error name.
const SCRIPT_SEPARATOR: &str = ".";

/// An exception as the host sees it: a type name, an optional message and the host stack.
///
/// Type names use the host path form (`app::errors::Denied`). When a throwable crosses into
/// script its name is rendered in dotted form (`app.errors.Denied`) and mapped back on return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostThrowable {
    /// Fully-qualified host type name
    type_name: String,
    /// Human-readable message
    message: Option<String>,
    /// Host stack frames, outermost last
    stack: Vec<String>,
}

impl HostThrowable {
    /// Type name of the generic exception used when no specific host type applies.
    pub const BRIDGE_EXCEPTION: &'static str = "quickjs_bridge::QuickJsException";

    /// Create a throwable of the given host type.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: Some(message.into()),
            stack: Vec::new(),
        }
    }

    /// Create a throwable that has no message.
    pub fn without_message(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: None,
            stack: Vec::new(),
        }
    }

    /// Create the generic bridge exception.
    pub fn bridge_exception(message: impl Into<String>) -> Self {
        Self::new(Self::BRIDGE_EXCEPTION, message)
    }

    /// Attach host stack frames.
    #[must_use]
    pub fn with_stack<I, S>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stack = frames.into_iter().map(Into::into).collect();
        self
    }

    /// Fully-qualified host type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Host stack frames.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// Whether this is the generic bridge exception.
    pub fn is_bridge_exception(&self) -> bool {
        self.type_name == Self::BRIDGE_EXCEPTION
    }

    /// Name this throwable carries inside script.
    pub fn script_name(&self) -> String {
        self.type_name.replace(HOST_SEPARATOR, SCRIPT_SEPARATOR)
    }

    /// Host type name for a script error name.
    pub fn host_name(script_name: &str) -> String {
        script_name.replace(SCRIPT_SEPARATOR, HOST_SEPARATOR)
    }
}

impl fmt::Display for HostThrowable {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => formatter.write_str(message),
            None => formatter.write_str(&self.type_name),
        }
    }
}

impl CoreError for HostThrowable {}
