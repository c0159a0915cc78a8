//! Declarations of host members exposed to script.

use crate::registry::ObjectHandle;

/// A host-backed property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyBinding {
    /// Property name
    pub name: String,
    /// Whether script may delete or redefine it
    pub configurable: bool,
    /// Whether assignments reach the host setter
    pub writable: bool,
    /// Whether it shows up in enumeration
    pub enumerable: bool,
}

impl PropertyBinding {
    /// A configurable, writable, enumerable property.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configurable: true,
            writable: true,
            enumerable: true,
        }
    }

    /// Drop the setter.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Hide from enumeration.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.enumerable = false;
        self
    }

    /// Forbid deletion and redefinition.
    #[must_use]
    pub fn fixed(mut self) -> Self {
        self.configurable = false;
        self
    }
}

/// A host-backed function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionBinding {
    /// Function name
    pub name: String,
    /// Returns a promise settled later through resolve/reject handles
    pub is_async: bool,
}

impl FunctionBinding {
    /// A synchronous function.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_async: false,
        }
    }

    /// A function returning a promise.
    pub fn asynchronous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_async: true,
        }
    }
}

/// A host-backed object and its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectBinding {
    /// Property name the object is attached under
    pub name: String,
    /// Previously defined object to attach to; the global scope if `None`
    pub parent: Option<ObjectHandle>,
    /// Properties
    pub properties: Vec<PropertyBinding>,
    /// Functions
    pub functions: Vec<FunctionBinding>,
}

impl ObjectBinding {
    /// An empty object attached to the global scope.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            properties: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Attach under a previously defined object.
    #[must_use]
    pub fn with_parent(mut self, parent: ObjectHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Add a property.
    #[must_use]
    pub fn with_property(mut self, property: PropertyBinding) -> Self {
        self.properties.push(property);
        self
    }

    /// Add a function.
    #[must_use]
    pub fn with_function(mut self, function: FunctionBinding) -> Self {
        self.functions.push(function);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests the builder defaults and modifiers.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_binding_builders() {
        let binding = ObjectBinding::new("console")
            .with_parent(ObjectHandle::from_raw(2))
            .with_property(PropertyBinding::new("level").read_only().hidden())
            .with_function(FunctionBinding::asynchronous("fetch"));

        assert_eq!(binding.parent, Some(ObjectHandle::from_raw(2)));
        let property = &binding.properties[0];
        assert!(property.configurable);
        assert!(!property.writable);
        assert!(!property.enumerable);
        assert!(binding.functions[0].is_async);
        assert!(!PropertyBinding::new("x").fixed().configurable);
    }
}
