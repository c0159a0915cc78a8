//! The closed set of host value kinds that can cross the bridge.

/// Host exception values.
mod throwable;

pub use throwable::HostThrowable;

use core::fmt;
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

/// A shared, mutable host container. Identity is the allocation, so a container may hold
/// itself and the marshaller can tell.
pub type Shared<T> = Arc<RwLock<T>>;

/// Ordered list.
pub type HostList = Shared<Vec<HostValue>>;

/// Plain object with declared insertion order and string keys.
pub type HostObject = Shared<Vec<(String, HostValue)>>;

/// Ordered map with arbitrary keys.
pub type HostMap = Shared<Vec<(HostValue, HostValue)>>;

/// Insertion-ordered set of unique values.
pub type HostSet = Shared<Vec<HostValue>>;

/// Depth at which `Display` stops descending into containers.
const DISPLAY_DEPTH: usize = 16;

/// A value owned by the host.
#[derive(Debug, Clone)]
pub enum HostValue {
    /// Absent value (script `null`/`undefined`)
    Null,
    /// Unit sentinel, becomes script `undefined`
    Unit,
    /// Boolean
    Bool(bool),
    /// 8-bit integer
    Byte(i8),
    /// 16-bit integer
    Short(i16),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list
    List(HostList),
    /// Plain object wrapper
    Object(HostObject),
    /// Generic map
    Map(HostMap),
    /// Set
    Set(HostSet),
    /// Exception
    Throwable(HostThrowable),
    /// Unsigned byte buffer
    UByteArray(Vec<u8>),
    /// Signed byte buffer
    ByteArray(Vec<i8>),
    /// Primitive boolean array
    BoolArray(Vec<bool>),
    /// Primitive int array
    IntArray(Vec<i32>),
    /// Primitive long array
    LongArray(Vec<i64>),
    /// Primitive float array
    FloatArray(Vec<f32>),
    /// Primitive double array
    DoubleArray(Vec<f64>),
    /// Raw array of arbitrary values
    ObjectArray(HostList),
    /// A host value with no conversion rule; carries its type name
    Opaque(String),
}

impl HostValue {
    /// Wrap items into a new list.
    pub fn list(items: impl IntoIterator<Item = Self>) -> Self {
        Self::List(shared(items.into_iter().collect()))
    }

    /// Wrap items into a new raw object array.
    pub fn object_array(items: impl IntoIterator<Item = Self>) -> Self {
        Self::ObjectArray(shared(items.into_iter().collect()))
    }

    /// Build a plain object from ordered entries.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Object(shared(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        ))
    }

    /// Build a map from ordered entries.
    pub fn map(entries: impl IntoIterator<Item = (Self, Self)>) -> Self {
        Self::Map(shared(entries.into_iter().collect()))
    }

    /// Build a set, dropping later duplicates.
    pub fn set(items: impl IntoIterator<Item = Self>) -> Self {
        let mut unique: Vec<Self> = Vec::new();
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Self::Set(shared(unique))
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of any integral kind.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(value) => Some(i64::from(*value)),
            Self::Short(value) => Some(i64::from(*value)),
            Self::Int(value) => Some(i64::from(*value)),
            Self::Long(value) => Some(*value),
            _ => None,
        }
    }

    /// Floating point view of any numeric kind.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(f64::from(*value)),
            Self::Double(value) => Some(*value),
            other => other.as_i64().map(|value| value as f64),
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Name of this value's kind, as reported in conversion errors.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Unit => "Unit",
            Self::Bool(_) => "Boolean",
            Self::Byte(_) => "Byte",
            Self::Short(_) => "Short",
            Self::Int(_) => "Int",
            Self::Long(_) => "Long",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::List(_) => "List",
            Self::Object(_) => "JsObject",
            Self::Map(_) => "Map",
            Self::Set(_) => "Set",
            Self::Throwable(throwable) => throwable.type_name(),
            Self::UByteArray(_) => "UByteArray",
            Self::ByteArray(_) => "ByteArray",
            Self::BoolArray(_) => "BooleanArray",
            Self::IntArray(_) => "IntArray",
            Self::LongArray(_) => "LongArray",
            Self::FloatArray(_) => "FloatArray",
            Self::DoubleArray(_) => "DoubleArray",
            Self::ObjectArray(_) => "Array",
            Self::Opaque(type_name) => type_name,
        }
    }

    /// Identity of the container behind this value, if it is one.
    pub fn container_identity(&self) -> Option<usize> {
        match self {
            Self::List(list) | Self::Set(list) | Self::ObjectArray(list) => Some(identity(list)),
            Self::Object(object) => Some(identity(object)),
            Self::Map(map) => Some(identity(map)),
            _ => None,
        }
    }

    /// Render with a depth limit and a guard against containers that contain themselves.
    fn render(
        &self,
        formatter: &mut fmt::Formatter<'_>,
        open: &mut HashSet<usize>,
        depth: usize,
    ) -> fmt::Result {
        if let Some(id) = self.container_identity()
            && (depth >= DISPLAY_DEPTH || open.contains(&id))
        {
            return formatter.write_str("[...]");
        }
        match self {
            Self::Null => formatter.write_str("null"),
            Self::Unit => formatter.write_str("undefined"),
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Byte(value) => write!(formatter, "{value}"),
            Self::Short(value) => write!(formatter, "{value}"),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::Long(value) => write!(formatter, "{value}"),
            Self::Float(value) => write!(formatter, "{value}"),
            Self::Double(value) => write!(formatter, "{value}"),
            Self::String(value) => formatter.write_str(value),
            Self::Throwable(throwable) => write!(formatter, "{}: {throwable}", throwable.type_name()),
            Self::UByteArray(bytes) => write!(formatter, "{bytes:?}"),
            Self::ByteArray(bytes) => write!(formatter, "{bytes:?}"),
            Self::BoolArray(items) => write!(formatter, "{items:?}"),
            Self::IntArray(items) => write!(formatter, "{items:?}"),
            Self::LongArray(items) => write!(formatter, "{items:?}"),
            Self::FloatArray(items) => write!(formatter, "{items:?}"),
            Self::DoubleArray(items) => write!(formatter, "{items:?}"),
            Self::Opaque(type_name) => write!(formatter, "<{type_name}>"),
            Self::List(items) | Self::ObjectArray(items) | Self::Set(items) => {
                let id = identity(items);
                open.insert(id);
                let prefix = if matches!(self, Self::Set(_)) { "Set [" } else { "[" };
                formatter.write_str(prefix)?;
                for (index, item) in items.read().iter().enumerate() {
                    if index > 0 {
                        formatter.write_str(", ")?;
                    }
                    item.render(formatter, open, depth + 1)?;
                }
                open.remove(&id);
                formatter.write_str("]")
            }
            Self::Object(entries) => {
                let id = identity(entries);
                open.insert(id);
                formatter.write_str("{")?;
                for (index, (key, value)) in entries.read().iter().enumerate() {
                    if index > 0 {
                        formatter.write_str(", ")?;
                    }
                    write!(formatter, "{key}: ")?;
                    value.render(formatter, open, depth + 1)?;
                }
                open.remove(&id);
                formatter.write_str("}")
            }
            Self::Map(entries) => {
                let id = identity(entries);
                open.insert(id);
                formatter.write_str("{")?;
                for (index, (key, value)) in entries.read().iter().enumerate() {
                    if index > 0 {
                        formatter.write_str(", ")?;
                    }
                    key.render(formatter, open, depth + 1)?;
                    formatter.write_str("=")?;
                    value.render(formatter, open, depth + 1)?;
                }
                open.remove(&id);
                formatter.write_str("}")
            }
        }
    }
}

/// Structural equality. Two handles to the same container are equal without being walked.
impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) | (Self::Unit, Self::Unit) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Byte(left), Self::Byte(right)) => left == right,
            (Self::Short(left), Self::Short(right)) => left == right,
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Long(left), Self::Long(right)) => left == right,
            (Self::Float(left), Self::Float(right)) => left == right,
            (Self::Double(left), Self::Double(right)) => left == right,
            (Self::String(left), Self::String(right))
            | (Self::Opaque(left), Self::Opaque(right)) => left == right,
            (Self::Throwable(left), Self::Throwable(right)) => left == right,
            (Self::UByteArray(left), Self::UByteArray(right)) => left == right,
            (Self::ByteArray(left), Self::ByteArray(right)) => left == right,
            (Self::BoolArray(left), Self::BoolArray(right)) => left == right,
            (Self::IntArray(left), Self::IntArray(right)) => left == right,
            (Self::LongArray(left), Self::LongArray(right)) => left == right,
            (Self::FloatArray(left), Self::FloatArray(right)) => left == right,
            (Self::DoubleArray(left), Self::DoubleArray(right)) => left == right,
            (Self::List(left), Self::List(right))
            | (Self::Set(left), Self::Set(right))
            | (Self::ObjectArray(left), Self::ObjectArray(right)) => {
                Arc::ptr_eq(left, right) || *left.read() == *right.read()
            }
            (Self::Object(left), Self::Object(right)) => {
                Arc::ptr_eq(left, right) || *left.read() == *right.read()
            }
            (Self::Map(left), Self::Map(right)) => {
                Arc::ptr_eq(left, right) || *left.read() == *right.read()
            }
            _ => false,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(formatter, &mut HashSet::new(), 0)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<HostThrowable> for HostValue {
    fn from(value: HostThrowable) -> Self {
        Self::Throwable(value)
    }
}

impl From<Vec<u8>> for HostValue {
    fn from(value: Vec<u8>) -> Self {
        Self::UByteArray(value)
    }
}

/// Wrap a value into a new shared container.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// Address of a shared container, used as its identity.
pub fn identity<T>(container: &Shared<T>) -> usize {
    Arc::as_ptr(container).cast::<()>() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests set construction keeps the first occurrence only.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_set_dedup_preserves_order() {
        let set = HostValue::set([
            HostValue::from("b"),
            HostValue::from("a"),
            HostValue::from("b"),
        ]);
        let HostValue::Set(items) = set else {
            panic!("expected a set");
        };
        assert_eq!(
            *items.read(),
            vec![HostValue::from("b"), HostValue::from("a")]
        );
    }

    /// Tests integral widening and float views.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_numeric_views() {
        assert_eq!(HostValue::Byte(-3).as_i64(), Some(-3));
        assert_eq!(HostValue::Short(300).as_i64(), Some(300));
        assert_eq!(HostValue::Long(1 << 40).as_f64(), Some(1_099_511_627_776.0));
        assert_eq!(HostValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(HostValue::from("1").as_i64(), None);
    }

    /// Tests that a list containing itself displays without recursing forever.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_display_self_reference() {
        let list = shared(vec![HostValue::Int(1)]);
        list.write().push(HostValue::List(Arc::clone(&list)));
        assert_eq!(HostValue::List(list).to_string(), "[1, [...]]");
    }

    /// Tests display of nested containers.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_display_nested() {
        let value = HostValue::object([
            ("name", HostValue::from("qjs")),
            ("tags", HostValue::list([HostValue::Int(1), HostValue::Null])),
        ]);
        assert_eq!(value.to_string(), "{name: qjs, tags: [1, null]}");
    }

    /// Tests that identity is shared between clones of the same container.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_container_identity() {
        let list = HostValue::list([HostValue::Int(1)]);
        let alias = list.clone();
        let copy = HostValue::list([HostValue::Int(1)]);
        assert_eq!(list.container_identity(), alias.container_identity());
        assert_ne!(list.container_identity(), copy.container_identity());
        assert_eq!(list, copy);
    }
}
