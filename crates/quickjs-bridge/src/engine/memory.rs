//! Runtime memory counters.

use rquickjs::qjs::JSMemoryUsage;
use serde::{Deserialize, Serialize};

/// Snapshot of a runtime's allocator and object counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Heap limit, `-1` when unlimited
    pub malloc_limit: i64,
    /// Bytes currently allocated
    pub malloc_size: i64,
    /// Live allocations
    pub malloc_count: i64,
    /// Bytes used by engine structures
    pub memory_used_size: i64,
    /// Engine structures in use
    pub memory_used_count: i64,
    /// Interned atoms
    pub atom_count: i64,
    /// Bytes held by atoms
    pub atom_size: i64,
    /// Live strings
    pub str_count: i64,
    /// Bytes held by strings
    pub str_size: i64,
    /// Live objects
    pub obj_count: i64,
    /// Bytes held by objects
    pub obj_size: i64,
    /// Object properties
    pub prop_count: i64,
    /// Bytes held by properties
    pub prop_size: i64,
    /// Object shapes
    pub shape_count: i64,
    /// Bytes held by shapes
    pub shape_size: i64,
    /// Script functions
    pub js_func_count: i64,
    /// Bytes held by script functions
    pub js_func_size: i64,
    /// Bytecode bytes
    pub js_func_code_size: i64,
    /// Functions with line tables
    pub js_func_pc2line_count: i64,
    /// Line table bytes
    pub js_func_pc2line_size: i64,
    /// Native functions
    pub c_func_count: i64,
    /// Arrays
    pub array_count: i64,
    /// Arrays with dense storage
    pub fast_array_count: i64,
    /// Elements in dense arrays
    pub fast_array_elements: i64,
    /// Array buffers and typed arrays
    pub binary_object_count: i64,
    /// Bytes held by binary objects
    pub binary_object_size: i64,
}

impl From<JSMemoryUsage> for MemoryUsage {
    fn from(usage: JSMemoryUsage) -> Self {
        Self {
            malloc_limit: usage.malloc_limit,
            malloc_size: usage.malloc_size,
            malloc_count: usage.malloc_count,
            memory_used_size: usage.memory_used_size,
            memory_used_count: usage.memory_used_count,
            atom_count: usage.atom_count,
            atom_size: usage.atom_size,
            str_count: usage.str_count,
            str_size: usage.str_size,
            obj_count: usage.obj_count,
            obj_size: usage.obj_size,
            prop_count: usage.prop_count,
            prop_size: usage.prop_size,
            shape_count: usage.shape_count,
            shape_size: usage.shape_size,
            js_func_count: usage.js_func_count,
            js_func_size: usage.js_func_size,
            js_func_code_size: usage.js_func_code_size,
            js_func_pc2line_count: usage.js_func_pc2line_count,
            js_func_pc2line_size: usage.js_func_pc2line_size,
            c_func_count: usage.c_func_count,
            array_count: usage.array_count,
            fast_array_count: usage.fast_array_count,
            fast_array_elements: usage.fast_array_elements,
            binary_object_count: usage.binary_object_count,
            binary_object_size: usage.binary_object_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests the JSON field names the CLI prints.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_serializes_snake_case_fields() {
        let usage = MemoryUsage {
            malloc_limit: -1,
            obj_count: 12,
            ..MemoryUsage::default()
        };
        let json = serde_json::to_value(usage).expect("usage should serialize");
        assert_eq!(json["malloc_limit"], -1);
        assert_eq!(json["obj_count"], 12);
        assert_eq!(json["binary_object_size"], 0);
    }
}
