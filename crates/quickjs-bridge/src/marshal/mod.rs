//! Value conversion between host values and script values.

/// Exception routing.
mod errors;
/// Script to host.
mod to_host;
/// Host to script.
mod to_script;

pub use errors::{exception_text, rethrow, script_throwable, surface, throwable_to_script};
pub use to_host::FUNCTION_PLACEHOLDER;

use rquickjs::{Ctx, Value};

use crate::error::BridgeResult;
use crate::registry::BridgeShared;
use crate::value::HostValue;
use to_host::ToHost;
use to_script::ToScript;

/// Converts values for one bridge inside one context scope.
pub struct Marshal<'conv, 'js> {
    /// Context the values live in
    ctx: &'conv Ctx<'js>,
    /// Intrinsics and exception types
    shared: &'conv BridgeShared,
}

impl<'conv, 'js> Marshal<'conv, 'js> {
    /// Marshaller for `ctx`.
    pub fn new(ctx: &'conv Ctx<'js>, shared: &'conv BridgeShared) -> Self {
        Self { ctx, shared }
    }

    /// Convert a host value. Each call tracks its own visited set.
    ///
    /// # Errors
    /// Returns `CircularReference`, `UnsupportedType`, `TypeMapping` or an engine error.
    pub fn to_script(&self, value: &HostValue) -> BridgeResult<Value<'js>> {
        ToScript::new(self.ctx, &self.shared.intrinsics).convert(value)
    }

    /// Convert a script value.
    ///
    /// # Errors
    /// Returns `CircularReference`, `UnsupportedType`, or the engine error a getter raised.
    pub fn to_host(&self, value: Value<'js>) -> BridgeResult<HostValue> {
        ToHost::new(self.ctx, self.shared).convert(value)
    }

    /// Convert call arguments, stopping at the first failure.
    ///
    /// # Errors
    /// Returns the first conversion error; arguments converted before it are dropped.
    pub fn args_to_host(&self, args: Vec<Value<'js>>) -> BridgeResult<Vec<HostValue>> {
        args.into_iter().map(|arg| self.to_host(arg)).collect()
    }

    /// Convert host arguments for a script call, stopping at the first failure.
    ///
    /// # Errors
    /// Returns the first conversion error; script values built before it are released.
    pub fn args_to_script(&self, args: &[HostValue]) -> BridgeResult<Vec<Value<'js>>> {
        args.iter().map(|arg| self.to_script(arg)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::testing::with_shared;
    use crate::value::{HostThrowable, shared};
    use std::sync::Arc;

    /// Tests that a host list containing itself is rejected.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_self_containing_list_rejected() {
        with_shared(|ctx, bridge| {
            let list = shared(vec![HostValue::Int(1)]);
            list.write().push(HostValue::List(Arc::clone(&list)));
            let result = Marshal::new(&ctx, bridge).to_script(&HostValue::List(list));
            assert!(matches!(result, Err(BridgeError::CircularReference)));
        });
    }

    /// Tests that a container reached twice through siblings is rejected too.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_shared_container_rejected() {
        with_shared(|ctx, bridge| {
            let inner = HostValue::list([HostValue::Int(1)]);
            let outer = HostValue::list([inner.clone(), inner]);
            let result = Marshal::new(&ctx, bridge).to_script(&outer);
            assert!(matches!(result, Err(BridgeError::CircularReference)));
        });
    }

    /// Tests the raw array self check.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_object_array_self_reference() {
        with_shared(|ctx, bridge| {
            let items = shared(vec![HostValue::from("a")]);
            items.write().push(HostValue::ObjectArray(Arc::clone(&items)));
            let result = Marshal::new(&ctx, bridge).to_script(&HostValue::ObjectArray(items));
            assert!(matches!(result, Err(BridgeError::CircularReference)));
        });
    }

    /// Tests that a host map becomes a script `Map` and converts back.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_map_fidelity() {
        with_shared(|ctx, bridge| {
            let marshal = Marshal::new(&ctx, bridge);
            let map = HostValue::map([
                (HostValue::from("a"), HostValue::Int(1)),
                (HostValue::from("b"), HostValue::Int(2)),
            ]);
            let script = marshal.to_script(&map).expect("map should convert");
            ctx.globals().set("hostMap", script.clone()).expect("set global");
            let checked: bool = ctx
                .eval("hostMap instanceof Map && hostMap.get('a') === 1 && hostMap.get('b') === 2")
                .expect("eval");
            assert!(checked);

            let back = marshal.to_host(script).expect("map should convert back");
            assert_eq!(
                back,
                HostValue::map([
                    (HostValue::from("a"), HostValue::Long(1)),
                    (HostValue::from("b"), HostValue::Long(2)),
                ])
            );
        });
    }

    /// Tests that script sets keep insertion order.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_set_from_script() {
        with_shared(|ctx, bridge| {
            let value: Value<'_> = ctx.eval("new Set(['x', 'y', 'x', 3])").expect("eval");
            let converted = Marshal::new(&ctx, bridge).to_host(value).expect("set should convert");
            assert_eq!(
                converted,
                HostValue::set([HostValue::from("x"), HostValue::from("y"), HostValue::Long(3)])
            );
        });
    }

    /// Tests NaN in both directions.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_nan_round_trip() {
        with_shared(|ctx, bridge| {
            let marshal = Marshal::new(&ctx, bridge);
            let script = marshal
                .to_script(&HostValue::Double(f64::NAN))
                .expect("NaN should convert");
            ctx.globals().set("hostNan", script).expect("set global");
            let is_nan: bool = ctx.eval("Number.isNaN(hostNan)").expect("eval");
            assert!(is_nan);

            let value: Value<'_> = ctx.eval("0 / 0").expect("eval");
            let back = marshal.to_host(value).expect("NaN should convert back");
            assert!(matches!(back, HostValue::Double(number) if number.is_nan()));
        });
    }

    /// Tests integer widening at the 32-bit and 53-bit boundaries.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_integer_boundaries() {
        with_shared(|ctx, bridge| {
            let marshal = Marshal::new(&ctx, bridge);
            let small = marshal.to_script(&HostValue::Long(7)).expect("convert");
            assert_eq!(marshal.to_host(small).expect("convert"), HostValue::Long(7));

            let limit = 1_i64 << 53;
            let large = marshal.to_script(&HostValue::Long(limit)).expect("convert");
            assert_eq!(
                marshal.to_host(large).expect("convert"),
                HostValue::Double(limit as f64)
            );

            let negative = marshal.to_script(&HostValue::Long(-limit)).expect("convert");
            assert_eq!(
                marshal.to_host(negative).expect("convert"),
                HostValue::Double(-limit as f64)
            );
        });
    }

    /// Tests that plain objects keep key order and break direct self references.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_plain_object_from_script() {
        with_shared(|ctx, bridge| {
            let value: Value<'_> = ctx
                .eval("const o = { b: 1, a: 'two', run() {} }; o.self = o; o")
                .expect("eval");
            let converted = Marshal::new(&ctx, bridge).to_host(value).expect("convert");
            assert_eq!(
                converted,
                HostValue::object([
                    ("b", HostValue::Long(1)),
                    ("a", HostValue::from("two")),
                    ("run", HostValue::from(FUNCTION_PLACEHOLDER)),
                    ("self", HostValue::from("[object Object]")),
                ])
            );
        });
    }

    /// Tests that a cycle through a nested object fails in the probe.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_nested_cycle_fails_probe() {
        with_shared(|ctx, bridge| {
            let value: Value<'_> = ctx
                .eval("const a = {}; const b = { a }; a.b = b; a")
                .expect("eval");
            let error = Marshal::new(&ctx, bridge).to_host(value).unwrap_err();
            let surfaced = surface(&ctx, bridge, error);
            assert!(matches!(surfaced, BridgeError::Script(_)));
        });
    }

    /// Tests that a map containing itself is rejected.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_self_containing_script_map() {
        with_shared(|ctx, bridge| {
            let value: Value<'_> = ctx
                .eval("const m = new Map(); m.set('me', m); m")
                .expect("eval");
            let result = Marshal::new(&ctx, bridge).to_host(value);
            assert!(matches!(result, Err(BridgeError::CircularReference)));
        });
    }

    /// Tests byte buffers in both directions.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_byte_arrays() {
        with_shared(|ctx, bridge| {
            let marshal = Marshal::new(&ctx, bridge);
            let script = marshal
                .to_script(&HostValue::UByteArray(vec![1, 2, 255]))
                .expect("bytes should convert");
            ctx.globals().set("bytes", script).expect("set global");
            let summary: String = ctx
                .eval("(bytes instanceof Uint8Array) + ':' + Array.from(bytes).join(',')")
                .expect("eval");
            assert_eq!(summary, "true:1,2,255");

            let signed: Value<'_> = ctx.eval("new Int8Array([-1, 5])").expect("eval");
            assert_eq!(
                marshal.to_host(signed).expect("convert"),
                HostValue::ByteArray(vec![-1, 5])
            );
        });
    }

    /// Tests promise state descriptions.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_promise_state_string() {
        with_shared(|ctx, bridge| {
            let marshal = Marshal::new(&ctx, bridge);
            let pending: Value<'_> = ctx.eval("new Promise(() => {})").expect("eval");
            assert_eq!(
                marshal.to_host(pending).expect("convert"),
                HostValue::from("Promise { <state>: \"pending\" }")
            );
            let resolved: Value<'_> = ctx.eval("Promise.resolve(1)").expect("eval");
            assert_eq!(
                marshal.to_host(resolved).expect("convert"),
                HostValue::from("Promise { <state>: \"fulfilled\" }")
            );
        });
    }

    /// Tests that a host throwable keeps its shape through script and back.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_throwable_round_trip() {
        with_shared(|ctx, bridge| {
            let marshal = Marshal::new(&ctx, bridge);
            let original = HostValue::from(HostThrowable::new("com::example::MyError", "boom"));

            let unregistered = marshal
                .to_host(marshal.to_script(&original).expect("convert"))
                .expect("convert back");
            let HostValue::Throwable(fallback) = unregistered else {
                panic!("expected a throwable");
            };
            assert!(fallback.is_bridge_exception());
            assert!(fallback.to_string().contains("boom"));

            bridge.exception_types.register_type("com::example::MyError");
            let registered = marshal
                .to_host(marshal.to_script(&original).expect("convert"))
                .expect("convert back");
            let HostValue::Throwable(rebuilt) = registered else {
                panic!("expected a throwable");
            };
            assert_eq!(rebuilt.type_name(), "com::example::MyError");
            assert_eq!(rebuilt.message(), Some("boom"));
        });
    }

    /// Tests values with no conversion rule.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_unsupported_types() {
        with_shared(|ctx, bridge| {
            let marshal = Marshal::new(&ctx, bridge);
            let opaque = marshal.to_script(&HostValue::Opaque("app::Socket".to_owned()));
            assert!(matches!(opaque, Err(BridgeError::UnsupportedType(name)) if name == "app::Socket"));

            let symbol: Value<'_> = ctx.eval("Symbol('s')").expect("eval");
            assert!(matches!(
                marshal.to_host(symbol),
                Err(BridgeError::UnsupportedType(_))
            ));
        });
    }

    /// Tests that argument conversion stops at the first failure.
    ///
    /// # Panics
    /// Panics if assertions fail during test execution.
    #[test]
    fn test_args_abort_on_failure() {
        with_shared(|ctx, bridge| {
            let marshal = Marshal::new(&ctx, bridge);
            let result = marshal.args_to_script(&[
                HostValue::list([HostValue::Int(1)]),
                HostValue::Opaque("Thread".to_owned()),
                HostValue::Int(3),
            ]);
            assert!(matches!(result, Err(BridgeError::UnsupportedType(_))));

            let converted = marshal
                .args_to_script(&[HostValue::Int(1), HostValue::from("two")])
                .expect("convert");
            assert_eq!(converted.len(), 2);
        });
    }
}
