//! Host to script conversion.

use std::collections::HashSet;

use rquickjs::function::{Constructor, This};
use rquickjs::{Array, Ctx, FromJs as _, Function, IntoJs as _, Object, TypedArray, Value};

use crate::error::{BridgeError, BridgeResult};
use crate::marshal::errors::throwable_to_script;
use crate::registry::{Intrinsic, Intrinsics};
use crate::value::{HostValue, identity};

/// One top-level host to script conversion.
pub(super) struct ToScript<'conv, 'js> {
    /// Target context
    ctx: &'conv Ctx<'js>,
    /// `Map` and `Set` constructors
    intrinsics: &'conv Intrinsics,
    /// Containers already converted; created on the first container
    visited: Option<HashSet<usize>>,
}

impl<'conv, 'js> ToScript<'conv, 'js> {
    /// Start a conversion.
    pub(super) fn new(ctx: &'conv Ctx<'js>, intrinsics: &'conv Intrinsics) -> Self {
        Self {
            ctx,
            intrinsics,
            visited: None,
        }
    }

    /// Convert a value. Partially built script values are released on failure.
    ///
    /// # Errors
    /// Returns `CircularReference` when a container is reached twice, `UnsupportedType` for
    /// opaque values, and engine errors from allocation.
    pub(super) fn convert(&mut self, value: &HostValue) -> BridgeResult<Value<'js>> {
        let ctx = self.ctx;
        match value {
            HostValue::Null => Ok(Value::new_null(ctx.clone())),
            HostValue::Unit => Ok(Value::new_undefined(ctx.clone())),
            HostValue::Bool(flag) => Ok(Value::new_bool(ctx.clone(), *flag)),
            HostValue::Byte(number) => Ok(Value::new_int(ctx.clone(), i32::from(*number))),
            HostValue::Short(number) => Ok(Value::new_int(ctx.clone(), i32::from(*number))),
            HostValue::Int(number) => Ok(Value::new_int(ctx.clone(), *number)),
            HostValue::Long(number) => Ok(long_value(ctx, *number)),
            HostValue::Float(number) => Ok(Value::new_float(ctx.clone(), f64::from(*number))),
            HostValue::Double(number) => Ok(Value::new_float(ctx.clone(), *number)),
            HostValue::String(text) => Ok(text.as_str().into_js(ctx)?),
            HostValue::List(items) => {
                self.visit(value)?;
                let snapshot = items.read().clone();
                self.array(&snapshot)
            }
            HostValue::Object(entries) => {
                self.visit(value)?;
                let snapshot = entries.read().clone();
                let object = Object::new(ctx.clone())?;
                for (key, item) in &snapshot {
                    object.set(key.as_str(), self.convert(item)?)?;
                }
                Ok(object.into_value())
            }
            HostValue::Map(entries) => {
                self.visit(value)?;
                let snapshot = entries.read().clone();
                let map = self.construct(Intrinsic::Map)?;
                let insert: Function<'js> = map.get("set")?;
                for (key, item) in &snapshot {
                    let script_key = self.convert(key)?;
                    let script_item = self.convert(item)?;
                    insert.call::<_, Value<'js>>((This(map.clone()), script_key, script_item))?;
                }
                Ok(map.into_value())
            }
            HostValue::Set(items) => {
                self.visit(value)?;
                let snapshot = items.read().clone();
                let set = self.construct(Intrinsic::Set)?;
                let add: Function<'js> = set.get("add")?;
                for item in &snapshot {
                    add.call::<_, Value<'js>>((This(set.clone()), self.convert(item)?))?;
                }
                Ok(set.into_value())
            }
            HostValue::Throwable(throwable) => Ok(throwable_to_script(ctx, throwable)?),
            HostValue::UByteArray(bytes) => {
                Ok(TypedArray::<u8>::new(ctx.clone(), bytes.clone())?.into_js(ctx)?)
            }
            HostValue::ByteArray(bytes) => {
                Ok(TypedArray::<i8>::new(ctx.clone(), bytes.clone())?.into_js(ctx)?)
            }
            HostValue::BoolArray(items) => primitive_array(ctx, items, |flag| {
                Value::new_bool(ctx.clone(), *flag)
            }),
            HostValue::IntArray(items) => {
                primitive_array(ctx, items, |number| Value::new_int(ctx.clone(), *number))
            }
            HostValue::LongArray(items) => {
                primitive_array(ctx, items, |number| long_value(ctx, *number))
            }
            HostValue::FloatArray(items) => primitive_array(ctx, items, |number| {
                Value::new_float(ctx.clone(), f64::from(*number))
            }),
            HostValue::DoubleArray(items) => {
                primitive_array(ctx, items, |number| Value::new_float(ctx.clone(), *number))
            }
            HostValue::ObjectArray(items) => {
                let own = identity(items);
                let snapshot = items.read().clone();
                if snapshot
                    .iter()
                    .any(|item| item.container_identity() == Some(own))
                {
                    return Err(BridgeError::CircularReference);
                }
                self.visit(value)?;
                self.array(&snapshot)
            }
            HostValue::Opaque(type_name) => Err(BridgeError::UnsupportedType(type_name.clone())),
        }
    }

    /// Record a container, failing if it was seen before in this conversion.
    fn visit(&mut self, container: &HostValue) -> BridgeResult<()> {
        let Some(id) = container.container_identity() else {
            return Ok(());
        };
        if self.visited.get_or_insert_with(HashSet::new).insert(id) {
            Ok(())
        } else {
            Err(BridgeError::CircularReference)
        }
    }

    /// Convert a sequence element by element.
    fn array(&mut self, items: &[HostValue]) -> BridgeResult<Value<'js>> {
        let array = Array::new(self.ctx.clone())?;
        for (index, item) in items.iter().enumerate() {
            array.set(index, self.convert(item)?)?;
        }
        Ok(array.into_value())
    }

    /// Construct an empty `Map` or `Set`.
    fn construct(&self, intrinsic: Intrinsic) -> BridgeResult<Object<'js>> {
        let object = self.intrinsics.get(self.ctx, intrinsic)?;
        let constructor = Constructor::from_js(self.ctx, object.into_value())?;
        Ok(constructor.construct(())?)
    }
}

/// Integers outside the 32-bit fast range become doubles.
fn long_value<'js>(ctx: &Ctx<'js>, number: i64) -> Value<'js> {
    i32::try_from(number).map_or_else(
        |_| Value::new_float(ctx.clone(), number as f64),
        |small| Value::new_int(ctx.clone(), small),
    )
}

/// Build an array from a primitive slice.
fn primitive_array<'js, T>(
    ctx: &Ctx<'js>,
    items: &[T],
    element: impl Fn(&T) -> Value<'js>,
) -> BridgeResult<Value<'js>> {
    let array = Array::new(ctx.clone())?;
    for (index, item) in items.iter().enumerate() {
        array.set(index, element(item))?;
    }
    Ok(array.into_value())
}
