//! Script to host conversion.

use rquickjs::convert::Coerced;
use rquickjs::function::This;
use rquickjs::object::Filter;
use rquickjs::promise::PromiseState;
use rquickjs::{Ctx, Function, Object, Value};

use crate::engine::raw;
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::errors::throwable_from_exception;
use crate::registry::{BridgeShared, Intrinsic};
use crate::value::{HostValue, shared};

/// Stands in for function values, which have no host form.
pub const FUNCTION_PLACEHOLDER: &str = "[function]";

/// One top-level script to host conversion.
pub(super) struct ToHost<'conv, 'js> {
    /// Source context
    ctx: &'conv Ctx<'js>,
    /// Intrinsics and exception types
    shared: &'conv BridgeShared,
    /// Containers currently being converted, outermost first
    ancestors: Vec<Object<'js>>,
    /// Whether a plain object above this point already passed the cycle probe
    probed: bool,
}

impl<'conv, 'js> ToHost<'conv, 'js> {
    /// Start a conversion.
    pub(super) fn new(ctx: &'conv Ctx<'js>, shared: &'conv BridgeShared) -> Self {
        Self {
            ctx,
            shared,
            ancestors: Vec::new(),
            probed: false,
        }
    }

    /// Convert a value.
    ///
    /// # Errors
    /// Returns `CircularReference` for containers that contain an ancestor, `UnsupportedType`
    /// for symbols and other values with no host form, and the script error when the cycle
    /// probe or a getter throws.
    pub(super) fn convert(&mut self, value: Value<'js>) -> BridgeResult<HostValue> {
        if value.is_null() || value.is_undefined() {
            return Ok(HostValue::Null);
        }
        if let Some(flag) = value.as_bool() {
            return Ok(HostValue::Bool(flag));
        }
        if let Some(number) = value.as_int() {
            return Ok(HostValue::Long(i64::from(number)));
        }
        if let Some(number) = value.as_float() {
            return Ok(HostValue::Double(number));
        }
        if let Some(text) = value.as_string() {
            return Ok(HostValue::String(text.to_string()?));
        }
        if raw::is_bytecode(&value) || raw::is_module(&value) {
            return Ok(HostValue::UByteArray(raw::write_bytecode(self.ctx, &value)?));
        }
        if value.is_function() {
            return Ok(HostValue::from(FUNCTION_PLACEHOLDER));
        }
        if let Some(promise) = value.as_promise() {
            let state = match promise.state() {
                PromiseState::Pending => "pending",
                PromiseState::Resolved => "fulfilled",
                PromiseState::Rejected => "rejected",
            };
            return Ok(HostValue::String(format!("Promise {{ <state>: \"{state}\" }}")));
        }
        if let Some(exception) = value.as_exception() {
            let throwable = throwable_from_exception(&self.shared.exception_types, exception)?;
            return Ok(HostValue::Throwable(throwable));
        }
        if let Some(array) = value.as_array() {
            let object = array.as_object().clone();
            self.enter(&object)?;
            let items = array
                .iter::<Value<'js>>()
                .map(|item| self.convert(item?))
                .collect::<BridgeResult<Vec<_>>>();
            self.ancestors.pop();
            return Ok(HostValue::List(shared(items?)));
        }
        if let Some(object) = value.as_object() {
            return self.object(object.clone());
        }
        Err(BridgeError::UnsupportedType(value.type_name().to_owned()))
    }

    /// Dispatch an object by identity: `Set`, `Map`, byte arrays, else plain.
    fn object(&mut self, object: Object<'js>) -> BridgeResult<HostValue> {
        let shared_state = self.shared;
        let intrinsics = &shared_state.intrinsics;
        if object.is_instance_of(intrinsics.get(self.ctx, Intrinsic::Set)?) {
            self.enter(&object)?;
            let items = iterate(&object, "keys").and_then(|keys| {
                keys.into_iter()
                    .map(|item| self.convert(item))
                    .collect::<BridgeResult<Vec<_>>>()
            });
            self.ancestors.pop();
            return Ok(HostValue::Set(shared(items?)));
        }
        if object.is_instance_of(intrinsics.get(self.ctx, Intrinsic::Map)?) {
            self.enter(&object)?;
            let entries = iterate(&object, "entries").and_then(|pairs| {
                pairs
                    .into_iter()
                    .map(|pair| self.entry(pair))
                    .collect::<BridgeResult<Vec<_>>>()
            });
            self.ancestors.pop();
            return Ok(HostValue::Map(shared(entries?)));
        }
        if let Some(bytes) = object.as_typed_array::<u8>() {
            return Ok(HostValue::UByteArray(
                bytes.as_bytes().map(<[u8]>::to_vec).unwrap_or_default(),
            ));
        }
        if let Some(bytes) = object.as_typed_array::<i8>() {
            return Ok(HostValue::ByteArray(
                bytes
                    .as_bytes()
                    .map(|raw_bytes| raw_bytes.iter().map(|byte| *byte as i8).collect())
                    .unwrap_or_default(),
            ));
        }
        self.plain(object)
    }

    /// Convert a plain object's own enumerable properties.
    ///
    /// The outermost plain object is serialized by the cycle probe first, so cycles through
    /// nested plain objects fail there with the script's own error.
    fn plain(&mut self, object: Object<'js>) -> BridgeResult<HostValue> {
        let outermost = !self.probed;
        if outermost {
            let probe = self
                .shared
                .intrinsics
                .function(self.ctx, Intrinsic::CycleProbe)?;
            probe.call::<_, Value<'js>>((object.clone(),))?;
            self.probed = true;
        }
        self.enter(&object)?;
        let entries = self.properties(&object);
        self.ancestors.pop();
        if outermost {
            self.probed = false;
        }
        Ok(HostValue::Object(shared(entries?)))
    }

    /// Collect `(key, value)` pairs of string and symbol keyed enumerable properties.
    fn properties(&mut self, object: &Object<'js>) -> BridgeResult<Vec<(String, HostValue)>> {
        let mut entries = Vec::new();
        let filter = Filter::new().string().symbol().enum_only();
        for property in object.own_props::<Value<'js>, Value<'js>>(filter) {
            let (key, item) = property?;
            let name = property_key(&key)?;
            let converted = if item.is_function() {
                HostValue::from(FUNCTION_PLACEHOLDER)
            } else if item.as_object().is_some_and(|inner| inner == object) {
                let Coerced(text) = item.get::<Coerced<String>>()?;
                HostValue::String(text)
            } else {
                self.convert(item)?
            };
            entries.push((name, converted));
        }
        Ok(entries)
    }

    /// Convert one `[key, value]` pair produced by `Map.prototype.entries`.
    fn entry(&mut self, pair: Value<'js>) -> BridgeResult<(HostValue, HostValue)> {
        let pair = pair
            .into_array()
            .ok_or_else(|| BridgeError::TypeMapping("Map entry is not an array.".to_owned()))?;
        let key = self.convert(pair.get(0)?)?;
        let item = self.convert(pair.get(1)?)?;
        Ok((key, item))
    }

    /// Push a container, failing if it is already being converted.
    fn enter(&mut self, object: &Object<'js>) -> BridgeResult<()> {
        if self.ancestors.contains(object) {
            return Err(BridgeError::CircularReference);
        }
        self.ancestors.push(object.clone());
        Ok(())
    }
}

/// Drain the iterator returned by calling `method` on `object`.
fn iterate<'js>(object: &Object<'js>, method: &str) -> BridgeResult<Vec<Value<'js>>> {
    let open: Function<'js> = object.get(method)?;
    let iterator: Object<'js> = open.call((This(object.clone()),))?;
    let next: Function<'js> = iterator.get("next")?;
    let mut items = Vec::new();
    loop {
        let step: Object<'js> = next.call((This(iterator.clone()),))?;
        if step.get::<_, bool>("done")? {
            return Ok(items);
        }
        items.push(step.get("value")?);
    }
}

/// Host key for a property: strings as is, symbols as `Symbol(description)`.
fn property_key(key: &Value<'_>) -> BridgeResult<String> {
    if let Some(text) = key.as_string() {
        return Ok(text.to_string()?);
    }
    if let Some(symbol) = key.as_symbol() {
        let description = symbol.description()?;
        let Coerced(text) = if description.is_undefined() {
            Coerced(String::new())
        } else {
            description.get::<Coerced<String>>()?
        };
        return Ok(format!("Symbol({text})"));
    }
    let Coerced(text) = key.get::<Coerced<String>>()?;
    Ok(text)
}
