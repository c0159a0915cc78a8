//! Script-side helpers the marshaller looks up once per bridge.

use std::collections::HashMap;

use parking_lot::Mutex;
use rquickjs::{Ctx, Function, Object, Persistent, Value};

use crate::error::{BridgeError, BridgeResult};

/// Serializes a value, nulling direct self references, so that deeper cycles throw.
const CYCLE_PROBE_SOURCE: &str = "(value) => JSON.stringify(value, function (key, item) { \
     return key !== '' && item === this ? null : item; })";

/// Settles with the completion value of an asynchronously evaluated script.
const AWAIT_COMPLETION_SOURCE: &str = "(promise, unwrap) => { \
     const settled = promise.then((completion) => (unwrap && completion !== null \
       && typeof completion === 'object' && 'value' in completion ? completion.value : completion)); \
     settled.catch(() => {}); \
     return settled; }";

/// A script value the bridge needs by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    /// Global `Map` constructor
    Map,
    /// Global `Set` constructor
    Set,
    /// JSON based cycle detector for plain objects
    CycleProbe,
    /// Adapter turning an async evaluation promise into its completion value
    AwaitCompletion,
}

impl Intrinsic {
    /// Name used in lookup errors.
    const fn name(self) -> &'static str {
        match self {
            Self::Map => "Map",
            Self::Set => "Set",
            Self::CycleProbe => "cycleProbe",
            Self::AwaitCompletion => "awaitCompletion",
        }
    }

    /// Look the value up in a context.
    fn load<'js>(self, ctx: &Ctx<'js>) -> BridgeResult<Object<'js>> {
        let value: Value<'js> = match self {
            Self::Map | Self::Set => ctx.globals().get(self.name())?,
            Self::CycleProbe => ctx.eval(CYCLE_PROBE_SOURCE)?,
            Self::AwaitCompletion => ctx.eval(AWAIT_COMPLETION_SOURCE)?,
        };
        match value.into_object() {
            Some(object) if object.is_function() => Ok(object),
            _ => Err(BridgeError::TypeMapping(format!(
                "JS constructor '{}' not found.",
                self.name()
            ))),
        }
    }
}

/// Per-bridge cache of intrinsic values.
#[derive(Default)]
pub struct Intrinsics {
    /// Resolved values
    cache: Mutex<HashMap<Intrinsic, Persistent<Object<'static>>>>,
}

impl Intrinsics {
    /// Resolve an intrinsic, loading it on first use.
    ///
    /// # Errors
    /// Returns `TypeMapping` if the value is missing from the context.
    pub fn get<'js>(&self, ctx: &Ctx<'js>, intrinsic: Intrinsic) -> BridgeResult<Object<'js>> {
        let cached = self.cache.lock().get(&intrinsic).cloned();
        if let Some(saved) = cached {
            return Ok(saved.restore(ctx)?);
        }
        let object = intrinsic.load(ctx)?;
        self.cache
            .lock()
            .insert(intrinsic, Persistent::save(ctx, object.clone()));
        Ok(object)
    }

    /// Resolve an intrinsic that is called as a function.
    ///
    /// # Errors
    /// Returns `TypeMapping` if the value is missing from the context.
    pub fn function<'js>(
        &self,
        ctx: &Ctx<'js>,
        intrinsic: Intrinsic,
    ) -> BridgeResult<Function<'js>> {
        self.get(ctx, intrinsic)?
            .into_value()
            .into_function()
            .ok_or_else(|| BridgeError::TypeMapping(format!("'{}' is not callable.", intrinsic.name())))
    }

    /// Drop every cached value. Must run inside the engine lock.
    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}
