//! Native callables that route script access to host callbacks.

use std::sync::{Arc, Weak};

use rquickjs::function::Rest;
use rquickjs::object::{Accessor, Property};
use rquickjs::{Ctx, Error as QuickJsError, Function, Object, Persistent, Promise, Value};

use crate::bridge::binding::PropertyBinding;
use crate::error::BridgeError;
use crate::host::{CallScope, Host};
use crate::marshal::{Marshal, rethrow, throwable_to_script};
use crate::registry::{BridgeShared, GlobalRef, ObjectHandle};
use crate::value::{HostThrowable, HostValue};

/// What a callable needs to find its host member. Owned by the bridge state.
#[derive(Debug)]
pub struct CallableData {
    /// Object the member belongs to
    object: ObjectHandle,
    /// Property or function name
    member: String,
    /// Host backing the member
    global_ref: GlobalRef,
    /// Bridge the callable was installed by
    shared: Weak<BridgeShared>,
}

impl CallableData {
    /// Data for one member.
    pub fn new(
        object: ObjectHandle,
        member: impl Into<String>,
        global_ref: GlobalRef,
        shared: Weak<BridgeShared>,
    ) -> Self {
        Self {
            object,
            member: member.into(),
            global_ref,
            shared,
        }
    }

    /// Bridge state and host, or the script error to throw if the bridge is gone.
    fn resolve(&self, ctx: &Ctx<'_>) -> Result<(Arc<BridgeShared>, Arc<dyn Host>), QuickJsError> {
        let Some(shared) = self.shared.upgrade() else {
            return Err(rethrow(ctx, BridgeError::EngineDestroyed("Bridge")));
        };
        let host = shared.state().global_reference(self.global_ref);
        match host {
            Some(host) => Ok((shared, host)),
            None => Err(rethrow(ctx, BridgeError::EngineDestroyed("Bridge"))),
        }
    }
}

/// Install a getter, and a setter when writable, for a host property.
///
/// # Errors
/// Returns an engine error if the property cannot be defined.
pub fn install_property<'js>(
    target: &Object<'js>,
    data: &Arc<CallableData>,
    binding: &PropertyBinding,
) -> Result<(), QuickJsError> {
    let get_data = Arc::clone(data);
    let getter = move |ctx: Ctx<'js>| call_getter(&ctx, &get_data);
    if binding.writable {
        let set_data = Arc::clone(data);
        let setter = move |ctx: Ctx<'js>, value: Value<'js>| call_setter(&ctx, &set_data, value);
        let accessor = Accessor::new(getter, setter);
        let accessor = if binding.configurable {
            accessor.configurable()
        } else {
            accessor
        };
        let accessor = if binding.enumerable {
            accessor.enumerable()
        } else {
            accessor
        };
        target.prop(binding.name.as_str(), accessor)?;
    } else {
        let accessor = Accessor::new_get(getter);
        let accessor = if binding.configurable {
            accessor.configurable()
        } else {
            accessor
        };
        let accessor = if binding.enumerable {
            accessor.enumerable()
        } else {
            accessor
        };
        target.prop(binding.name.as_str(), accessor)?;
    }
    tracing::trace!("Installed property {}.{}", data.object, binding.name);
    Ok(())
}

/// Install a host function, synchronous or promise returning.
///
/// # Errors
/// Returns an engine error if the function cannot be created or defined.
pub fn install_function<'js>(
    ctx: &Ctx<'js>,
    target: &Object<'js>,
    data: &Arc<CallableData>,
    is_async: bool,
) -> Result<(), QuickJsError> {
    let call_data = Arc::clone(data);
    let function = if is_async {
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            call_async(&ctx, &call_data, args.0)
        })?
    } else {
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<Value<'js>>| {
            call_sync(&ctx, &call_data, args.0)
        })?
    }
    .with_name(data.member.as_str())?;
    target.prop(data.member.as_str(), Property::from(function).configurable())?;
    tracing::trace!(
        "Installed {} function {}.{}",
        if is_async { "async" } else { "sync" },
        data.object,
        data.member
    );
    Ok(())
}

/// Read a host property.
fn call_getter<'js>(ctx: &Ctx<'js>, data: &CallableData) -> Result<Value<'js>, QuickJsError> {
    let (shared, host) = data.resolve(ctx)?;
    tracing::trace!("Getter {}.{}", data.object, data.member);
    let scope = CallScope::new(ctx, &shared);
    match host.on_call_getter(&scope, data.object, &data.member) {
        Ok(value) => Marshal::new(ctx, &shared)
            .to_script(&value)
            .map_err(|error| rethrow(ctx, error)),
        Err(throwable) => Err(raise_host_error(ctx, &shared, throwable)),
    }
}

/// Write a host property. The value is converted before the host sees anything.
fn call_setter<'js>(
    ctx: &Ctx<'js>,
    data: &CallableData,
    value: Value<'js>,
) -> Result<(), QuickJsError> {
    let (shared, host) = data.resolve(ctx)?;
    tracing::trace!("Setter {}.{}", data.object, data.member);
    let converted = Marshal::new(ctx, &shared)
        .to_host(value)
        .map_err(|error| rethrow(ctx, error))?;
    let scope = CallScope::new(ctx, &shared);
    host.on_call_setter(&scope, data.object, &data.member, converted)
        .map_err(|throwable| raise_host_error(ctx, &shared, throwable))
}

/// Call a synchronous host function.
fn call_sync<'js>(
    ctx: &Ctx<'js>,
    data: &CallableData,
    args: Vec<Value<'js>>,
) -> Result<Value<'js>, QuickJsError> {
    let (shared, host) = data.resolve(ctx)?;
    tracing::trace!("Function {}.{} ({} args)", data.object, data.member, args.len());
    let marshal = Marshal::new(ctx, &shared);
    let converted = marshal
        .args_to_host(args)
        .map_err(|error| rethrow(ctx, error))?;
    let scope = CallScope::new(ctx, &shared);
    match host.on_call_function(&scope, data.object, &data.member, converted) {
        Ok(result) => marshal
            .to_script(&result)
            .map_err(|error| rethrow(ctx, error)),
        Err(throwable) => Err(raise_host_error(ctx, &shared, throwable)),
    }
}

/// Call an async host function: hand it resolve/reject handles and return the promise.
fn call_async<'js>(
    ctx: &Ctx<'js>,
    data: &CallableData,
    args: Vec<Value<'js>>,
) -> Result<Value<'js>, QuickJsError> {
    let (shared, host) = data.resolve(ctx)?;
    tracing::trace!("Async function {}.{} ({} args)", data.object, data.member, args.len());
    let converted = Marshal::new(ctx, &shared)
        .args_to_host(args)
        .map_err(|error| rethrow(ctx, error))?;

    let (promise, resolve, reject) = Promise::new(ctx)?;
    let (resolve_handle, reject_handle) = shared.state().push_resolvers(
        Persistent::save(ctx, resolve),
        Persistent::save(ctx, reject.clone()),
    );
    let mut host_args = Vec::with_capacity(converted.len() + 2);
    host_args.push(HostValue::Long(resolve_handle.as_raw()));
    host_args.push(HostValue::Long(reject_handle.as_raw()));
    host_args.extend(converted);

    let scope = CallScope::new(ctx, &shared);
    if let Err(throwable) = host.on_call_function(&scope, data.object, &data.member, host_args) {
        tracing::debug!("Async function {} failed: {throwable}", data.member);
        let reason = throwable_to_script(ctx, &throwable)?;
        shared.state().set_host_error(throwable);
        reject.call::<_, Value<'js>>((reason,))?;
    }
    Ok(promise.into_value())
}

/// Record a host callback failure and raise it in script.
fn raise_host_error(ctx: &Ctx<'_>, shared: &BridgeShared, throwable: HostThrowable) -> QuickJsError {
    tracing::debug!("Host callback raised {}: {throwable}", throwable.type_name());
    shared.state().set_host_error(throwable.clone());
    rethrow(ctx, BridgeError::Host(throwable))
}
