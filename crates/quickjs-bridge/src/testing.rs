//! Fixtures shared by the unit tests.

use std::sync::Arc;

use rquickjs::{Context, Ctx, Runtime};

use crate::host::{CallScope, Host, HostResult};
use crate::registry::{BridgeShared, ExceptionTypes, ObjectHandle};
use crate::value::HostValue;

/// Host that answers every callback with `Null`.
pub struct NullHost;

impl Host for NullHost {
    fn on_call_getter(
        &self,
        _scope: &CallScope<'_, '_>,
        _object: ObjectHandle,
        _property: &str,
    ) -> HostResult<HostValue> {
        Ok(HostValue::Null)
    }

    fn on_call_setter(
        &self,
        _scope: &CallScope<'_, '_>,
        _object: ObjectHandle,
        _property: &str,
        _value: HostValue,
    ) -> HostResult<()> {
        Ok(())
    }

    fn on_call_function(
        &self,
        _scope: &CallScope<'_, '_>,
        _object: ObjectHandle,
        _function: &str,
        _args: Vec<HostValue>,
    ) -> HostResult<HostValue> {
        Ok(HostValue::Null)
    }
}

/// Run a test body inside a fresh context with bridge state that has no members.
pub fn with_shared<F>(body: F)
where
    F: for<'js> FnOnce(Ctx<'js>, &BridgeShared) + Send,
{
    let runtime = Runtime::new().expect("runtime should start");
    let context = Context::full(&runtime).expect("context should start");
    context.with(|ctx| {
        let shared = BridgeShared::new(Arc::new(NullHost), Arc::new(ExceptionTypes::new()));
        body(ctx, &shared);
        shared.teardown();
    });
}
