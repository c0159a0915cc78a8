//! Forwarding of unobserved promise rejections to the host.

use std::sync::Weak;

use rquickjs::{Ctx, Runtime, Value};

use crate::marshal::{Marshal, surface};
use crate::registry::BridgeShared;
use crate::value::HostValue;

/// Install the runtime-wide rejection tracker for a bridge. Replaces any previous tracker.
pub fn install(runtime: &Runtime, shared: Weak<BridgeShared>) {
    runtime.set_host_promise_rejection_tracker(Some(Box::new(tracker(
        move |ctx, _promise, reason, is_handled| {
            if let Some(shared) = shared.upgrade() {
                track(&ctx, &shared, reason, is_handled);
            }
        },
    ))));
}

/// Remove the tracker.
pub fn uninstall(runtime: &Runtime) {
    runtime.set_host_promise_rejection_tracker(None);
}

/// Pin the tracker signature so the closure is generic over the context lifetime.
fn tracker<F>(callback: F) -> F
where
    F: for<'js> Fn(Ctx<'js>, Value<'js>, Value<'js>, bool) + Send + 'static,
{
    callback
}

/// Report a rejection, or the handling of an earlier one.
fn track<'js>(ctx: &Ctx<'js>, shared: &BridgeShared, reason: Value<'js>, is_handled: bool) {
    if is_handled {
        tracing::trace!("Previously unhandled rejection is now handled");
        shared.host.clear_handled_promise_rejection();
        return;
    }
    let converted = Marshal::new(ctx, shared)
        .to_host(reason)
        .unwrap_or_else(|error| HostValue::Throwable(surface(ctx, shared, error).to_throwable()));
    tracing::debug!("Unhandled promise rejection: {converted}");
    shared.host.set_unhandled_promise_rejection(converted);
}
