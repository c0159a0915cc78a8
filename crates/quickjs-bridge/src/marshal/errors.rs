//! Moving exceptions across the boundary in both directions.

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Error as QuickJsError, Exception, Value};

use crate::error::BridgeError;
use crate::registry::{BridgeShared, ExceptionTypes};
use crate::value::HostThrowable;

/// Build a script `Error` with the given name.
///
/// # Errors
/// Returns an engine error if the object cannot be allocated.
pub fn script_error<'js>(
    ctx: &Ctx<'js>,
    name: &str,
    message: &str,
) -> Result<Value<'js>, QuickJsError> {
    let exception = Exception::from_message(ctx.clone(), message)?;
    exception.as_object().set("name", name)?;
    Ok(exception.into_value())
}

/// Build the script `Error` a host throwable is raised as: dotted name, message and the
/// host frames joined by newlines as `stack`.
///
/// # Errors
/// Returns an engine error if the object cannot be allocated.
pub fn throwable_to_script<'js>(
    ctx: &Ctx<'js>,
    throwable: &HostThrowable,
) -> Result<Value<'js>, QuickJsError> {
    let exception = Exception::from_message(ctx.clone(), throwable.message().unwrap_or_default())?;
    let object = exception.as_object();
    object.set("name", throwable.script_name())?;
    object.set("stack", throwable.stack().join("\n"))?;
    Ok(exception.into_value())
}

/// Map a script error object to a host throwable.
///
/// A registered host type named after the error receives `message\nstack`; anything else
/// becomes the bridge exception carrying `name: message\nstack`.
///
/// # Errors
/// Returns an engine error if reading the error's fields throws.
pub fn throwable_from_exception<'js>(
    types: &ExceptionTypes,
    exception: &Exception<'js>,
) -> Result<HostThrowable, QuickJsError> {
    let name: Option<Coerced<String>> = exception.as_object().get("name")?;
    let Some(Coerced(name)) = name else {
        let Coerced(text) = exception.as_value().get::<Coerced<String>>()?;
        return Ok(HostThrowable::bridge_exception(text));
    };
    let detail = join_detail(
        &exception.message().unwrap_or_default(),
        &exception.stack().unwrap_or_default(),
    );
    Ok(match types.resolve(&name) {
        Some(factory) => factory(detail),
        None => HostThrowable::bridge_exception(format!("{name}: {detail}")),
    })
}

/// Host throwable for any thrown script value.
pub fn script_throwable<'js>(types: &ExceptionTypes, thrown: &Value<'js>) -> HostThrowable {
    if let Some(exception) = thrown.as_exception() {
        match throwable_from_exception(types, exception) {
            Ok(throwable) => return throwable,
            Err(error) => tracing::warn!("Failed to read script exception fields: {error}"),
        }
    }
    HostThrowable::bridge_exception(exception_text(thrown))
}

/// Single-string rendering of a thrown value: `name: message\nstack` for errors.
pub fn exception_text(thrown: &Value<'_>) -> String {
    if let Some(exception) = thrown.as_exception() {
        let name = exception
            .as_object()
            .get::<_, Option<Coerced<String>>>("name")
            .ok()
            .flatten()
            .map_or_else(|| "Error".to_owned(), |Coerced(name)| name);
        let detail = join_detail(
            &exception.message().unwrap_or_default(),
            &exception.stack().unwrap_or_default(),
        );
        return format!("{name}: {detail}");
    }
    thrown
        .get::<Coerced<String>>()
        .map_or_else(|_| "Unknown exception".to_owned(), |Coerced(text)| text)
}

/// Convert a pending script exception into a host error. Other errors pass through.
///
/// Must be called on the context the error was raised in, before anything else runs.
pub fn surface(ctx: &Ctx<'_>, shared: &BridgeShared, error: BridgeError) -> BridgeError {
    match error {
        BridgeError::Engine(QuickJsError::Exception) => {
            let thrown = ctx.catch();
            BridgeError::Script(script_throwable(&shared.exception_types, &thrown))
        }
        other => other,
    }
}

/// Raise a bridge error inside script from a callback, returning the error the callback
/// must propagate.
pub fn rethrow(ctx: &Ctx<'_>, error: BridgeError) -> QuickJsError {
    let built = match error {
        BridgeError::Engine(QuickJsError::Exception) => return QuickJsError::Exception,
        BridgeError::Engine(engine) => return engine,
        BridgeError::Host(throwable) | BridgeError::Script(throwable) => {
            throwable_to_script(ctx, &throwable)
        }
        BridgeError::TypeMapping(message) => script_error(ctx, "TypeMappingError", &message),
        other @ BridgeError::UnsupportedType(_) => {
            script_error(ctx, "TypeError", &other.to_string())
        }
        other => script_error(ctx, "Error", &other.to_string()),
    };
    match built {
        Ok(value) => ctx.throw(value),
        Err(engine) => engine,
    }
}

/// Join a message and a stack with a newline, dropping a trailing blank line.
fn join_detail(message: &str, stack: &str) -> String {
    let stack = stack.trim_end();
    if stack.is_empty() {
        message.to_owned()
    } else {
        format!("{message}\n{stack}")
    }
}
