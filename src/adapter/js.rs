//! The JavaScript script-runtime adapter: installs `mysql`, `mysqlx`
//! and `dba` as globals and marshals values between [`ShellValue`] and
//! QuickJS's own value representation.
//!
//! Every Bridge is exposed to JavaScript through a native `Proxy` whose
//! `get`/`has`/`ownKeys` traps call back into Rust rather than copying
//! members onto a plain object up front, so a bridge whose member list
//! depends on CRUD builder chain state always reflects its current legal
//! members, not a snapshot taken at construction time.

use crate::bridge::BridgeHandle;
use crate::err::{Error, ErrorKind};
use crate::modules::standard_modules;
use crate::protocol::ProtocolConnector;
use crate::value::Value as ShellValue;
use js::function::Rest;
use js::{Array, Context, Ctx, Exception, Function, Object, Runtime, String as JsString, Value as JsValue};
use std::fmt;

/// Bootstrap script defining `__makeBridgeProxy`, invoked once per bridge
/// handle installed as a global or returned from a call. Delegates every
/// trap to the native functions registered under the same name on `target`.
const BOOTSTRAP: &str = r#"
function __makeBridgeProxy(target) {
    return new Proxy(target, {
        get(t, prop) {
            if (typeof prop !== "string") return undefined;
            return t.__get(prop);
        },
        has(t, prop) {
            return typeof prop === "string" && t.__has(prop);
        },
        ownKeys(t) {
            return t.__keys();
        },
        getOwnPropertyDescriptor(t, prop) {
            if (typeof prop !== "string" || !t.__has(prop)) return undefined;
            return { enumerable: true, configurable: true, value: t.__get(prop) };
        },
    });
}
"#;

/// One script-runtime instance: an owned QuickJS runtime/context pair with
/// the shell's globals already installed.
pub struct JsAdapter {
	_runtime: Runtime,
	context: Context,
}

impl fmt::Debug for JsAdapter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JsAdapter").finish_non_exhaustive()
	}
}

impl JsAdapter {
	/// Builds a fresh adapter with `mysql`/`mysqlx`/`dba` installed as
	/// globals, using connector type `C` for every session opened through
	/// them.
	pub fn new<C>() -> Result<JsAdapter, Error>
	where
		C: ProtocolConnector,
	{
		let runtime = Runtime::new().map_err(Error::from)?;
		let context = Context::full(&runtime).map_err(Error::from)?;
		context.with(|ctx| -> Result<(), Error> {
			ctx.eval::<(), _>(BOOTSTRAP).map_err(Error::from)?;
			for (name, handle) in standard_modules::<C>() {
				let proxy = wrap_bridge(ctx, handle)?;
				ctx.globals().set(name, proxy).map_err(Error::from)?;
			}
			Ok(())
		})?;
		Ok(JsAdapter {
			_runtime: runtime,
			context,
		})
	}

	/// Evaluates `source` as a script, returning its completion value
	/// marshaled back to a [`ShellValue`].
	pub fn eval(&self, source: &str) -> Result<ShellValue, Error> {
		self.context.with(|ctx| -> Result<ShellValue, Error> {
			let value: JsValue = ctx.eval(source).map_err(Error::from)?;
			from_js(ctx, &value)
		})
	}
}

/// Wraps `handle` as a target object carrying the native `__get`/`__has`/
/// `__keys` functions the bootstrap `Proxy` delegates to, then returns the
/// proxy itself. A callable member is returned from `__get` as a bound JS
/// function that re-enters [`crate::bridge::Bridge::call`] on invocation.
fn wrap_bridge<'js>(ctx: Ctx<'js>, handle: BridgeHandle) -> Result<JsValue<'js>, Error> {
	let target = Object::new(ctx).map_err(Error::from)?;

	let getter_handle = handle.clone();
	let getter = Function::new(ctx, move |name: String| -> js::Result<JsValue> { bridge_get(ctx, &getter_handle, &name) })
		.map_err(Error::from)?;
	target.set("__get", getter).map_err(Error::from)?;

	let has_handle = handle.clone();
	let haser = Function::new(ctx, move |name: String| -> bool {
		has_handle.lock().unwrap().members().contains(&name.as_str())
	})
	.map_err(Error::from)?;
	target.set("__has", haser).map_err(Error::from)?;

	let keys_handle = handle.clone();
	let keys_fn = Function::new(ctx, move || -> Vec<String> {
		keys_handle.lock().unwrap().members().iter().map(|m| m.to_string()).collect()
	})
	.map_err(Error::from)?;
	target.set("__keys", keys_fn).map_err(Error::from)?;

	let make_proxy: Function = ctx.globals().get("__makeBridgeProxy").map_err(Error::from)?;
	make_proxy.call((target,)).map_err(Error::from)
}

/// Raises `error` as a JavaScript exception carrying its message, the way
/// every crossing of the script boundary is required to preserve the
/// originating message even though `ErrorKind` itself has no JS-side
/// representation.
fn throw(ctx: Ctx<'_>, error: Error) -> js::Error {
	Exception::throw_message(ctx, error.message())
}

fn bridge_get<'js>(ctx: Ctx<'js>, handle: &BridgeHandle, name: &str) -> js::Result<JsValue<'js>> {
	let value = handle.lock().unwrap().get_member(name).map_err(|e| throw(ctx, e))?;
	if !matches!(value, ShellValue::Undefined) {
		return into_js(ctx, &value).map_err(|e| throw(ctx, e));
	}
	let call_handle = handle.clone();
	let member = name.to_string();
	let bound = Function::new(ctx, move |args: Rest<JsValue>| -> js::Result<JsValue> {
		let shell_args: Vec<ShellValue> =
			args.0.iter().map(|v| from_js(ctx, v)).collect::<Result<_, Error>>().map_err(|e| throw(ctx, e))?;
		let result = call_handle.lock().unwrap().call(&member, &shell_args).map_err(|e| throw(ctx, e))?;
		into_js(ctx, &result).map_err(|e| throw(ctx, e))
	})
	.map_err(|e: Error| throw(ctx, e))?;
	Ok(bound.into_value())
}

/// Marshals a [`ShellValue`] into QuickJS's own value representation:
/// scalars map one-to-one, `Array`/`Map` become native JS arrays/objects,
/// and `Object`/`Function` become the `Proxy` [`wrap_bridge`] builds.
fn into_js<'js>(ctx: Ctx<'js>, value: &ShellValue) -> Result<JsValue<'js>, Error> {
	match value {
		ShellValue::Undefined => Ok(JsValue::new_undefined(ctx)),
		ShellValue::Null => Ok(JsValue::new_null(ctx)),
		ShellValue::Bool(b) => Ok(JsValue::new_bool(ctx, *b)),
		ShellValue::Integer(v) => Ok(JsValue::new_number(ctx, *v as f64)),
		ShellValue::UInteger(v) => Ok(JsValue::new_number(ctx, *v as f64)),
		ShellValue::Float(v) => Ok(JsValue::new_number(ctx, *v)),
		ShellValue::String(s) => Ok(JsString::from_str(ctx, s).map_err(Error::from)?.into_value()),
		ShellValue::Array(a) => {
			let arr = Array::new(ctx).map_err(Error::from)?;
			for (i, item) in a.lock().unwrap().iter().enumerate() {
				arr.set(i, into_js(ctx, item)?).map_err(Error::from)?;
			}
			Ok(arr.into_value())
		}
		ShellValue::Map(m) => {
			let obj = Object::new(ctx).map_err(Error::from)?;
			for (k, v) in m.lock().unwrap().iter() {
				obj.set(k.as_str(), into_js(ctx, v)?).map_err(Error::from)?;
			}
			Ok(obj.into_value())
		}
		ShellValue::MapRef(_) => into_js(ctx, &value.resolve()),
		ShellValue::Object(handle) => wrap_bridge(ctx, handle.clone()),
		ShellValue::Function(f) => {
			let bound = f.clone();
			let func = Function::new(ctx, move |args: Rest<JsValue>| -> js::Result<JsValue> {
				let shell_args: Vec<ShellValue> =
					args.0.iter().map(|v| from_js(ctx, v)).collect::<Result<_, Error>>().map_err(|e| throw(ctx, e))?;
				let result = bound.invoke(&shell_args).map_err(|e| throw(ctx, e))?;
				into_js(ctx, &result).map_err(|e| throw(ctx, e))
			})
			.map_err(Error::from)?;
			Ok(func.into_value())
		}
	}
}

/// Marshals a QuickJS value back into a [`ShellValue`]: a number with no
/// fractional part that fits in an `i64` becomes `Integer`, everything else
/// numeric becomes `Float`.
fn from_js(ctx: Ctx<'_>, value: &JsValue) -> Result<ShellValue, Error> {
	if value.is_undefined() {
		return Ok(ShellValue::Undefined);
	}
	if value.is_null() {
		return Ok(ShellValue::Null);
	}
	if let Some(b) = value.as_bool() {
		return Ok(ShellValue::Bool(b));
	}
	if let Some(n) = value.as_float() {
		if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
			return Ok(ShellValue::Integer(n as i64));
		}
		return Ok(ShellValue::Float(n));
	}
	if let Some(s) = value.as_string() {
		return Ok(ShellValue::String(s.to_string().map_err(Error::from)?));
	}
	if let Some(arr) = value.as_array() {
		let mut items = Vec::with_capacity(arr.len());
		for item in arr.iter::<JsValue>() {
			items.push(from_js(ctx, &item.map_err(Error::from)?)?);
		}
		return Ok(ShellValue::array_from(items));
	}
	if let Some(obj) = value.as_object() {
		let mut entries = Vec::new();
		for key in obj.keys::<String>() {
			let key = key.map_err(Error::from)?;
			let item: JsValue = obj.get(&key).map_err(Error::from)?;
			entries.push((key, from_js(ctx, &item)?));
		}
		return Ok(ShellValue::map_from(entries));
	}
	Err(ErrorKind::Deserialization.with_message("unsupported JavaScript value in marshaling"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connstr::ConnectionString;
	use crate::protocol::{Request, Response};
	use async_trait::async_trait;

	struct StubConnector;

	#[async_trait]
	impl ProtocolConnector for StubConnector {
		async fn connect(_conn_str: &ConnectionString) -> Result<Self, Error> {
			Ok(StubConnector)
		}

		async fn execute(&mut self, request: Request) -> Result<Response, Error> {
			match request {
				Request::Execute { .. } => Ok(Response::Results(Vec::new())),
				Request::Close => Ok(Response::Closed),
			}
		}
	}

	#[test]
	fn mysqlx_expr_is_reachable_through_the_proxy() {
		let adapter = JsAdapter::new::<StubConnector>().unwrap();
		let result = adapter.eval("mysqlx.expr('1+1').text").unwrap();
		assert_eq!(result.as_string().unwrap(), "1+1");
	}

	#[test]
	fn dba_reflects_fourteen_members() {
		let adapter = JsAdapter::new::<StubConnector>().unwrap();
		let result = adapter.eval("Object.keys(dba).length").unwrap();
		assert_eq!(result.as_int().unwrap(), 14);
	}

	#[test]
	fn unknown_member_raises_a_catchable_exception() {
		let adapter = JsAdapter::new::<StubConnector>().unwrap();
		let result = adapter.eval("try { dba.bogus; 'unreachable' } catch (e) { e.message }").unwrap();
		assert!(result.as_string().unwrap().contains("has no member"));
	}
}
