//! Value→TableValue mapper: the narrowing conversion from a tagged value
//! to the typed value a table CRUD operation accepts.
//!
//! Non-empty expressions are accepted, empty ones rejected — the correct
//! direction for that check, even though a superficially similar check
//! elsewhere in this problem space gets this inverted.

use crate::err::{Error, ErrorKind};
use crate::value::Value;

/// The typed value a table CRUD operation accepts, after narrowing a
/// [`Value`] down from the universal dynamic type.
#[derive(Debug, Clone, PartialEq)]
pub enum TableValue {
	/// `Value::Null`.
	Null,
	/// `Value::Bool`.
	Bool(bool),
	/// `Value::String`.
	String(String),
	/// `Value::Integer`.
	SInt64(i64),
	/// `Value::UInteger`.
	UInt64(u64),
	/// `Value::Float`.
	Double(f64),
	/// A non-empty `Expression` bridge's payload.
	Expression(String),
}

impl TableValue {
	/// Renders this value as SQL text suitable for inlining into a
	/// statement built by a CRUD builder. Expressions are emitted
	/// unquoted; everything else uses [`Value::descr`]'s quoting rules via
	/// a round-trip through the matching [`Value`] variant.
	pub fn render(&self) -> String {
		match self {
			TableValue::Null => "null".to_string(),
			TableValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
			TableValue::String(s) => Value::String(s.clone()).descr(),
			TableValue::SInt64(v) => v.to_string(),
			TableValue::UInt64(v) => v.to_string(),
			TableValue::Double(v) => Value::Float(*v).descr(),
			TableValue::Expression(text) => text.clone(),
		}
	}
}

/// Narrows `value` to the [`TableValue`] a table CRUD operation accepts.
///
/// Fails `ArgumentError("Unsupported value received: "+descr)` for
/// `Undefined`, `Array`, `Map`, `MapRef`, `Function`, and any `Object` that
/// is not an `Expression` bridge; fails
/// `ArgumentError("Expressions can not be empty.")` for an `Expression`
/// whose payload is empty.
pub fn map_table_value(value: &Value) -> Result<TableValue, Error> {
	match value {
		Value::Null => Ok(TableValue::Null),
		Value::Bool(b) => Ok(TableValue::Bool(*b)),
		Value::String(s) => Ok(TableValue::String(s.clone())),
		Value::Integer(v) => Ok(TableValue::SInt64(*v)),
		Value::UInteger(v) => Ok(TableValue::UInt64(*v)),
		Value::Float(v) => Ok(TableValue::Double(*v)),
		Value::Object(bridge) => {
			let guard = bridge.lock().unwrap();
			if guard.class_name() != "Expression" {
				return Err(unsupported(value));
			}
			let text = guard.get_member("text")?.as_string()?.to_string();
			if text.is_empty() {
				Err(ErrorKind::ArgumentError.with_message("Expressions can not be empty."))
			} else {
				Ok(TableValue::Expression(text))
			}
		}
		other => Err(unsupported(other)),
	}
}

fn unsupported(value: &Value) -> Error {
	ErrorKind::ArgumentError.with_message(format!("Unsupported value received: {}", value.descr()))
}
