//! The `Expression` bridge: a server-side expression literal distinct from
//! an ordinary string, produced by `mysqlx.expr(text)` and consumed by CRUD
//! builders and the Value→TableValue mapper wherever an expression is
//! accepted in place of a literal.

use crate::bridge::{handle, require_member, Bridge, BridgeHandle};
use crate::err::Error;
use crate::value::Value;

const EXPRESSION_MEMBERS: &[&str] = &["text"];

/// A bridge wrapping a server-side expression string.
///
/// Its printed representation is always `<Expression>` regardless of
/// payload — the payload itself is reachable only
/// through the `text` member, which [`crate::mapper::map_table_value`]
/// reads to decide between `TableValue::Expression` and `ArgumentError`.
#[derive(Debug)]
pub struct Expression {
	payload: String,
}

impl Expression {
	/// Wraps `payload` as an `Expression` bridge.
	pub fn new_handle(payload: impl Into<String>) -> BridgeHandle {
		handle(Expression {
			payload: payload.into(),
		})
	}
}

impl Bridge for Expression {
	fn class_name(&self) -> &str {
		"Expression"
	}

	fn members(&self) -> &[&str] {
		EXPRESSION_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"text" => Ok(Value::String(self.payload.clone())),
			_ => Ok(Value::Undefined),
		}
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Err(crate::err::ErrorKind::UnknownMember
			.with_message(format!("Expression has no callable member '{name}' ({} args given)", args.len())))
	}
}
