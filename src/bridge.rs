//! The object bridge protocol: a single capability set — class name,
//! ordered member names, member read, method call — implemented once and
//! shared by every concrete object the shell exposes to a script runtime
//! (sessions, result sets, CRUD builders, the cluster façade, expressions).
//!
//! Deliberately a trait with concrete variants rather than a class
//! hierarchy — polymorphism without inheritance: a `Bridge` is whatever can
//! answer `class_name`/`members`/`get_member`/`call`.

use crate::err::{Error, ErrorKind};
use crate::value::Value;
use std::fmt;
use std::sync::{Arc, Mutex};

/// The capability set every script-visible object implements.
///
/// `get_member` must fail with [`ErrorKind::UnknownMember`] for any name
/// outside [`Bridge::members`]; `call` must fail with
/// [`ErrorKind::ArgumentError`] for bad arity or argument variant, carrying
/// the offending position and expected kind.
pub trait Bridge: Send {
	/// The bridge's class name, driving its printed representation
	/// (`<XSession:u@h:p>`, `<Cluster:NAME>`, `<Expression>`, ...).
	fn class_name(&self) -> &str;

	/// Member names usable as property or method names, in the order a
	/// `dir()`-style reflection call should present them.
	fn members(&self) -> &[&str];

	/// Reads a member by name.
	///
	/// Returns either a data [`Value`] or a [`Value::Function`] bound to
	/// this object for a callable member.
	fn get_member(&self, name: &str) -> Result<Value, Error>;

	/// Invokes a callable member.
	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error>;
}

/// A shared, thread-safely addressable handle to a [`Bridge`]: every bridge
/// must be safely addressable from any thread holding a reference.
pub type BridgeHandle = Arc<Mutex<dyn Bridge>>;

impl fmt::Debug for dyn Bridge {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<{}>", self.class_name())
	}
}

/// A [`Value::Function`]: a callable member bound to the object and member
/// name it was read from, so invoking it later re-dispatches through
/// [`Bridge::call`] without the caller needing to hold the object itself.
#[derive(Clone, Debug)]
pub struct FunctionHandle(Arc<BoundMethod>);

#[derive(Debug)]
struct BoundMethod {
	object: BridgeHandle,
	member: String,
}

impl FunctionHandle {
	/// Binds a callable member of `object` as an invocable function value.
	pub fn new(object: BridgeHandle, member: impl Into<String>) -> Self {
		FunctionHandle(Arc::new(BoundMethod {
			object,
			member: member.into(),
		}))
	}

	/// The name of the bound member.
	pub fn member(&self) -> &str {
		&self.0.member
	}

	/// Invokes the bound method with the given arguments.
	pub fn invoke(&self, args: &[Value]) -> Result<Value, Error> {
		let mut object = self.0.object.lock().unwrap();
		object.call(&self.0.member, args)
	}
}

impl PartialEq for FunctionHandle {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

/// Wraps a concrete [`Bridge`] implementation into a shared handle.
pub fn handle(bridge: impl Bridge + 'static) -> BridgeHandle {
	Arc::new(Mutex::new(bridge))
}

/// Looks up `name` in `members`, failing with [`ErrorKind::UnknownMember`]
/// if absent. Shared by every `Bridge::get_member`/`call` implementation so
/// the unknown-member message stays consistent across bridges.
pub fn require_member<'a>(class_name: &str, members: &[&'a str], name: &str) -> Result<&'a str, Error> {
	members
		.iter()
		.find(|m| **m == name)
		.copied()
		.ok_or_else(|| {
			ErrorKind::UnknownMember.with_message(format!("{class_name} has no member '{name}'"))
		})
}

#[cfg(test)]
mod tests {
	use super::*;

	struct Counter {
		members: Vec<&'static str>,
		count: i64,
	}

	impl Bridge for Counter {
		fn class_name(&self) -> &str {
			"Counter"
		}

		fn members(&self) -> &[&str] {
			&self.members
		}

		fn get_member(&self, name: &str) -> Result<Value, Error> {
			require_member(self.class_name(), self.members(), name)?;
			match name {
				"value" => Ok(Value::Integer(self.count)),
				_ => Ok(Value::Undefined),
			}
		}

		fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
			require_member(self.class_name(), self.members(), name)?;
			match name {
				"increment" => {
					self.count += 1;
					Ok(Value::Integer(self.count))
				}
				_ => Err(Error::arity(name, 0, 0, args.len())),
			}
		}
	}

	fn counter() -> BridgeHandle {
		handle(Counter {
			members: vec!["value", "increment"],
			count: 0,
		})
	}

	#[test]
	fn unknown_member_fails() {
		let c = counter();
		let err = c.lock().unwrap().get_member("bogus").unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnknownMember);
	}

	#[test]
	fn function_handle_invokes_through_bridge() {
		let c = counter();
		let f = FunctionHandle::new(c.clone(), "increment");
		assert_eq!(f.invoke(&[]).unwrap().as_int().unwrap(), 1);
		assert_eq!(f.invoke(&[]).unwrap().as_int().unwrap(), 2);
		assert_eq!(c.lock().unwrap().get_member("value").unwrap().as_int().unwrap(), 2);
	}
}
