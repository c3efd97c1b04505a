//! The top-level `mysql` and `mysqlx` modules: the entry points a script
//! runtime installs as globals, each generic over the connector type every
//! adapter constructs sessions against.

use crate::bridge::{handle, require_member, Bridge, BridgeHandle};
use crate::connstr::{ConnectionString, Protocol};
use crate::err::Error;
use crate::expr::Expression;
use crate::protocol::ProtocolConnector;
use crate::session::{Session, SessionKind, SessionOptions};
use crate::value::Value;
use std::fmt;
use std::marker::PhantomData;

/// Parses `uri` (a connection string, or a dictionary of connection
/// fields), folds in an explicit `password` argument if the call supplied
/// one, and opens a session of the given `kind`/`protocol`.
fn get_session<C>(kind: SessionKind, protocol: Protocol, args: &[Value]) -> Result<Value, Error>
where
	C: ProtocolConnector,
{
	if args.is_empty() || args.len() > 2 {
		return Err(Error::arity("getSession", 1, 2, args.len()));
	}
	let mut conn_str = match &args[0] {
		Value::Map(fields) => ConnectionString::from_fields(&fields.lock().unwrap(), protocol)?,
		other => {
			let uri = other.as_string().map_err(|_| Error::argument_kind(1, "string or dictionary"))?;
			ConnectionString::parse(uri, protocol)?
		}
	};
	if let Some(password) = args.get(1) {
		conn_str.password = Some(password.as_string().map_err(|_| Error::argument_kind(2, "string"))?.to_string());
		conn_str.password_found = true;
	}
	let session = Session::connect::<C>(kind, conn_str, SessionOptions::default())?;
	Ok(Value::Object(session))
}

const MYSQL_MEMBERS: &[&str] = &["getClassicSession", "help"];

/// The `mysql` module: classic-protocol session factory.
pub struct MysqlModule<C> {
	_connector: PhantomData<fn() -> C>,
}

impl<C> fmt::Debug for MysqlModule<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MysqlModule").finish()
	}
}

impl<C: ProtocolConnector> MysqlModule<C> {
	/// Builds the `mysql` module handle.
	pub fn new_handle() -> BridgeHandle {
		handle(MysqlModule { _connector: PhantomData })
	}
}

impl<C: ProtocolConnector> Bridge for MysqlModule<C> {
	fn class_name(&self) -> &str {
		"mysql"
	}

	fn members(&self) -> &[&str] {
		MYSQL_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"getClassicSession" => get_session::<C>(SessionKind::Classic, Protocol::Classic, args),
			"help" => Ok(Value::String("mysql: classic MySQL protocol sessions.".to_string())),
			_ => unreachable!("require_member already validated name"),
		}
	}
}

const MYSQLX_MEMBERS: &[&str] = &["getSession", "getNodeSession", "expr"];

/// The `mysqlx` module: X Protocol session factory and the `expr()`
/// literal constructor.
pub struct MysqlxModule<C> {
	_connector: PhantomData<fn() -> C>,
}

impl<C> fmt::Debug for MysqlxModule<C> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("MysqlxModule").finish()
	}
}

impl<C: ProtocolConnector> MysqlxModule<C> {
	/// Builds the `mysqlx` module handle.
	pub fn new_handle() -> BridgeHandle {
		handle(MysqlxModule { _connector: PhantomData })
	}
}

impl<C: ProtocolConnector> Bridge for MysqlxModule<C> {
	fn class_name(&self) -> &str {
		"mysqlx"
	}

	fn members(&self) -> &[&str] {
		MYSQLX_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"getSession" => get_session::<C>(SessionKind::X, Protocol::X, args),
			"getNodeSession" => get_session::<C>(SessionKind::Node, Protocol::X, args),
			"expr" => {
				if args.len() != 1 {
					return Err(Error::arity("mysqlx.expr", 1, 1, args.len()));
				}
				let text = args[0].as_string().map_err(|_| Error::argument_kind(1, "string"))?;
				Ok(Value::Object(Expression::new_handle(text)))
			}
			_ => unreachable!("require_member already validated name"),
		}
	}
}

/// The `(name, handle)` pairs an adapter installs as global bindings:
/// `mysql`, `mysqlx` and `dba`, in that order.
pub fn standard_modules<C: ProtocolConnector>() -> Vec<(&'static str, BridgeHandle)> {
	vec![
		("mysql", MysqlModule::<C>::new_handle()),
		("mysqlx", MysqlxModule::<C>::new_handle()),
		("dba", crate::cluster::Dba::new_handle()),
	]
}

#[cfg(test)]
mod tests {
	use super::*;
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
	fn mysqlx_expr_wraps_payload() {
		let mut module = MysqlxModule::<StubConnector> { _connector: PhantomData };
		let result = module.call("expr", &[Value::String("1+1".into())]).unwrap();
		assert_eq!(result.descr(), "<Expression>");
	}

	#[test]
	fn get_classic_session_opens_session_with_expected_uri() {
		let mut module = MysqlModule::<StubConnector> { _connector: PhantomData };
		let result = module
			.call("getClassicSession", &[Value::String("root@localhost:3306".into())])
			.unwrap();
		let session = result.as_object().unwrap();
		let uri = session.lock().unwrap().get_member("uri").unwrap();
		assert_eq!(uri.as_string().unwrap(), "root@localhost:3306");
	}

	#[test]
	fn get_classic_session_accepts_a_connection_dictionary() {
		let mut module = MysqlModule::<StubConnector> { _connector: PhantomData };
		let dict = Value::map_from([
			("host".to_string(), Value::String("localhost".into())),
			("user".to_string(), Value::String("root".into())),
			("port".to_string(), Value::UInteger(3306)),
		]);
		let result = module.call("getClassicSession", &[dict]).unwrap();
		let session = result.as_object().unwrap();
		let uri = session.lock().unwrap().get_member("uri").unwrap();
		assert_eq!(uri.as_string().unwrap(), "root@localhost:3306");
	}

	#[test]
	fn get_session_dictionary_honors_trailing_password_argument() {
		let mut module = MysqlxModule::<StubConnector> { _connector: PhantomData };
		let dict = Value::map_from([("host".to_string(), Value::String("localhost".into()))]);
		let result = module.call("getSession", &[dict, Value::String("s3cr3t".into())]).unwrap();
		assert!(matches!(result, Value::Object(_)));
	}

	#[test]
	fn explicit_password_argument_overrides_uri() {
		let mut module = MysqlxModule::<StubConnector> { _connector: PhantomData };
		let result = module
			.call("getSession", &[Value::String("root@localhost".into()), Value::String("s3cr3t".into())])
			.unwrap();
		assert!(matches!(result, Value::Object(_)));
	}

	#[test]
	fn standard_modules_installs_mysql_mysqlx_and_dba() {
		let modules = standard_modules::<StubConnector>();
		let names: Vec<&str> = modules.iter().map(|(name, _)| *name).collect();
		assert_eq!(names, vec!["mysql", "mysqlx", "dba"]);
	}
}
