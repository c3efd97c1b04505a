//! Session & Resultset: the classic/X-Protocol session object and the
//! result-iteration contract every query returns through.

use crate::bridge::{handle, require_member, Bridge, BridgeHandle, FunctionHandle};
use crate::connstr::ConnectionString;
use crate::err::{Error, ErrorKind};
use crate::protocol::{ColumnMetadata, ProtocolConnector, Request, Response, ResultBlock};
use crate::router::Router;
use crate::schema::Schema;
use crate::value::Value;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, Weak};

/// Per-session timeouts and TLS mode, assembled from the parsed connection
/// string plus explicit overrides.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
	/// Milliseconds to wait for the initial connection.
	pub connect_timeout: Option<u64>,
	/// Milliseconds to wait for each request.
	pub socket_timeout: Option<u64>,
	/// One of the recognized SSL modes.
	pub ssl_mode: Option<String>,
}

/// The kind of session, driving its `class_name` and default port.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionKind {
	/// `mysqlx.getSession`.
	X,
	/// `mysqlx.getNodeSession`.
	Node,
	/// `mysql.getClassicSession`.
	Classic,
}

impl SessionKind {
	fn class_name(self) -> &'static str {
		match self {
			SessionKind::X => "XSession",
			SessionKind::Node => "NodeSession",
			SessionKind::Classic => "ClassicSession",
		}
	}
}

const SESSION_MEMBERS: &[&str] =
	&["sql", "sql_one", "close", "uri", "next_result", "getSchema", "getDefaultSchema"];

/// A live database session.
#[derive(Debug)]
pub struct Session {
	full_class_name: String,
	display_uri: String,
	default_schema: Option<String>,
	router: Option<Router>,
	closed: bool,
	open_results: Vec<Weak<Mutex<ResultSetState>>>,
	self_weak: Weak<Mutex<dyn Bridge>>,
}

impl Session {
	/// Opens a session using connector type `C`.
	///
	/// Built with [`Arc::new_cyclic`] so the session can hand schemas a weak
	/// reference to itself (`Schema` holds its session only weakly) without
	/// a second construction pass — the `Weak` from the cyclic closure is
	/// exactly the self-reference a child handle needs.
	pub fn connect<C>(
		kind: SessionKind,
		conn_str: ConnectionString,
		options: SessionOptions,
	) -> Result<BridgeHandle, Error>
	where
		C: ProtocolConnector,
	{
		let display_uri = format!("{}@{}:{}", conn_str.user.as_deref().unwrap_or(""), conn_str.host, conn_str.port);
		let default_schema = conn_str.schema.clone();
		let full_class_name = format!("{}:{display_uri}", kind.class_name());
		let connect_timeout = options.connect_timeout.map(std::time::Duration::from_millis);
		let socket_timeout = options.socket_timeout.map(std::time::Duration::from_millis);
		let router = Router::connect::<C>(conn_str, connect_timeout, socket_timeout)?;
		let session: Arc<Mutex<Session>> = Arc::new_cyclic(|weak| {
			Mutex::new(Session {
				full_class_name,
				display_uri,
				default_schema,
				router: Some(router),
				closed: false,
				open_results: Vec::new(),
				self_weak: weak.clone(),
			})
		});
		Ok(session)
	}

	fn schema_handle(&self, name: String) -> Value {
		Value::Object(Schema::new_handle(name, self.self_weak.clone()))
	}

	fn check_open(&self) -> Result<&Router, Error> {
		if self.closed {
			return Err(ErrorKind::SessionClosed.with_message("session is closed"));
		}
		self.router.as_ref().ok_or_else(|| {
			ErrorKind::ConnectionUninitialized.with_message("session has no underlying connection")
		})
	}

	/// Discards remaining rows of any still-open result sets. In strict mode
	/// (the shell's default) a new `sql()` call while a previous result is
	/// open fails `ResultLeak` instead of silently discarding rows.
	fn reject_if_result_leaked(&mut self, strict: bool) -> Result<(), Error> {
		self.open_results.retain(|weak| weak.strong_count() > 0);
		if strict {
			for weak in &self.open_results {
				if let Some(state) = weak.upgrade() {
					let guard = state.lock().unwrap();
					if !matches!(guard.phase, Phase::Closed) {
						return Err(ErrorKind::ResultLeak.with_message(
							"a previous result is still open; close it before issuing a new statement",
						));
					}
				}
			}
		}
		self.open_results.clear();
		Ok(())
	}

	fn execute_sql(
		&mut self,
		stmt: &str,
		params: &Value,
	) -> Result<BridgeHandle, Error> {
		Ok(self.execute_sql_with_state(stmt, params)?.0)
	}

	/// Same as [`Session::execute_sql`] but also returns the raw result-set
	/// state, so a caller that never exposes the result set as a script
	/// value (`sql_one`) can still close it directly.
	fn execute_sql_with_state(
		&mut self,
		stmt: &str,
		params: &Value,
	) -> Result<(BridgeHandle, Arc<Mutex<ResultSetState>>), Error> {
		self.reject_if_result_leaked(true)?;
		let (positional, named) = split_params(params)?;
		let router = self.check_open()?;
		let response = router.dispatch(Request::Execute {
			statement: stmt.to_string(),
			positional,
			named,
		})?;
		let blocks = match response {
			Response::Results(blocks) => blocks,
			Response::Closed => {
				return Err(ErrorKind::SessionClosed.with_message("session closed mid-request"))
			}
		};
		let state = Arc::new(Mutex::new(ResultSetState {
			blocks,
			block_index: 0,
			row_index: 0,
			fetched_row_count: 0,
			phase: Phase::NotStarted,
		}));
		self.open_results.push(Arc::downgrade(&state));
		Ok((handle(ResultSet { state: state.clone() }), state))
	}
}

fn split_params(params: &Value) -> Result<(Vec<Value>, IndexMap<String, Value>), Error> {
	match params {
		Value::Undefined | Value::Null => Ok((Vec::new(), IndexMap::new())),
		Value::Array(a) => Ok((a.lock().unwrap().clone(), IndexMap::new())),
		Value::Map(m) => Ok((Vec::new(), m.lock().unwrap().clone())),
		other => Err(ErrorKind::ArgumentError
			.with_message(format!("params must be an Array or Map, got {}", other.type_name()))),
	}
}

impl Bridge for Session {
	fn class_name(&self) -> &str {
		&self.full_class_name
	}

	fn members(&self) -> &[&str] {
		SESSION_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"uri" => Ok(Value::String(self.display_uri.clone())),
			_ => Ok(Value::Undefined),
		}
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"sql" => {
				if args.is_empty() || args.len() > 2 {
					return Err(Error::arity("Session.sql", 1, 2, args.len()));
				}
				let stmt = args[0]
					.as_string()
					.map_err(|_| Error::argument_kind(1, "string"))?
					.to_string();
				let params = args.get(1).cloned().unwrap_or(Value::Undefined);
				let rs = self.execute_sql(&stmt, &params)?;
				Ok(Value::Object(rs))
			}
			"sql_one" => {
				if args.is_empty() || args.len() > 2 {
					return Err(Error::arity("Session.sql_one", 1, 2, args.len()));
				}
				let stmt = args[0]
					.as_string()
					.map_err(|_| Error::argument_kind(1, "string"))?
					.to_string();
				let params = args.get(1).cloned().unwrap_or(Value::Undefined);
				let (rs, state) = self.execute_sql_with_state(&stmt, &params)?;
				let first = {
					let mut guard = rs.lock().unwrap();
					guard.call("next", &[])?
				};
				let second = {
					let mut guard = rs.lock().unwrap();
					guard.call("next", &[])?
				};
				if !matches!(second, Value::Null) {
					return Err(ErrorKind::ResultShapeError
						.with_message("sql_one observed more than one row"));
				}
				// Closes the result directly: `close` is not a script-visible
				// ResultSet member, so this can't go through `Bridge::call`.
				state.lock().unwrap().phase = Phase::Closed;
				Ok(first)
			}
			"close" => {
				if !self.closed {
					self.closed = true;
					if let Some(router) = self.router.take() {
						let _res = router.dispatch(Request::Close);
					}
				}
				Ok(Value::Undefined)
			}
			"next_result" => {
				if args.len() != 1 {
					return Err(Error::arity("Session.next_result", 1, 1, args.len()));
				}
				let object = args[0]
					.as_object()
					.map_err(|_| Error::argument_kind(1, "object"))?;
				let mut guard = object.lock().unwrap();
				guard.call("nextResult", &[])
			}
			"getSchema" => {
				if args.len() != 1 {
					return Err(Error::arity("Session.getSchema", 1, 1, args.len()));
				}
				let name = args[0].as_string().map_err(|_| Error::argument_kind(1, "string"))?.to_string();
				Ok(self.schema_handle(name))
			}
			"getDefaultSchema" => {
				if !args.is_empty() {
					return Err(Error::arity("Session.getDefaultSchema", 0, 0, args.len()));
				}
				match self.default_schema.clone() {
					Some(name) => Ok(self.schema_handle(name)),
					None => Ok(Value::Null),
				}
			}
			_ => unreachable!("require_member already validated name"),
		}
	}
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Phase {
	NotStarted,
	Reading,
	BetweenResults,
	Closed,
}

#[derive(Debug)]
struct ResultSetState {
	blocks: Vec<ResultBlock>,
	block_index: usize,
	row_index: usize,
	fetched_row_count: u64,
	phase: Phase,
}

/// A cursor over zero or more result blocks.
#[derive(Debug)]
pub struct ResultSet {
	state: Arc<Mutex<ResultSetState>>,
}

const RESULT_SET_MEMBERS: &[&str] = &[
	"affected_rows",
	"warning_count",
	"fetched_row_count",
	"next",
	"all",
	"nextResult",
	"getColumnMetadata",
];

impl ResultSet {
	fn current_block(state: &ResultSetState) -> Option<&ResultBlock> {
		state.blocks.get(state.block_index)
	}
}

impl Bridge for ResultSet {
	fn class_name(&self) -> &str {
		"Result"
	}

	fn members(&self) -> &[&str] {
		RESULT_SET_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		let state = self.state.lock().unwrap();
		match name {
			"affected_rows" => Ok(Value::UInteger(
				Self::current_block(&state).map(|b| b.affected_rows).unwrap_or(0),
			)),
			"warning_count" => Ok(Value::UInteger(
				Self::current_block(&state).map(|b| b.warning_count).unwrap_or(0),
			)),
			"fetched_row_count" => Ok(Value::UInteger(state.fetched_row_count)),
			_ => Ok(Value::Undefined),
		}
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		let mut state = self.state.lock().unwrap();
		match name {
			"next" => {
				let raw = match args.first() {
					None => false,
					Some(v) => v.as_bool().map_err(|_| Error::argument_kind(1, "bool"))?,
				};
				state.phase = Phase::Reading;
				let Some(block) = state.blocks.get(state.block_index) else {
					return Ok(Value::Null);
				};
				let Some(row) = block.rows.get(state.row_index).cloned() else {
					return Ok(Value::Null);
				};
				state.row_index += 1;
				state.fetched_row_count += 1;
				if raw {
					Ok(Value::array_from(row))
				} else {
					let columns = block.columns.clone();
					Ok(Value::map_from(
						columns.into_iter().map(|c| c.name).zip(row),
					))
				}
			}
			"all" => {
				let raw = match args.first() {
					None => false,
					Some(v) => v.as_bool().map_err(|_| Error::argument_kind(1, "bool"))?,
				};
				let mut out = Vec::new();
				loop {
					let Some(block) = state.blocks.get(state.block_index) else {
						break;
					};
					let Some(row) = block.rows.get(state.row_index).cloned() else {
						break;
					};
					state.row_index += 1;
					state.fetched_row_count += 1;
					if raw {
						out.push(Value::array_from(row));
					} else {
						let columns = block.columns.clone();
						out.push(Value::map_from(columns.into_iter().map(|c| c.name).zip(row)));
					}
				}
				Ok(Value::array_from(out))
			}
			"nextResult" => {
				if state.block_index + 1 >= state.blocks.len() {
					state.phase = Phase::Closed;
					return Ok(Value::Bool(false));
				}
				state.block_index += 1;
				state.row_index = 0;
				state.phase = Phase::BetweenResults;
				Ok(Value::Bool(true))
			}
			"getColumnMetadata" => {
				let columns: Vec<ColumnMetadata> =
					Self::current_block(&state).map(|b| b.columns.clone()).unwrap_or_default();
				Ok(Value::array_from(columns.iter().map(ColumnMetadata::to_value)))
			}
			_ => unreachable!("require_member already validated name"),
		}
	}
}

/// A callable bound to a [`ResultSet`] member, for adapters that want a
/// first-class `Function` value rather than routing through `call` directly.
pub fn resultset_function(handle: BridgeHandle, member: &str) -> FunctionHandle {
	FunctionHandle::new(handle, member)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::ColumnMetadata;

	fn sample_column(name: &str) -> ColumnMetadata {
		ColumnMetadata {
			catalog: "def".into(),
			db: "shell_tests".into(),
			table: "alpha".into(),
			org_table: "alpha".into(),
			name: name.into(),
			org_name: name.into(),
			charset: "utf8mb4".into(),
			length: 20,
			column_type: "VARCHAR".into(),
			flags: 0,
			decimal: 0,
		}
	}

	fn sample_resultset() -> ResultSet {
		ResultSet {
			state: Arc::new(Mutex::new(ResultSetState {
				blocks: vec![ResultBlock {
					columns: vec![sample_column("idalpha"), sample_column("alphacol")],
					rows: vec![
						vec![Value::Integer(1), Value::String("first".into())],
						vec![Value::Integer(2), Value::String("second".into())],
						vec![Value::Integer(3), Value::String("third".into())],
					],
					affected_rows: 0,
					warning_count: 0,
				}],
				block_index: 0,
				row_index: 0,
				fetched_row_count: 0,
				phase: Phase::NotStarted,
			})),
		}
	}

	#[test]
	fn next_then_raw_then_null_past_end() {
		let mut rs = sample_resultset();
		let first = rs.call("next", &[]).unwrap();
		assert_eq!(first.as_map().unwrap().lock().unwrap().get("idalpha").unwrap().as_int().unwrap(), 1);
		let second = rs.call("next", &[Value::Bool(false)]).unwrap();
		assert!(matches!(second, Value::Map(_)));
		let third = rs.call("next", &[Value::Bool(true)]).unwrap();
		assert!(matches!(third, Value::Array(_)));
		let fourth = rs.call("next", &[Value::Bool(true)]).unwrap();
		assert!(matches!(fourth, Value::Null));
		assert_eq!(rs.get_member("fetched_row_count").unwrap().as_uint().unwrap(), 3);
	}

	#[test]
	fn all_returns_remaining_rows() {
		let mut rs = sample_resultset();
		let all = rs.call("all", &[]).unwrap();
		assert_eq!(all.as_array().unwrap().lock().unwrap().len(), 3);
		assert_eq!(rs.get_member("fetched_row_count").unwrap().as_uint().unwrap(), 3);
	}

	#[test]
	fn next_result_false_when_single_block() {
		let mut rs = sample_resultset();
		let has_more = rs.call("nextResult", &[]).unwrap();
		assert!(matches!(has_more, Value::Bool(false)));
	}

	#[test]
	fn column_metadata_has_exactly_eleven_keys() {
		let mut rs = sample_resultset();
		let meta = rs.call("getColumnMetadata", &[]).unwrap();
		let arr = meta.as_array().unwrap();
		let guard = arr.lock().unwrap();
		assert_eq!(guard.len(), 2);
		let first = guard[0].as_map().unwrap().lock().unwrap();
		assert_eq!(first.len(), 11);
	}
}
