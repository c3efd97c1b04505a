//! End-to-end exercises of a [`shellcore::session::Session`] against an
//! in-process [`ProtocolConnector`] test double.
//!
//! The mock connector below plays the role of a real MySQL server: it
//! understands just enough of the SQL text a query sends to hand back a
//! canned [`ResultBlock`], so the session/result-set contract can be
//! exercised without a real server.

use async_trait::async_trait;
use shellcore::connstr::{ConnectionString, Protocol};
use shellcore::protocol::{ColumnMetadata, ProtocolConnector, Request, Response, ResultBlock};
use shellcore::session::{Session, SessionKind, SessionOptions};
use shellcore::value::Value;
use shellcore::Error;

fn column(name: &str) -> ColumnMetadata {
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

struct MockConnector {
	drop_calls: u32,
}

#[async_trait]
impl ProtocolConnector for MockConnector {
	async fn connect(_conn_str: &ConnectionString) -> Result<Self, Error> {
		Ok(MockConnector { drop_calls: 0 })
	}

	async fn execute(&mut self, request: Request) -> Result<Response, Error> {
		let Request::Execute { statement, .. } = request else {
			return Ok(Response::Closed);
		};
		let stmt = statement.to_lowercase();

		if stmt.contains("select 1 as sample") {
			return Ok(Response::Results(vec![ResultBlock {
				columns: vec![column("sample")],
				rows: vec![vec![Value::Integer(1)]],
				affected_rows: 0,
				warning_count: 0,
			}]));
		}
		if stmt.contains("show databases") {
			return Ok(Response::Results(vec![ResultBlock {
				columns: vec![column("Database")],
				rows: vec![vec![Value::String("shell_tests".into())]],
				affected_rows: 0,
				warning_count: 0,
			}]));
		}
		if stmt.contains("create schema") {
			return Ok(Response::Results(vec![ResultBlock {
				affected_rows: 1,
				..Default::default()
			}]));
		}
		if stmt.contains("drop schema") {
			self.drop_calls += 1;
			return Ok(Response::Results(vec![ResultBlock {
				affected_rows: 0,
				..Default::default()
			}]));
		}
		if stmt.contains("insert into") {
			return Ok(Response::Results(vec![ResultBlock {
				affected_rows: 3,
				..Default::default()
			}]));
		}
		if stmt.contains("select * from") || stmt.contains("select idalpha") {
			return Ok(Response::Results(vec![ResultBlock {
				columns: vec![column("idalpha"), column("alphacol")],
				rows: vec![
					vec![Value::Integer(1), Value::String("first".into())],
					vec![Value::Integer(2), Value::String("second".into())],
					vec![Value::Integer(3), Value::String("third".into())],
				],
				affected_rows: 0,
				warning_count: 0,
			}]));
		}
		Ok(Response::Results(vec![ResultBlock::default()]))
	}
}

fn classic_session() -> shellcore::bridge::BridgeHandle {
	let _ = tracing_subscriber::fmt().try_init();
	let conn_str = ConnectionString::parse("root@localhost:3306/shell_tests", Protocol::Classic).unwrap();
	Session::connect::<MockConnector>(SessionKind::Classic, conn_str, SessionOptions::default()).unwrap()
}

fn call(session: &shellcore::bridge::BridgeHandle, name: &str, args: &[Value]) -> Value {
	session.lock().unwrap().call(name, args).unwrap()
}

#[test]
fn sql_one_returns_single_row_map() {
	let session = classic_session();
	let row = call(&session, "sql_one", &[Value::String("select 1 as sample".into())]);
	assert_eq!(row.descr(), r#"{"sample": 1}"#);
}

#[test]
fn next_result_false_after_single_block() {
	let session = classic_session();
	let rs = call(&session, "sql", &[Value::String("show databases".into())]);
	let rs_handle = rs.as_object().unwrap().clone();
	let has_more = rs_handle.lock().unwrap().call("nextResult", &[]).unwrap();
	assert!(matches!(has_more, Value::Bool(false)));
}

#[test]
fn create_schema_reports_one_affected_row() {
	let session = classic_session();
	let rs = call(&session, "sql", &[Value::String("create schema shell_tests".into())]);
	let rs_handle = rs.as_object().unwrap();
	let affected = rs_handle.lock().unwrap().get_member("affected_rows").unwrap();
	assert_eq!(affected.as_uint().unwrap(), 1);
}

#[test]
fn drop_schema_if_exists_is_idempotent() {
	let session = classic_session();
	for _ in 0..2 {
		let rs = call(&session, "sql", &[Value::String("drop schema if exists shell_tests".into())]);
		let rs_handle = rs.as_object().unwrap();
		let affected = rs_handle.lock().unwrap().get_member("affected_rows").unwrap();
		assert_eq!(affected.as_uint().unwrap(), 0);
	}
}

#[test]
fn next_raw_toggle_and_fetched_row_count_progression() {
	let session = classic_session();
	let rs = call(&session, "sql", &[Value::String("select idalpha, alphacol from alpha".into())]);
	let rs_handle = rs.as_object().unwrap();

	let first = rs_handle.lock().unwrap().call("next", &[]).unwrap();
	assert_eq!(first.descr(), r#"{"alphacol": "first", "idalpha": 1}"#);
	assert_eq!(rs_handle.lock().unwrap().get_member("fetched_row_count").unwrap().as_uint().unwrap(), 1);

	let second = rs_handle.lock().unwrap().call("next", &[Value::Bool(false)]).unwrap();
	assert_eq!(second.descr(), r#"{"alphacol": "second", "idalpha": 2}"#);
	assert_eq!(rs_handle.lock().unwrap().get_member("fetched_row_count").unwrap().as_uint().unwrap(), 2);

	let third = rs_handle.lock().unwrap().call("next", &[Value::Bool(true)]).unwrap();
	assert_eq!(third.descr(), r#"[3, "third"]"#);
	assert_eq!(rs_handle.lock().unwrap().get_member("fetched_row_count").unwrap().as_uint().unwrap(), 3);

	let fourth = rs_handle.lock().unwrap().call("next", &[Value::Bool(true)]).unwrap();
	assert!(matches!(fourth, Value::Null));
	assert_eq!(rs_handle.lock().unwrap().get_member("fetched_row_count").unwrap().as_uint().unwrap(), 3);
}

#[test]
fn all_returns_remaining_rows_as_array() {
	let session = classic_session();
	let rs = call(&session, "sql", &[Value::String("select idalpha, alphacol from alpha".into())]);
	let rs_handle = rs.as_object().unwrap();
	let all = rs_handle.lock().unwrap().call("all", &[]).unwrap();
	assert_eq!(all.as_array().unwrap().lock().unwrap().len(), 3);
	assert_eq!(rs_handle.lock().unwrap().get_member("fetched_row_count").unwrap().as_uint().unwrap(), 3);
}

#[test]
fn column_metadata_has_exactly_the_eleven_keys() {
	let session = classic_session();
	let rs = call(&session, "sql", &[Value::String("select idalpha, alphacol from alpha".into())]);
	let rs_handle = rs.as_object().unwrap();
	let metadata = rs_handle.lock().unwrap().call("getColumnMetadata", &[]).unwrap();
	let arr = metadata.as_array().unwrap();
	let guard = arr.lock().unwrap();
	assert_eq!(guard.len(), 2);
	for entry in guard.iter() {
		assert_eq!(entry.as_map().unwrap().lock().unwrap().len(), 11);
	}
}

#[test]
fn session_close_is_idempotent_and_blocks_further_use() {
	let session = classic_session();
	call(&session, "close", &[]);
	call(&session, "close", &[]);
	let err = session.lock().unwrap().call("sql", &[Value::String("select 1".into())]).unwrap_err();
	assert_eq!(err.kind(), shellcore::ErrorKind::SessionClosed);
}

#[test]
fn sql_one_closes_its_result_so_a_further_sql_call_does_not_leak() {
	let session = classic_session();
	call(&session, "sql_one", &[Value::String("select 1 as sample".into())]);
	let rs = call(&session, "sql", &[Value::String("select 1 as sample".into())]);
	assert!(matches!(rs, Value::Object(_)));
}

#[test]
fn uri_member_strips_password() {
	let conn_str = ConnectionString::parse("root:hunter2@localhost:3306", Protocol::Classic).unwrap();
	let session = Session::connect::<MockConnector>(SessionKind::Classic, conn_str, SessionOptions::default()).unwrap();
	let uri = session.lock().unwrap().get_member("uri").unwrap();
	assert_eq!(uri.as_string().unwrap(), "root@localhost:3306");
}

#[tokio::test]
async fn mock_connector_satisfies_protocol_connector_directly() {
	let conn_str = ConnectionString::parse("root@localhost", Protocol::Classic).unwrap();
	let mut connector = MockConnector::connect(&conn_str).await.unwrap();
	let response = connector
		.execute(Request::Execute {
			statement: "select 1 as sample".into(),
			positional: Vec::new(),
			named: Default::default(),
		})
		.await
		.unwrap();
	assert!(matches!(response, Response::Results(blocks) if blocks.len() == 1));
}
