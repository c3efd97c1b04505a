//! The seam between this crate and an external wire-protocol library.
//!
//! MySQL/X-Protocol wire framing is treated as an external collaborator
//! this crate never implements itself; [`ProtocolConnector`] is the trait
//! such a library implements — one connection trait abstracting over
//! whichever concrete wire backend is plugged in, the same shape a client
//! uses to abstract over multiple transport backends.

use crate::connstr::ConnectionString;
use crate::err::Error;
use crate::value::Value;
use async_trait::async_trait;
use indexmap::IndexMap;

/// One column's metadata, exactly the 11 keys a result set's column
/// descriptor carries.
#[derive(Debug, Clone)]
pub struct ColumnMetadata {
	pub catalog: String,
	pub db: String,
	pub table: String,
	pub org_table: String,
	pub name: String,
	pub org_name: String,
	pub charset: String,
	pub length: u32,
	pub column_type: String,
	pub flags: u32,
	pub decimal: u32,
}

impl ColumnMetadata {
	/// Renders this metadata as a [`Value::Map`] with exactly these 11 keys
	/// — no more, no less.
	pub fn to_value(&self) -> Value {
		Value::map_from([
			("catalog".to_string(), Value::String(self.catalog.clone())),
			("db".to_string(), Value::String(self.db.clone())),
			("table".to_string(), Value::String(self.table.clone())),
			("org_table".to_string(), Value::String(self.org_table.clone())),
			("name".to_string(), Value::String(self.name.clone())),
			("org_name".to_string(), Value::String(self.org_name.clone())),
			("charset".to_string(), Value::String(self.charset.clone())),
			("length".to_string(), Value::UInteger(self.length as u64)),
			("type".to_string(), Value::String(self.column_type.clone())),
			("flags".to_string(), Value::UInteger(self.flags as u64)),
			("decimal".to_string(), Value::UInteger(self.decimal as u64)),
		])
	}
}

/// One block of a (possibly multi-statement) result.
#[derive(Debug, Clone, Default)]
pub struct ResultBlock {
	pub columns: Vec<ColumnMetadata>,
	pub rows: Vec<Vec<Value>>,
	pub affected_rows: u64,
	pub warning_count: u64,
}

/// A request sent to the background router.
#[derive(Debug, Clone)]
pub enum Request {
	/// Execute a statement, with positional or named parameters.
	Execute {
		statement: String,
		positional: Vec<Value>,
		named: IndexMap<String, Value>,
	},
	/// Close the underlying connection.
	Close,
}

/// A response received from the background router.
#[derive(Debug)]
pub enum Response {
	/// The statement produced one or more result blocks.
	Results(Vec<ResultBlock>),
	/// The connection closed.
	Closed,
}

/// Implemented by an external wire-protocol library to plug into a
/// [`crate::router::Router`].
///
/// One connector instance owns exactly one live connection; `execute` blocks
/// the caller until the protocol library returns a response or signals an
/// error — a bridge call never suspends, so this is exactly where the
/// blocking has to live.
#[async_trait]
pub trait ProtocolConnector: Send + 'static {
	/// Opens a connection described by `conn_str`.
	async fn connect(conn_str: &ConnectionString) -> Result<Self, Error>
	where
		Self: Sized;

	/// Executes one request and returns its response.
	async fn execute(&mut self, request: Request) -> Result<Response, Error>;
}
