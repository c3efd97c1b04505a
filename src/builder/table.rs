//! Table CRUD builders (`select`, `insert`, `update`, `delete`) over a
//! classic relational table, reached from `Schema.getTable(name)`.

use crate::bridge::{handle, require_member, Bridge, BridgeHandle};
use crate::builder::{BindState, ChainSpec, ChainState};
use crate::err::{Error, ErrorKind};
use crate::value::Value;
use std::sync::{Mutex, Weak};

static SELECT_SPEC: ChainSpec = ChainSpec {
	initial: &["where", "orderBy", "limit", "bind", "execute"],
	repeatable: &["bind"],
	unlocks: &[],
	terminal: "execute",
};

static INSERT_SPEC: ChainSpec = ChainSpec {
	initial: &["values", "bind", "execute"],
	repeatable: &["values", "bind"],
	unlocks: &[],
	terminal: "execute",
};

static UPDATE_SPEC: ChainSpec = ChainSpec {
	initial: &["set"],
	repeatable: &["set", "bind"],
	unlocks: &[
		("set", &["set", "where", "bind", "execute"]),
		("where", &["orderBy", "bind"]),
		("orderBy", &["limit", "bind"]),
	],
	terminal: "execute",
};

static DELETE_SPEC: ChainSpec = ChainSpec {
	initial: &["where", "orderBy", "limit", "bind", "execute"],
	repeatable: &["bind"],
	unlocks: &[],
	terminal: "execute",
};

/// A relational table reached from a schema; the originating object for
/// every table-level CRUD chain.
#[derive(Clone, Debug)]
pub struct Table {
	pub(crate) schema: String,
	pub(crate) name: String,
	pub(crate) session: Weak<Mutex<dyn Bridge>>,
}

impl Table {
	/// Constructs a handle to `name` within `schema`, holding the session
	/// only weakly, mirroring [`crate::builder::collection::Collection`].
	pub fn new(schema: impl Into<String>, name: impl Into<String>, session: Weak<Mutex<dyn Bridge>>) -> Self {
		Table {
			schema: schema.into(),
			name: name.into(),
			session,
		}
	}

	fn dispatch_sql(&self, stmt: String, binds: &BindState) -> Result<Value, Error> {
		let session = self.session.upgrade().ok_or_else(|| {
			ErrorKind::SessionClosed.with_message("the session backing this table has been closed")
		})?;
		let params = Value::map_from(binds.bound().iter().map(|(k, v)| (k.clone(), v.clone())));
		let mut guard = session.lock().unwrap();
		guard.call("sql", &[Value::String(stmt), params])
	}
}

/// Unlike Update's terminal, `execute` needs to be reachable even when
/// `where`/`orderBy`/`limit` were never called — it is always unlocked
/// alongside the methods that gate it. Table chain specs add it to every
/// state's `initial`/`unlocks` set except where noted above; `Update`
/// exposes it indirectly through the `set`/`where`/`orderBy` unlock chain
/// so the legal call order (`set`+ → `where` → `orderBy` → `limit`) is
/// preserved, with `execute` legal from the first `set` onward.
const UPDATE_EXECUTE_UNLOCK: &str = "execute";

/// `Table.select()`'s builder state.
#[derive(Debug)]
pub struct Select {
	table: Table,
	state: ChainState,
	binds: BindState,
	filter: Option<String>,
	order_by: Vec<String>,
	limit: Option<u64>,
}

const SELECT_MEMBERS: &[&str] = &["where", "orderBy", "limit", "bind", "execute"];

impl Select {
	/// Starts a `select` chain over `table`.
	pub fn new(table: Table) -> BridgeHandle {
		handle(Select {
			table,
			state: ChainState::new(&SELECT_SPEC),
			binds: BindState::default(),
			filter: None,
			order_by: Vec::new(),
			limit: None,
		})
	}
}

impl Bridge for Select {
	fn class_name(&self) -> &str {
		"TableSelect"
	}

	fn members(&self) -> &[&str] {
		SELECT_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		let legal = SELECT_MEMBERS
			.iter()
			.find(|m| **m == name)
			.copied()
			.ok_or_else(|| ErrorKind::UnknownMember.with_message(format!("{} has no member '{name}'", self.class_name())))?;
		self.state.advance(self.class_name(), legal)?;
		match legal {
			"where" => {
				let clause = args.first().ok_or_else(|| Error::arity("TableSelect.where", 1, 1, 0))?.as_string()?.to_string();
				self.binds.declare_from(&clause);
				self.filter = Some(clause);
				Ok(Value::Undefined)
			}
			"orderBy" => {
				self.order_by = args.iter().map(|v| v.as_string().map(str::to_string)).collect::<Result<_, _>>()?;
				Ok(Value::Undefined)
			}
			"limit" => {
				self.limit = Some(args.first().ok_or_else(|| Error::arity("TableSelect.limit", 1, 1, 0))?.as_uint()?);
				Ok(Value::Undefined)
			}
			"bind" => {
				if args.len() != 2 {
					return Err(Error::arity("TableSelect.bind", 2, 2, args.len()));
				}
				self.binds.bind(args[0].as_string()?.to_string(), args[1].clone());
				Ok(Value::Undefined)
			}
			"execute" => {
				self.binds.check_all_bound()?;
				let mut sql = format!("SELECT * FROM `{}`.`{}`", self.table.schema, self.table.name);
				if let Some(f) = &self.filter {
					sql.push_str(&format!(" WHERE {f}"));
				}
				if !self.order_by.is_empty() {
					sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
				}
				if let Some(l) = self.limit {
					sql.push_str(&format!(" LIMIT {l}"));
				}
				self.table.dispatch_sql(sql, &self.binds)
			}
			_ => unreachable!(),
		}
	}
}

/// `Table.insert(col-list)`'s builder state; expects `values(row)` next.
#[derive(Debug)]
pub struct Insert {
	table: Table,
	state: ChainState,
	binds: BindState,
	columns: Vec<String>,
	rows: Vec<Vec<Value>>,
}

const INSERT_MEMBERS: &[&str] = &["values", "bind", "execute"];

impl Insert {
	/// Starts an `insert` chain over `table` with the given column list.
	pub fn new(table: Table, columns: Vec<String>) -> BridgeHandle {
		handle(Insert {
			table,
			state: ChainState::new(&INSERT_SPEC),
			binds: BindState::default(),
			columns,
			rows: Vec::new(),
		})
	}
}

impl Bridge for Insert {
	fn class_name(&self) -> &str {
		"TableInsert"
	}

	fn members(&self) -> &[&str] {
		INSERT_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		let legal = INSERT_MEMBERS
			.iter()
			.find(|m| **m == name)
			.copied()
			.ok_or_else(|| ErrorKind::UnknownMember.with_message(format!("{} has no member '{name}'", self.class_name())))?;
		self.state.advance(self.class_name(), legal)?;
		match legal {
			"values" => {
				if args.len() != self.columns.len() {
					return Err(Error::arity("TableInsert.values", self.columns.len(), self.columns.len(), args.len()));
				}
				self.rows.push(args.to_vec());
				Ok(Value::Undefined)
			}
			"bind" => {
				if args.len() != 2 {
					return Err(Error::arity("TableInsert.bind", 2, 2, args.len()));
				}
				self.binds.bind(args[0].as_string()?.to_string(), args[1].clone());
				Ok(Value::Undefined)
			}
			"execute" => {
				self.binds.check_all_bound()?;
				if self.rows.is_empty() {
					return Err(ErrorKind::ArgumentError.with_message("TableInsert.execute: no rows were supplied via values()"));
				}
				let cols = self.columns.join(", ");
				let rows = self
					.rows
					.iter()
					.map(|row| format!("({})", row.iter().map(Value::descr).collect::<Vec<_>>().join(", ")))
					.collect::<Vec<_>>()
					.join(", ");
				let sql = format!("INSERT INTO `{}`.`{}` ({cols}) VALUES {rows}", self.table.schema, self.table.name);
				self.table.dispatch_sql(sql, &self.binds)
			}
			_ => unreachable!(),
		}
	}
}

/// `Table.update()`'s builder state: `set(col, expr)` repeated, then
/// `where`, then `orderBy`, then `limit`.
#[derive(Debug)]
pub struct Update {
	table: Table,
	state: ChainState,
	binds: BindState,
	assignments: Vec<(String, Value)>,
	filter: Option<String>,
	order_by: Vec<String>,
	limit: Option<u64>,
}

const UPDATE_MEMBERS: &[&str] = &["set", "where", "orderBy", "limit", "bind", "execute"];

impl Update {
	/// Starts an `update` chain over `table`.
	pub fn new(table: Table) -> BridgeHandle {
		handle(Update {
			table,
			state: ChainState::new(&UPDATE_SPEC),
			binds: BindState::default(),
			assignments: Vec::new(),
			filter: None,
			order_by: Vec::new(),
			limit: None,
		})
	}
}

impl Bridge for Update {
	fn class_name(&self) -> &str {
		"TableUpdate"
	}

	fn members(&self) -> &[&str] {
		UPDATE_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		let legal = UPDATE_MEMBERS
			.iter()
			.find(|m| **m == name)
			.copied()
			.ok_or_else(|| ErrorKind::UnknownMember.with_message(format!("{} has no member '{name}'", self.class_name())))?;
		// `execute` is reachable as soon as at least one `set` has run; the
		// chain spec only gates it behind `set`/`where`/`orderBy` for the
		// *later* clauses, so unlock it explicitly here rather than wiring
		// a synthetic no-op gate into `UPDATE_SPEC`.
		if legal == UPDATE_EXECUTE_UNLOCK && self.assignments.is_empty() {
			return Err(ErrorKind::UnknownMember
				.with_message("TableUpdate has no member 'execute' before at least one 'set'"));
		}
		self.state.advance(self.class_name(), legal)?;
		match legal {
			"set" => {
				if args.len() != 2 {
					return Err(Error::arity("TableUpdate.set", 2, 2, args.len()));
				}
				let column = args[0].as_string()?.to_string();
				self.assignments.push((column, args[1].clone()));
				Ok(Value::Undefined)
			}
			"where" => {
				let clause = args.first().ok_or_else(|| Error::arity("TableUpdate.where", 1, 1, 0))?.as_string()?.to_string();
				self.binds.declare_from(&clause);
				self.filter = Some(clause);
				Ok(Value::Undefined)
			}
			"orderBy" => {
				self.order_by = args.iter().map(|v| v.as_string().map(str::to_string)).collect::<Result<_, _>>()?;
				Ok(Value::Undefined)
			}
			"limit" => {
				self.limit = Some(args.first().ok_or_else(|| Error::arity("TableUpdate.limit", 1, 1, 0))?.as_uint()?);
				Ok(Value::Undefined)
			}
			"bind" => {
				if args.len() != 2 {
					return Err(Error::arity("TableUpdate.bind", 2, 2, args.len()));
				}
				self.binds.bind(args[0].as_string()?.to_string(), args[1].clone());
				Ok(Value::Undefined)
			}
			"execute" => {
				self.binds.check_all_bound()?;
				let assignments = self
					.assignments
					.iter()
					.map(|(col, val)| format!("`{col}` = {}", val.descr()))
					.collect::<Vec<_>>()
					.join(", ");
				let mut sql = format!("UPDATE `{}`.`{}` SET {assignments}", self.table.schema, self.table.name);
				if let Some(f) = &self.filter {
					sql.push_str(&format!(" WHERE {f}"));
				}
				if !self.order_by.is_empty() {
					sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
				}
				if let Some(l) = self.limit {
					sql.push_str(&format!(" LIMIT {l}"));
				}
				self.table.dispatch_sql(sql, &self.binds)
			}
			_ => unreachable!(),
		}
	}
}

/// `Table.delete()`'s builder state.
#[derive(Debug)]
pub struct Delete {
	table: Table,
	state: ChainState,
	binds: BindState,
	filter: Option<String>,
	order_by: Vec<String>,
	limit: Option<u64>,
}

const DELETE_MEMBERS: &[&str] = &["where", "orderBy", "limit", "bind", "execute"];

impl Delete {
	/// Starts a `delete` chain over `table`.
	pub fn new(table: Table) -> BridgeHandle {
		handle(Delete {
			table,
			state: ChainState::new(&DELETE_SPEC),
			binds: BindState::default(),
			filter: None,
			order_by: Vec::new(),
			limit: None,
		})
	}
}

impl Bridge for Delete {
	fn class_name(&self) -> &str {
		"TableDelete"
	}

	fn members(&self) -> &[&str] {
		DELETE_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		let legal = DELETE_MEMBERS
			.iter()
			.find(|m| **m == name)
			.copied()
			.ok_or_else(|| ErrorKind::UnknownMember.with_message(format!("{} has no member '{name}'", self.class_name())))?;
		self.state.advance(self.class_name(), legal)?;
		match legal {
			"where" => {
				let clause = args.first().ok_or_else(|| Error::arity("TableDelete.where", 1, 1, 0))?.as_string()?.to_string();
				self.binds.declare_from(&clause);
				self.filter = Some(clause);
				Ok(Value::Undefined)
			}
			"orderBy" => {
				self.order_by = args.iter().map(|v| v.as_string().map(str::to_string)).collect::<Result<_, _>>()?;
				Ok(Value::Undefined)
			}
			"limit" => {
				self.limit = Some(args.first().ok_or_else(|| Error::arity("TableDelete.limit", 1, 1, 0))?.as_uint()?);
				Ok(Value::Undefined)
			}
			"bind" => {
				if args.len() != 2 {
					return Err(Error::arity("TableDelete.bind", 2, 2, args.len()));
				}
				self.binds.bind(args[0].as_string()?.to_string(), args[1].clone());
				Ok(Value::Undefined)
			}
			"execute" => {
				self.binds.check_all_bound()?;
				let mut sql = format!("DELETE FROM `{}`.`{}`", self.table.schema, self.table.name);
				if let Some(f) = &self.filter {
					sql.push_str(&format!(" WHERE {f}"));
				}
				if !self.order_by.is_empty() {
					sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
				}
				if let Some(l) = self.limit {
					sql.push_str(&format!(" LIMIT {l}"));
				}
				self.table.dispatch_sql(sql, &self.binds)
			}
			_ => unreachable!(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;

	struct StubSession;
	impl Bridge for StubSession {
		fn class_name(&self) -> &str {
			"StubSession"
		}
		fn members(&self) -> &[&str] {
			&["sql"]
		}
		fn get_member(&self, _name: &str) -> Result<Value, Error> {
			Ok(Value::Undefined)
		}
		fn call(&mut self, _name: &str, _args: &[Value]) -> Result<Value, Error> {
			Ok(Value::map_from([("affected_rows".to_string(), Value::UInteger(1))]))
		}
	}

	fn table() -> (Arc<Mutex<dyn Bridge>>, Table) {
		let session: Arc<Mutex<dyn Bridge>> = Arc::new(Mutex::new(StubSession));
		let weak = Arc::downgrade(&session);
		let table = Table::new("shell_tests", "alpha", weak);
		(session, table)
	}

	#[test]
	fn insert_requires_matching_arity_for_values() {
		let (_session, table) = table();
		let handle = Insert::new(table, vec!["id".into(), "name".into()]);
		let mut guard = handle.lock().unwrap();
		let err = guard.call("values", &[Value::Integer(1)]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ArgumentError);
	}

	#[test]
	fn insert_then_execute() {
		let (_session, table) = table();
		let handle = Insert::new(table, vec!["id".into(), "name".into()]);
		let mut guard = handle.lock().unwrap();
		guard.call("values", &[Value::Integer(1), Value::String("a".into())]).unwrap();
		guard.call("execute", &[]).unwrap();
	}

	#[test]
	fn insert_accepts_multiple_rows_via_repeated_values_calls() {
		let (_session, table) = table();
		let handle = Insert::new(table, vec!["id".into(), "name".into()]);
		let mut guard = handle.lock().unwrap();
		guard.call("values", &[Value::Integer(1), Value::String("a".into())]).unwrap();
		guard.call("values", &[Value::Integer(2), Value::String("b".into())]).unwrap();
		guard.call("execute", &[]).unwrap();
	}

	#[test]
	fn insert_execute_fails_with_no_rows() {
		let (_session, table) = table();
		let handle = Insert::new(table, vec!["id".into(), "name".into()]);
		let mut guard = handle.lock().unwrap();
		let err = guard.call("execute", &[]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::ArgumentError);
	}

	#[test]
	fn update_requires_set_before_where() {
		let (_session, table) = table();
		let handle = Update::new(table);
		let mut guard = handle.lock().unwrap();
		let err = guard.call("where", &[Value::String("id = 1".into())]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnknownMember);
	}

	#[test]
	fn update_set_then_where_then_order_by_then_limit() {
		let (_session, table) = table();
		let handle = Update::new(table);
		let mut guard = handle.lock().unwrap();
		guard.call("set", &[Value::String("name".into()), Value::String("b".into())]).unwrap();
		guard.call("where", &[Value::String("id = 1".into())]).unwrap();
		guard.call("orderBy", &[Value::String("id".into())]).unwrap();
		guard.call("limit", &[Value::UInteger(1)]).unwrap();
		guard.call("execute", &[]).unwrap();
	}

	#[test]
	fn update_set_is_repeatable() {
		let (_session, table) = table();
		let handle = Update::new(table);
		let mut guard = handle.lock().unwrap();
		guard.call("set", &[Value::String("a".into()), Value::Integer(1)]).unwrap();
		guard.call("set", &[Value::String("b".into()), Value::Integer(2)]).unwrap();
	}

	#[test]
	fn delete_admits_where_order_by_limit() {
		let (_session, table) = table();
		let handle = Delete::new(table);
		let mut guard = handle.lock().unwrap();
		guard.call("where", &[Value::String("id = 1".into())]).unwrap();
		guard.call("orderBy", &[Value::String("id".into())]).unwrap();
		guard.call("limit", &[Value::UInteger(1)]).unwrap();
		guard.call("execute", &[]).unwrap();
	}
}
