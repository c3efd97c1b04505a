//! Collection CRUD builders (`find`, `modify`, `add`, `remove`) over a
//! document collection, reached from `Schema.getCollection(name)`.

use crate::bridge::{handle, require_member, Bridge, BridgeHandle};
use crate::builder::{BindState, ChainSpec, ChainState};
use crate::err::{Error, ErrorKind};
use crate::value::Value;
use std::sync::{Mutex, Weak};

static FIND_SPEC: ChainSpec = ChainSpec {
	initial: &["fields", "groupBy", "sort", "limit", "bind", "execute"],
	repeatable: &["bind"],
	unlocks: &[("groupBy", &["having"]), ("limit", &["offset", "skip"])],
	terminal: "execute",
};

static MODIFY_FIRST_OP_SPEC: &[&str] = &["set", "unset", "merge", "arrayInsert", "arrayAppend", "arrayDelete"];

static MODIFY_SPEC: ChainSpec = ChainSpec {
	initial: MODIFY_FIRST_OP_SPEC,
	repeatable: MODIFY_FIRST_OP_SPEC,
	unlocks: &[
		("set", &["sort", "limit", "bind", "execute", "unset", "merge", "arrayInsert", "arrayAppend", "arrayDelete"]),
		("unset", &["sort", "limit", "bind", "execute", "set", "merge", "arrayInsert", "arrayAppend", "arrayDelete"]),
		("merge", &["sort", "limit", "bind", "execute", "set", "unset", "arrayInsert", "arrayAppend", "arrayDelete"]),
		("arrayInsert", &["sort", "limit", "bind", "execute", "set", "unset", "merge", "arrayAppend", "arrayDelete"]),
		("arrayAppend", &["sort", "limit", "bind", "execute", "set", "unset", "merge", "arrayInsert", "arrayDelete"]),
		("arrayDelete", &["sort", "limit", "bind", "execute", "set", "unset", "merge", "arrayInsert", "arrayAppend"]),
	],
	terminal: "execute",
};

static ADD_SPEC: ChainSpec = ChainSpec {
	initial: &["add", "bind", "execute"],
	repeatable: &["add", "bind"],
	unlocks: &[],
	terminal: "execute",
};

static REMOVE_SPEC: ChainSpec = ChainSpec {
	initial: &["sort", "limit", "bind", "execute"],
	repeatable: &["bind"],
	unlocks: &[],
	terminal: "execute",
};

/// A document collection reached from a schema; the originating object for
/// every collection-level CRUD chain.
#[derive(Clone, Debug)]
pub struct Collection {
	pub(crate) schema: String,
	pub(crate) name: String,
	pub(crate) session: Weak<Mutex<dyn Bridge>>,
}

impl Collection {
	/// Constructs a handle to `name` within `schema`, holding the session
	/// only weakly (builders→collection→schema→weak session, to avoid a
	/// session↔result reference cycle).
	pub fn new(schema: impl Into<String>, name: impl Into<String>, session: Weak<Mutex<dyn Bridge>>) -> Self {
		Collection {
			schema: schema.into(),
			name: name.into(),
			session,
		}
	}

	fn dispatch_sql(&self, stmt: String, binds: &BindState) -> Result<Value, Error> {
		let session = self.session.upgrade().ok_or_else(|| {
			ErrorKind::SessionClosed.with_message("the session backing this collection has been closed")
		})?;
		let params = Value::map_from(binds.bound().iter().map(|(k, v)| (k.clone(), v.clone())));
		let mut guard = session.lock().unwrap();
		guard.call("sql", &[Value::String(stmt), params])
	}
}

/// `Collection.find(filter?)`'s builder state.
#[derive(Debug)]
pub struct Find {
	collection: Collection,
	state: ChainState,
	binds: BindState,
	filter: Option<String>,
	fields: Vec<String>,
	group_by: Vec<String>,
	having: Option<String>,
	sort: Vec<String>,
	limit: Option<u64>,
	offset: Option<u64>,
}

const FIND_MEMBERS: &[&str] =
	&["fields", "groupBy", "having", "sort", "limit", "offset", "skip", "bind", "execute"];

impl Find {
	/// Starts a `find` chain over `collection`, with an optional filter
	/// expression.
	pub fn new(collection: Collection, filter: Option<String>) -> BridgeHandle {
		let mut binds = BindState::default();
		if let Some(f) = &filter {
			binds.declare_from(f);
		}
		handle(Find {
			collection,
			state: ChainState::new(&FIND_SPEC),
			binds,
			filter,
			fields: Vec::new(),
			group_by: Vec::new(),
			having: None,
			sort: Vec::new(),
			limit: None,
			offset: None,
		})
	}

	fn build_sql(&self) -> String {
		let cols = if self.fields.is_empty() { "*".to_string() } else { self.fields.join(", ") };
		let mut sql = format!("SELECT {cols} FROM `{}`.`{}`", self.collection.schema, self.collection.name);
		if let Some(f) = &self.filter {
			sql.push_str(&format!(" WHERE {f}"));
		}
		if !self.group_by.is_empty() {
			sql.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
		}
		if let Some(h) = &self.having {
			sql.push_str(&format!(" HAVING {h}"));
		}
		if !self.sort.is_empty() {
			sql.push_str(&format!(" ORDER BY {}", self.sort.join(", ")));
		}
		if let Some(l) = self.limit {
			sql.push_str(&format!(" LIMIT {l}"));
		}
		if let Some(o) = self.offset {
			sql.push_str(&format!(" OFFSET {o}"));
		}
		sql
	}
}

impl Bridge for Find {
	fn class_name(&self) -> &str {
		"CollectionFind"
	}

	fn members(&self) -> &[&str] {
		FIND_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		let legal = FIND_MEMBERS
			.iter()
			.find(|m| **m == name)
			.copied()
			.ok_or_else(|| ErrorKind::UnknownMember.with_message(format!("{} has no member '{name}'", self.class_name())))?;
		self.state.advance(self.class_name(), legal)?;
		match legal {
			"fields" => {
				self.fields = args.iter().map(|v| v.as_string().map(str::to_string)).collect::<Result<_, _>>()?;
				Ok(Value::Undefined)
			}
			"groupBy" => {
				self.group_by = args.iter().map(|v| v.as_string().map(str::to_string)).collect::<Result<_, _>>()?;
				Ok(Value::Undefined)
			}
			"having" => {
				self.having = Some(args.first().ok_or_else(|| Error::arity("CollectionFind.having", 1, 1, 0))?.as_string()?.to_string());
				Ok(Value::Undefined)
			}
			"sort" => {
				self.sort = args.iter().map(|v| v.as_string().map(str::to_string)).collect::<Result<_, _>>()?;
				Ok(Value::Undefined)
			}
			"limit" => {
				self.limit = Some(args.first().ok_or_else(|| Error::arity("CollectionFind.limit", 1, 1, 0))?.as_uint()?);
				Ok(Value::Undefined)
			}
			"offset" | "skip" => {
				self.offset = Some(args.first().ok_or_else(|| Error::arity("CollectionFind.offset", 1, 1, 0))?.as_uint()?);
				Ok(Value::Undefined)
			}
			"bind" => {
				if args.len() != 2 {
					return Err(Error::arity("CollectionFind.bind", 2, 2, args.len()));
				}
				self.binds.bind(args[0].as_string()?.to_string(), args[1].clone());
				Ok(Value::Undefined)
			}
			"execute" => {
				self.binds.check_all_bound()?;
				let sql = self.build_sql();
				self.collection.dispatch_sql(sql, &self.binds)
			}
			_ => unreachable!(),
		}
	}
}

/// `Collection.modify(filter)`'s builder state (the "Operation" object).
#[derive(Debug)]
pub struct Modify {
	collection: Collection,
	state: ChainState,
	binds: BindState,
	filter: String,
	operations: Vec<String>,
	sort: Vec<String>,
	limit: Option<u64>,
}

const MODIFY_MEMBERS: &[&str] = &["set", "unset", "merge", "arrayInsert", "arrayAppend", "arrayDelete", "sort", "limit", "bind", "execute"];

impl Modify {
	/// Starts a `modify` chain over `collection` filtered by `filter`.
	pub fn new(collection: Collection, filter: String) -> BridgeHandle {
		let mut binds = BindState::default();
		binds.declare_from(&filter);
		handle(Modify {
			collection,
			state: ChainState::new(&MODIFY_SPEC),
			binds,
			filter,
			operations: Vec::new(),
			sort: Vec::new(),
			limit: None,
		})
	}
}

impl Bridge for Modify {
	fn class_name(&self) -> &str {
		"CollectionModify"
	}

	fn members(&self) -> &[&str] {
		MODIFY_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		let legal = MODIFY_MEMBERS
			.iter()
			.find(|m| **m == name)
			.copied()
			.ok_or_else(|| ErrorKind::UnknownMember.with_message(format!("{} has no member '{name}'", self.class_name())))?;
		self.state.advance(self.class_name(), legal)?;
		match legal {
			"set" | "unset" | "merge" | "arrayInsert" | "arrayAppend" | "arrayDelete" => {
				let rendered = args.iter().map(Value::descr).collect::<Vec<_>>().join(", ");
				self.operations.push(format!("{legal}({rendered})"));
				Ok(Value::Undefined)
			}
			"sort" => {
				self.sort = args.iter().map(|v| v.as_string().map(str::to_string)).collect::<Result<_, _>>()?;
				Ok(Value::Undefined)
			}
			"limit" => {
				self.limit = Some(args.first().ok_or_else(|| Error::arity("CollectionModify.limit", 1, 1, 0))?.as_uint()?);
				Ok(Value::Undefined)
			}
			"bind" => {
				if args.len() != 2 {
					return Err(Error::arity("CollectionModify.bind", 2, 2, args.len()));
				}
				self.binds.bind(args[0].as_string()?.to_string(), args[1].clone());
				Ok(Value::Undefined)
			}
			"execute" => {
				self.binds.check_all_bound()?;
				let mut sql = format!(
					"UPDATE `{}`.`{}` SET {} WHERE {}",
					self.collection.schema,
					self.collection.name,
					self.operations.join(", "),
					self.filter
				);
				if !self.sort.is_empty() {
					sql.push_str(&format!(" ORDER BY {}", self.sort.join(", ")));
				}
				if let Some(l) = self.limit {
					sql.push_str(&format!(" LIMIT {l}"));
				}
				self.collection.dispatch_sql(sql, &self.binds)
			}
			_ => unreachable!(),
		}
	}
}

/// `Collection.add(doc|[doc])`'s builder state.
#[derive(Debug)]
pub struct Add {
	collection: Collection,
	state: ChainState,
	binds: BindState,
	docs: Vec<Value>,
}

const ADD_MEMBERS: &[&str] = &["add", "bind", "execute"];

impl Add {
	/// Starts an `add` chain over `collection` with the first document(s).
	pub fn new(collection: Collection, first: Value) -> BridgeHandle {
		let docs = match &first {
			Value::Array(a) => a.lock().unwrap().clone(),
			other => vec![other.clone()],
		};
		handle(Add {
			collection,
			state: ChainState::new(&ADD_SPEC),
			binds: BindState::default(),
			docs,
		})
	}
}

impl Bridge for Add {
	fn class_name(&self) -> &str {
		"CollectionAdd"
	}

	fn members(&self) -> &[&str] {
		ADD_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		let legal = ADD_MEMBERS
			.iter()
			.find(|m| **m == name)
			.copied()
			.ok_or_else(|| ErrorKind::UnknownMember.with_message(format!("{} has no member '{name}'", self.class_name())))?;
		self.state.advance(self.class_name(), legal)?;
		match legal {
			"add" => {
				let doc = args.first().ok_or_else(|| Error::arity("CollectionAdd.add", 1, 1, 0))?;
				match doc {
					Value::Array(a) => self.docs.extend(a.lock().unwrap().iter().cloned()),
					other => self.docs.push(other.clone()),
				}
				Ok(Value::Undefined)
			}
			"bind" => {
				if args.len() != 2 {
					return Err(Error::arity("CollectionAdd.bind", 2, 2, args.len()));
				}
				self.binds.bind(args[0].as_string()?.to_string(), args[1].clone());
				Ok(Value::Undefined)
			}
			"execute" => {
				self.binds.check_all_bound()?;
				let values = self.docs.iter().map(Value::descr).collect::<Vec<_>>().join(", ");
				let sql = format!("INSERT INTO `{}`.`{}` VALUES {values}", self.collection.schema, self.collection.name);
				self.collection.dispatch_sql(sql, &self.binds)
			}
			_ => unreachable!(),
		}
	}
}

/// `Collection.remove(filter)`'s builder state.
#[derive(Debug)]
pub struct Remove {
	collection: Collection,
	state: ChainState,
	binds: BindState,
	filter: String,
	sort: Vec<String>,
	limit: Option<u64>,
}

const REMOVE_MEMBERS: &[&str] = &["sort", "limit", "bind", "execute"];

impl Remove {
	/// Starts a `remove` chain over `collection` filtered by `filter`.
	pub fn new(collection: Collection, filter: String) -> BridgeHandle {
		let mut binds = BindState::default();
		binds.declare_from(&filter);
		handle(Remove {
			collection,
			state: ChainState::new(&REMOVE_SPEC),
			binds,
			filter,
			sort: Vec::new(),
			limit: None,
		})
	}
}

impl Bridge for Remove {
	fn class_name(&self) -> &str {
		"CollectionRemove"
	}

	fn members(&self) -> &[&str] {
		REMOVE_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		let legal = REMOVE_MEMBERS
			.iter()
			.find(|m| **m == name)
			.copied()
			.ok_or_else(|| ErrorKind::UnknownMember.with_message(format!("{} has no member '{name}'", self.class_name())))?;
		self.state.advance(self.class_name(), legal)?;
		match legal {
			"sort" => {
				self.sort = args.iter().map(|v| v.as_string().map(str::to_string)).collect::<Result<_, _>>()?;
				Ok(Value::Undefined)
			}
			"limit" => {
				self.limit = Some(args.first().ok_or_else(|| Error::arity("CollectionRemove.limit", 1, 1, 0))?.as_uint()?);
				Ok(Value::Undefined)
			}
			"bind" => {
				if args.len() != 2 {
					return Err(Error::arity("CollectionRemove.bind", 2, 2, args.len()));
				}
				self.binds.bind(args[0].as_string()?.to_string(), args[1].clone());
				Ok(Value::Undefined)
			}
			"execute" => {
				self.binds.check_all_bound()?;
				let mut sql = format!("DELETE FROM `{}`.`{}` WHERE {}", self.collection.schema, self.collection.name, self.filter);
				if !self.sort.is_empty() {
					sql.push_str(&format!(" ORDER BY {}", self.sort.join(", ")));
				}
				if let Some(l) = self.limit {
					sql.push_str(&format!(" LIMIT {l}"));
				}
				self.collection.dispatch_sql(sql, &self.binds)
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

	fn collection() -> (Arc<Mutex<dyn Bridge>>, Collection) {
		let session: Arc<Mutex<dyn Bridge>> = Arc::new(Mutex::new(StubSession));
		let weak = Arc::downgrade(&session);
		let collection = Collection::new("shell_tests", "alpha", weak);
		(session, collection)
	}

	#[test]
	fn find_limit_twice_fails() {
		let (_session, collection) = collection();
		let handle = Find::new(collection, None);
		let mut guard = handle.lock().unwrap();
		guard.call("limit", &[Value::UInteger(1)]).unwrap();
		let err = guard.call("limit", &[Value::UInteger(2)]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::InvalidCallOrder);
	}

	#[test]
	fn find_offset_before_limit_fails() {
		let (_session, collection) = collection();
		let handle = Find::new(collection, None);
		let mut guard = handle.lock().unwrap();
		let err = guard.call("offset", &[Value::UInteger(1)]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnknownMember);
	}

	#[test]
	fn find_having_requires_group_by_first() {
		let (_session, collection) = collection();
		let handle = Find::new(collection, None);
		let mut guard = handle.lock().unwrap();
		let err = guard.call("having", &[Value::String("x > 1".into())]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnknownMember);
		guard.call("groupBy", &[Value::String("x".into())]).unwrap();
		guard.call("having", &[Value::String("x > 1".into())]).unwrap();
	}

	#[test]
	fn find_execute_fails_on_unbound_placeholder() {
		let (_session, collection) = collection();
		let handle = Find::new(collection, Some("age > :min".into()));
		let mut guard = handle.lock().unwrap();
		let err = guard.call("execute", &[]).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnboundParameter);
	}

	#[test]
	fn find_execute_succeeds_once_bound() {
		let (_session, collection) = collection();
		let handle = Find::new(collection, Some("age > :min".into()));
		let mut guard = handle.lock().unwrap();
		guard.call("bind", &[Value::String("min".into()), Value::Integer(18)]).unwrap();
		guard.call("execute", &[]).unwrap();
	}

	#[test]
	fn add_then_add_then_execute() {
		let (_session, collection) = collection();
		let handle = Add::new(collection, Value::map_from([("a".to_string(), Value::Integer(1))]));
		let mut guard = handle.lock().unwrap();
		guard.call("add", &[Value::map_from([("a".to_string(), Value::Integer(2))])]).unwrap();
		guard.call("execute", &[]).unwrap();
	}

	#[test]
	fn modify_operation_method_repeatable_then_execute() {
		let (_session, collection) = collection();
		let handle = Modify::new(collection, "id = :id".into());
		let mut guard = handle.lock().unwrap();
		guard.call("set", &[Value::String("a".into()), Value::Integer(1)]).unwrap();
		guard.call("set", &[Value::String("b".into()), Value::Integer(2)]).unwrap();
		guard.call("bind", &[Value::String("id".into()), Value::Integer(5)]).unwrap();
		guard.call("execute", &[]).unwrap();
	}
}
