//! Schema, Collection and Table handles: reached from a session's
//! `getSchema`/`getDefaultSchema`, and themselves the entry points for
//! every CRUD chain.
//!
//! Ownership runs session ← (weak) schema ← (strong) collection/table ←
//! (strong) builder: a builder can always reach its collection/table and
//! schema, but a schema never keeps its session alive, so closing a session
//! does not leave a reference cycle behind.

use crate::bridge::{handle, require_member, Bridge, BridgeHandle};
use crate::builder::collection::{self, Collection as CollectionOwner};
use crate::builder::table::{self, Table as TableOwner};
use crate::err::Error;
use crate::value::Value;
use std::sync::{Mutex, Weak};

const SCHEMA_MEMBERS: &[&str] = &["name", "getCollection", "getTable"];

/// A schema (database) reached from a session.
#[derive(Debug)]
pub struct Schema {
	full_class_name: String,
	name: String,
	session: Weak<Mutex<dyn Bridge>>,
}

impl Schema {
	/// Builds a schema handle named `name`, holding `session` only weakly.
	pub fn new_handle(name: String, session: Weak<Mutex<dyn Bridge>>) -> BridgeHandle {
		handle(Schema {
			full_class_name: format!("Schema:{name}"),
			name,
			session,
		})
	}
}

impl Bridge for Schema {
	fn class_name(&self) -> &str {
		&self.full_class_name
	}

	fn members(&self) -> &[&str] {
		SCHEMA_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"name" => Ok(Value::String(self.name.clone())),
			_ => Ok(Value::Undefined),
		}
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"getCollection" => {
				if args.len() != 1 {
					return Err(Error::arity("Schema.getCollection", 1, 1, args.len()));
				}
				let coll_name =
					args[0].as_string().map_err(|_| Error::argument_kind(1, "string"))?.to_string();
				let owner = CollectionOwner::new(self.name.clone(), coll_name.clone(), self.session.clone());
				Ok(Value::Object(CollectionObject::new_handle(coll_name, owner)))
			}
			"getTable" => {
				if args.len() != 1 {
					return Err(Error::arity("Schema.getTable", 1, 1, args.len()));
				}
				let table_name =
					args[0].as_string().map_err(|_| Error::argument_kind(1, "string"))?.to_string();
				let owner = TableOwner::new(self.name.clone(), table_name.clone(), self.session.clone());
				Ok(Value::Object(TableObject::new_handle(table_name, owner)))
			}
			_ => unreachable!("require_member already validated name"),
		}
	}
}

const COLLECTION_MEMBERS: &[&str] = &["name", "find", "modify", "add", "remove"];

/// A document collection handle: the originating object for `find`,
/// `modify`, `add` and `remove` chains.
#[derive(Debug)]
pub struct CollectionObject {
	name: String,
	owner: CollectionOwner,
}

impl CollectionObject {
	/// Wraps `owner` as the script-visible `Collection` handle named `name`.
	pub fn new_handle(name: String, owner: CollectionOwner) -> BridgeHandle {
		handle(CollectionObject {
			name,
			owner,
		})
	}
}

impl Bridge for CollectionObject {
	fn class_name(&self) -> &str {
		"Collection"
	}

	fn members(&self) -> &[&str] {
		COLLECTION_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"name" => Ok(Value::String(self.name.clone())),
			_ => Ok(Value::Undefined),
		}
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"find" => {
				let filter = args
					.first()
					.map(|v| v.as_string().map(str::to_string))
					.transpose()
					.map_err(|_| Error::argument_kind(1, "string"))?;
				Ok(Value::Object(collection::Find::new(self.owner.clone(), filter)))
			}
			"modify" => {
				if args.len() != 1 {
					return Err(Error::arity("Collection.modify", 1, 1, args.len()));
				}
				let filter = args[0].as_string().map_err(|_| Error::argument_kind(1, "string"))?.to_string();
				Ok(Value::Object(collection::Modify::new(self.owner.clone(), filter)))
			}
			"add" => {
				if args.len() != 1 {
					return Err(Error::arity("Collection.add", 1, 1, args.len()));
				}
				Ok(Value::Object(collection::Add::new(self.owner.clone(), args[0].clone())))
			}
			"remove" => {
				if args.len() != 1 {
					return Err(Error::arity("Collection.remove", 1, 1, args.len()));
				}
				let filter = args[0].as_string().map_err(|_| Error::argument_kind(1, "string"))?.to_string();
				Ok(Value::Object(collection::Remove::new(self.owner.clone(), filter)))
			}
			_ => unreachable!("require_member already validated name"),
		}
	}
}

const TABLE_MEMBERS: &[&str] = &["name", "select", "insert", "update", "delete"];

/// A relational table handle: the originating object for `select`,
/// `insert`, `update` and `delete` chains.
#[derive(Debug)]
pub struct TableObject {
	name: String,
	owner: TableOwner,
}

impl TableObject {
	/// Wraps `owner` as the script-visible `Table` handle named `name`.
	pub fn new_handle(name: String, owner: TableOwner) -> BridgeHandle {
		handle(TableObject {
			name,
			owner,
		})
	}
}

impl Bridge for TableObject {
	fn class_name(&self) -> &str {
		"Table"
	}

	fn members(&self) -> &[&str] {
		TABLE_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"name" => Ok(Value::String(self.name.clone())),
			_ => Ok(Value::Undefined),
		}
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"select" => Ok(Value::Object(table::Select::new(self.owner.clone()))),
			"insert" => {
				let columns = args
					.iter()
					.map(|v| v.as_string().map(str::to_string))
					.collect::<Result<Vec<_>, _>>()
					.map_err(|_| Error::argument_kind(1, "string"))?;
				Ok(Value::Object(table::Insert::new(self.owner.clone(), columns)))
			}
			"update" => Ok(Value::Object(table::Update::new(self.owner.clone()))),
			"delete" => Ok(Value::Object(table::Delete::new(self.owner.clone()))),
			_ => unreachable!("require_member already validated name"),
		}
	}
}
