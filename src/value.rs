//! The tagged dynamic value shared by the SQL, JavaScript and Python surfaces.
//!
//! [`Value`] is the single currency every surface in this crate trades in:
//! a session result row, a CRUD builder bind, and a script runtime argument
//! are all a [`Value`]. Shared containers (`Array`, `Map`, `Object`,
//! `Function`) are reference counted so that a response map can be built
//! incrementally by one surface and handed to another without copying.

use crate::bridge::{BridgeHandle, FunctionHandle};
use crate::err::{Error, ErrorKind};
use indexmap::IndexMap;
use std::fmt;
use std::str::Chars;
use std::sync::{Arc, Mutex, Weak};

/// Shared, mutable array of [`Value`]s.
///
/// Guarded by a `Mutex` rather than a `RefCell`: every object bridge, and
/// therefore every value it can hold, must be safely addressable from any
/// thread that holds a reference, even though only one script runtime
/// executes at a time.
pub type SharedArray = Arc<Mutex<Vec<Value>>>;
/// Shared, mutable, insertion-ordered map of [`Value`]s.
pub type SharedMap = Arc<Mutex<IndexMap<String, Value>>>;

/// The universal dynamic value used across every surface of the shell.
///
/// Every construction picks exactly one variant; `Undefined` is distinct
/// from `Null`. `Array`, `Map`, `Object` and `Function` are shared by
/// reference, so mutating one holder is visible to every other holder.
/// `MapRef` never extends the lifetime of the map it points at and resolves
/// to `Undefined` once that map has been dropped.
#[derive(Clone)]
#[non_exhaustive]
pub enum Value {
	/// A value that was never assigned (an absent property, a missing argument).
	Undefined,
	/// An explicit absence of a value.
	Null,
	/// A boolean.
	Bool(bool),
	/// A signed 64-bit integer.
	Integer(i64),
	/// An unsigned 64-bit integer.
	UInteger(u64),
	/// An IEEE-754 double.
	Float(f64),
	/// A UTF-8 string.
	String(String),
	/// A shared handle to an [`crate::bridge::Bridge`].
	Object(BridgeHandle),
	/// A shared, ordered sequence of values.
	Array(SharedArray),
	/// A shared, insertion-ordered string-keyed map.
	Map(SharedMap),
	/// A weak reference to a [`Value::Map`]'s backing storage.
	MapRef(Weak<Mutex<IndexMap<String, Value>>>),
	/// A shared handle to a callable.
	Function(FunctionHandle),
}

/// The discriminant of a [`Value`], returned by [`Value::type_name`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ValueType {
	Undefined,
	Null,
	Bool,
	Integer,
	UInteger,
	Float,
	String,
	Object,
	Array,
	Map,
	MapRef,
	Function,
}

impl fmt::Display for ValueType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ValueType::Undefined => "undefined",
			ValueType::Null => "null",
			ValueType::Bool => "bool",
			ValueType::Integer => "integer",
			ValueType::UInteger => "unsigned integer",
			ValueType::Float => "float",
			ValueType::String => "string",
			ValueType::Object => "object",
			ValueType::Array => "array",
			ValueType::Map => "map",
			ValueType::MapRef => "map reference",
			ValueType::Function => "function",
		};
		f.write_str(s)
	}
}

impl Value {
	/// Constructs an empty array.
	pub fn new_array() -> Self {
		Value::Array(Arc::new(Mutex::new(Vec::new())))
	}

	/// Constructs an array from an iterator of values.
	pub fn array_from(values: impl IntoIterator<Item = Value>) -> Self {
		Value::Array(Arc::new(Mutex::new(values.into_iter().collect())))
	}

	/// Constructs an empty, insertion-ordered map.
	pub fn new_map() -> Self {
		Value::Map(Arc::new(Mutex::new(IndexMap::new())))
	}

	/// Constructs a map from an iterator of key/value pairs, preserving
	/// insertion order.
	pub fn map_from(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
		Value::Map(Arc::new(Mutex::new(entries.into_iter().collect())))
	}

	/// Returns a weak [`Value::MapRef`] pointing at this map's storage.
	///
	/// Fails with [`ErrorKind::TypeMismatch`] if called on anything but a
	/// `Map`.
	pub fn downgrade(&self) -> Result<Value, Error> {
		match self {
			Value::Map(m) => Ok(Value::MapRef(Arc::downgrade(m))),
			other => Err(type_mismatch("Map", other.type_name())),
		}
	}

	/// The discriminant of this value.
	pub fn type_name(&self) -> ValueType {
		match self {
			Value::Undefined => ValueType::Undefined,
			Value::Null => ValueType::Null,
			Value::Bool(_) => ValueType::Bool,
			Value::Integer(_) => ValueType::Integer,
			Value::UInteger(_) => ValueType::UInteger,
			Value::Float(_) => ValueType::Float,
			Value::String(_) => ValueType::String,
			Value::Object(_) => ValueType::Object,
			Value::Array(_) => ValueType::Array,
			Value::Map(_) => ValueType::Map,
			Value::MapRef(_) => ValueType::MapRef,
			Value::Function(_) => ValueType::Function,
		}
	}

	/// Resolves a `MapRef` to its backing `Map`, or `Undefined` if the
	/// target has been released. Every other variant is returned unchanged.
	pub fn resolve(&self) -> Value {
		match self {
			Value::MapRef(weak) => match weak.upgrade() {
				Some(m) => Value::Map(m),
				None => Value::Undefined,
			},
			other => other.clone(),
		}
	}

	pub fn as_bool(&self) -> Result<bool, Error> {
		match self {
			Value::Bool(b) => Ok(*b),
			other => Err(type_mismatch("Bool", other.type_name())),
		}
	}

	pub fn as_int(&self) -> Result<i64, Error> {
		match self {
			Value::Integer(v) => Ok(*v),
			other => Err(type_mismatch("Integer", other.type_name())),
		}
	}

	pub fn as_uint(&self) -> Result<u64, Error> {
		match self {
			Value::UInteger(v) => Ok(*v),
			other => Err(type_mismatch("UInteger", other.type_name())),
		}
	}

	pub fn as_double(&self) -> Result<f64, Error> {
		match self {
			Value::Float(v) => Ok(*v),
			other => Err(type_mismatch("Float", other.type_name())),
		}
	}

	pub fn as_string(&self) -> Result<&str, Error> {
		match self {
			Value::String(v) => Ok(v.as_str()),
			other => Err(type_mismatch("String", other.type_name())),
		}
	}

	pub fn as_object(&self) -> Result<&BridgeHandle, Error> {
		match self {
			Value::Object(v) => Ok(v),
			other => Err(type_mismatch("Object", other.type_name())),
		}
	}

	pub fn as_array(&self) -> Result<&SharedArray, Error> {
		match self {
			Value::Array(v) => Ok(v),
			other => Err(type_mismatch("Array", other.type_name())),
		}
	}

	pub fn as_map(&self) -> Result<&SharedMap, Error> {
		match self {
			Value::Map(v) => Ok(v),
			other => Err(type_mismatch("Map", other.type_name())),
		}
	}

	/// Value equality: scalars compare by value, shared containers and
	/// objects compare by reference identity.
	///
	/// `Integer`/`UInteger` compare equal across variants when they hold the
	/// same non-negative number: `descr()` renders both as a plain numeral
	/// with no variant tag, so a non-negative `Integer` parses back as
	/// `UInteger` and the two must still be considered the same value.
	pub fn value_eq(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Undefined, Value::Undefined) => true,
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Integer(a), Value::Integer(b)) => a == b,
			(Value::UInteger(a), Value::UInteger(b)) => a == b,
			(Value::Integer(a), Value::UInteger(b)) => u64::try_from(*a).is_ok_and(|a| a == *b),
			(Value::UInteger(a), Value::Integer(b)) => u64::try_from(*b).is_ok_and(|b| b == *a),
			(Value::Float(a), Value::Float(b)) => a == b,
			(Value::String(a), Value::String(b)) => a == b,
			(Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
			(Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
			(Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
			(Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
			(Value::MapRef(a), Value::MapRef(b)) => a.ptr_eq(b),
			_ => false,
		}
	}

	/// Renders the canonical textual description used in tests: maps as
	/// `{"k": v, ...}` with lexicographically sorted keys, arrays as
	/// `[v, ...]`, strings double-quoted with JSON-style escapes, booleans
	/// as `true`/`false`, null as `null`.
	pub fn descr(&self) -> String {
		let mut out = String::new();
		self.write_descr(&mut out);
		out
	}

	fn write_descr(&self, out: &mut String) {
		match self {
			Value::Undefined => out.push_str("undefined"),
			Value::Null => out.push_str("null"),
			Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
			Value::Integer(v) => out.push_str(&v.to_string()),
			Value::UInteger(v) => out.push_str(&v.to_string()),
			Value::Float(v) => out.push_str(&format_float(*v)),
			Value::String(s) => out.push_str(&quote_json(s)),
			Value::Object(b) => {
				out.push_str(&format!("<{}>", b.lock().unwrap().class_name()));
			}
			Value::Function(_) => out.push_str("<Function>"),
			Value::Array(a) => {
				out.push('[');
				for (i, v) in a.lock().unwrap().iter().enumerate() {
					if i > 0 {
						out.push_str(", ");
					}
					v.write_descr(out);
				}
				out.push(']');
			}
			Value::Map(m) => {
				out.push('{');
				let map = m.lock().unwrap();
				let mut keys: Vec<&String> = map.keys().collect();
				keys.sort();
				for (i, k) in keys.iter().enumerate() {
					if i > 0 {
						out.push_str(", ");
					}
					out.push_str(&quote_json(k));
					out.push_str(": ");
					map[*k].write_descr(out);
				}
				out.push('}');
			}
			Value::MapRef(weak) => match weak.upgrade() {
				Some(m) => Value::Map(m).write_descr(out),
				None => out.push_str("undefined"),
			},
		}
	}

	/// Parses a value previously rendered with [`Value::descr`].
	///
	/// Only scalar, `Array` and `Map` forms round-trip; `descr` never
	/// produces a form that parses back into an `Object`, `Function` or
	/// `MapRef`.
	pub fn parse(text: &str) -> Result<Value, Error> {
		let mut chars = text.trim().chars();
		let v = parse_value(&mut chars)?;
		skip_ws(&mut chars);
		if chars.clone().next().is_some() {
			return Err(ErrorKind::ArgumentError.with_message("trailing characters after value"));
		}
		Ok(v)
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.descr())
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.descr())
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Value::Bool(v)
	}
}
impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Value::Integer(v)
	}
}
impl From<u64> for Value {
	fn from(v: u64) -> Self {
		Value::UInteger(v)
	}
}
impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Value::Float(v)
	}
}
impl From<String> for Value {
	fn from(v: String) -> Self {
		Value::String(v)
	}
}
impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Value::String(v.to_owned())
	}
}

fn type_mismatch(expected: &str, actual: ValueType) -> Error {
	ErrorKind::TypeMismatch.with_message(format!("expected {expected} but value is {actual}"))
}

fn format_float(v: f64) -> String {
	if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
		format!("{v:.1}")
	} else {
		format!("{v}")
	}
}

/// JSON-style double-quoted escaping, with the output buffer's capacity
/// pre-hinted to the input length since most strings need no escaping.
fn quote_json(s: &str) -> String {
	let mut ret = String::with_capacity(2 + s.len());
	ret.push('"');
	for c in s.chars() {
		match c {
			'"' => ret.push_str("\\\""),
			'\\' => ret.push_str("\\\\"),
			'\n' => ret.push_str("\\n"),
			'\r' => ret.push_str("\\r"),
			'\t' => ret.push_str("\\t"),
			c if (c as u32) < 0x20 => ret.push_str(&format!("\\u{:04x}", c as u32)),
			c => ret.push(c),
		}
	}
	ret.push('"');
	ret
}

fn skip_ws(chars: &mut Chars) {
	loop {
		let mut clone = chars.clone();
		match clone.next() {
			Some(c) if c.is_whitespace() => {
				*chars = clone;
			}
			_ => break,
		}
	}
}

fn peek(chars: &Chars) -> Option<char> {
	chars.clone().next()
}

fn parse_value(chars: &mut Chars) -> Result<Value, Error> {
	skip_ws(chars);
	match peek(chars) {
		Some('"') => parse_string(chars).map(Value::String),
		Some('[') => parse_array(chars),
		Some('{') => parse_map(chars),
		Some('t') => parse_literal(chars, "true", Value::Bool(true)),
		Some('f') => parse_literal(chars, "false", Value::Bool(false)),
		Some('n') => parse_literal(chars, "null", Value::Null),
		Some('u') => parse_literal(chars, "undefined", Value::Undefined),
		Some(c) if c == '-' || c.is_ascii_digit() => parse_number(chars),
		_ => Err(ErrorKind::ArgumentError.with_message("unexpected end of value")),
	}
}

fn parse_literal(chars: &mut Chars, literal: &str, value: Value) -> Result<Value, Error> {
	for expect in literal.chars() {
		match chars.next() {
			Some(c) if c == expect => {}
			_ => return Err(ErrorKind::ArgumentError.with_message(format!("expected `{literal}`"))),
		}
	}
	Ok(value)
}

fn parse_string(chars: &mut Chars) -> Result<String, Error> {
	chars.next(); // opening quote
	let mut s = String::new();
	loop {
		match chars.next() {
			None => return Err(ErrorKind::ArgumentError.with_message("unterminated string")),
			Some('"') => return Ok(s),
			Some('\\') => match chars.next() {
				Some('"') => s.push('"'),
				Some('\\') => s.push('\\'),
				Some('n') => s.push('\n'),
				Some('r') => s.push('\r'),
				Some('t') => s.push('\t'),
				Some('u') => {
					let mut code = 0u32;
					for _ in 0..4 {
						let c = chars
							.next()
							.ok_or_else(|| ErrorKind::ArgumentError.with_message("bad \\u escape"))?;
						let digit = c
							.to_digit(16)
							.ok_or_else(|| ErrorKind::ArgumentError.with_message("bad \\u escape"))?;
						code = code * 16 + digit;
					}
					s.push(char::from_u32(code).unwrap_or('\u{fffd}'));
				}
				_ => return Err(ErrorKind::ArgumentError.with_message("bad escape")),
			},
			Some(c) => s.push(c),
		}
	}
}

fn parse_number(chars: &mut Chars) -> Result<Value, Error> {
	let mut raw = String::new();
	let mut is_float = false;
	let mut is_negative = false;
	if peek(chars) == Some('-') {
		is_negative = true;
		raw.push('-');
		chars.next();
	}
	loop {
		match peek(chars) {
			Some(c) if c.is_ascii_digit() => {
				raw.push(c);
				chars.next();
			}
			Some('.') => {
				is_float = true;
				raw.push('.');
				chars.next();
			}
			Some(c) if (c == 'e' || c == 'E') => {
				is_float = true;
				raw.push(c);
				chars.next();
				if matches!(peek(chars), Some('+') | Some('-')) {
					raw.push(chars.next().unwrap());
				}
			}
			_ => break,
		}
	}
	if is_float {
		raw.parse::<f64>()
			.map(Value::Float)
			.map_err(|e| ErrorKind::ArgumentError.with_context(e))
	} else if is_negative {
		raw.parse::<i64>()
			.map(Value::Integer)
			.map_err(|e| ErrorKind::ArgumentError.with_context(e))
	} else {
		raw.parse::<u64>()
			.map(Value::UInteger)
			.map_err(|e| ErrorKind::ArgumentError.with_context(e))
	}
}

fn parse_array(chars: &mut Chars) -> Result<Value, Error> {
	chars.next(); // '['
	let mut items = Vec::new();
	skip_ws(chars);
	if peek(chars) == Some(']') {
		chars.next();
		return Ok(Value::array_from(items));
	}
	loop {
		items.push(parse_value(chars)?);
		skip_ws(chars);
		match chars.next() {
			Some(',') => continue,
			Some(']') => break,
			_ => return Err(ErrorKind::ArgumentError.with_message("expected `,` or `]`")),
		}
	}
	Ok(Value::array_from(items))
}

fn parse_map(chars: &mut Chars) -> Result<Value, Error> {
	chars.next(); // '{'
	let mut entries = Vec::new();
	skip_ws(chars);
	if peek(chars) == Some('}') {
		chars.next();
		return Ok(Value::map_from(entries));
	}
	loop {
		skip_ws(chars);
		let key = parse_string(chars)?;
		skip_ws(chars);
		match chars.next() {
			Some(':') => {}
			_ => return Err(ErrorKind::ArgumentError.with_message("expected `:` after key")),
		}
		let value = parse_value(chars)?;
		entries.push((key, value));
		skip_ws(chars);
		match chars.next() {
			Some(',') => continue,
			Some('}') => break,
			_ => return Err(ErrorKind::ArgumentError.with_message("expected `,` or `}`")),
		}
	}
	Ok(Value::map_from(entries))
}
