//! CRUD builder state machine: fluent collection/table query builders with
//! legal-call-order enforcement.
//!
//! The state machine is a runtime state field rather than distinct
//! statically-typed wrapper objects per state, because the error message a
//! call produces has to depend on which state the chain is currently in —
//! a dynamic `ChainState` is what makes `InvalidCallOrder`/`UnknownMember`
//! come out with the right shape regardless of host script language.

pub mod collection;
pub mod table;

use crate::err::{Error, ErrorKind};
use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

/// Declares which methods unlock which other methods, and which methods are
/// legal to call more than once, for one CRUD chain shape.
#[derive(Debug)]
pub struct ChainSpec {
	/// Methods legal immediately after the chain's entry point.
	pub initial: &'static [&'static str],
	/// Methods that may be called any number of times once legal.
	pub repeatable: &'static [&'static str],
	/// `(gate, unlocked)`: once `gate` has been called, every name in
	/// `unlocked` becomes legal in addition to whatever already was.
	pub unlocks: &'static [(&'static str, &'static [&'static str])],
	/// The terminal method; once called, no further call is legal.
	pub terminal: &'static str,
}

/// Runtime state shared by every concrete CRUD builder: which methods are
/// currently legal, which call-once methods have already fired, and whether
/// the chain has reached its terminal method.
#[derive(Debug)]
pub struct ChainState {
	spec: &'static ChainSpec,
	legal: HashSet<&'static str>,
	called_once: HashSet<&'static str>,
	executed: bool,
}

impl ChainState {
	/// Starts a new chain for the given shape.
	pub fn new(spec: &'static ChainSpec) -> Self {
		ChainState {
			spec,
			legal: spec.initial.iter().copied().collect(),
			called_once: HashSet::new(),
			executed: false,
		}
	}

	/// Validates that `name` is callable right now and advances the state
	/// machine, unlocking any methods gated behind it.
	///
	/// Fails `UnknownMember` if `name` is not currently legal, or
	/// `InvalidCallOrder` if `name` is a call-once method being repeated or
	/// the chain has already reached its terminal method.
	pub fn advance(&mut self, class_name: &str, name: &'static str) -> Result<(), Error> {
		if self.executed {
			return Err(ErrorKind::InvalidCallOrder
				.with_message(format!("{class_name}.{name}: the chain has already executed")));
		}
		if !self.legal.contains(name) {
			return Err(ErrorKind::UnknownMember
				.with_message(format!("{class_name} has no member '{name}' in its current state")));
		}
		let repeatable = self.spec.repeatable.contains(&name);
		if !repeatable && self.called_once.contains(name) {
			return Err(ErrorKind::InvalidCallOrder
				.with_message(format!("{class_name}.{name} has already been called on this chain")));
		}
		if !repeatable {
			self.called_once.insert(name);
		}
		for (gate, unlocked) in self.spec.unlocks {
			if *gate == name {
				self.legal.extend(unlocked.iter().copied());
			}
		}
		if name == self.spec.terminal {
			self.executed = true;
		}
		Ok(())
	}

	/// The members currently legal in this chain's state — used to answer
	/// `members()` for reflection.
	pub fn legal_members(&self) -> Vec<&'static str> {
		let mut members: Vec<&'static str> = self.legal.iter().copied().collect();
		members.sort_unstable();
		members
	}
}

/// Tracks `:name` placeholders declared by a statement or filter expression
/// and the values bound to them via `bind(name, value)`.
///
/// A plain `BTreeMap` insert for `bind()` would never validate that every
/// declared placeholder was eventually bound; this additionally fails
/// `UnboundParameter` for any declared name left unbound at `execute()`.
#[derive(Default, Debug)]
pub struct BindState {
	declared: HashSet<String>,
	bound: HashMap<String, Value>,
}

impl BindState {
	/// Scans `text` for `:name` placeholders and adds them to the declared set.
	pub fn declare_from(&mut self, text: &str) {
		for capture in PLACEHOLDER.captures_iter(text) {
			self.declared.insert(capture[1].to_string());
		}
	}

	/// Records a binding.
	pub fn bind(&mut self, name: impl Into<String>, value: Value) {
		self.bound.insert(name.into(), value);
	}

	/// Fails `UnboundParameter` naming the first declared-but-unbound
	/// placeholder found, in declaration order is not guaranteed (a
	/// `HashSet` carries no order) but deterministic given one missing name.
	pub fn check_all_bound(&self) -> Result<(), Error> {
		for name in &self.declared {
			if !self.bound.contains_key(name) {
				return Err(ErrorKind::UnboundParameter.with_message(format!(
					"parameter ':{name}' was declared but never bound"
				)));
			}
		}
		Ok(())
	}

	/// The bound values, keyed by placeholder name.
	pub fn bound(&self) -> &HashMap<String, Value> {
		&self.bound
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	static SPEC: ChainSpec = ChainSpec {
		initial: &["fields", "sort", "limit", "bind", "execute"],
		repeatable: &["bind"],
		unlocks: &[("limit", &["offset"])],
		terminal: "execute",
	};

	#[test]
	fn repeat_of_call_once_method_fails() {
		let mut state = ChainState::new(&SPEC);
		state.advance("Find", "limit").unwrap();
		let err = state.advance("Find", "limit").unwrap_err();
		assert_eq!(err.kind(), ErrorKind::InvalidCallOrder);
	}

	#[test]
	fn offset_illegal_before_limit() {
		let mut state = ChainState::new(&SPEC);
		let err = state.advance("Find", "offset").unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnknownMember);
	}

	#[test]
	fn offset_legal_after_limit() {
		let mut state = ChainState::new(&SPEC);
		state.advance("Find", "limit").unwrap();
		state.advance("Find", "offset").unwrap();
	}

	#[test]
	fn nothing_legal_after_execute() {
		let mut state = ChainState::new(&SPEC);
		state.advance("Find", "execute").unwrap();
		let err = state.advance("Find", "bind").unwrap_err();
		assert_eq!(err.kind(), ErrorKind::InvalidCallOrder);
	}

	#[test]
	fn bind_is_repeatable() {
		let mut state = ChainState::new(&SPEC);
		state.advance("Find", "bind").unwrap();
		state.advance("Find", "bind").unwrap();
	}

	#[test]
	fn declared_placeholder_must_be_bound() {
		let mut binds = BindState::default();
		binds.declare_from("name = :target and age > :min");
		binds.bind("target", Value::String("a".into()));
		let err = binds.check_all_bound().unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnboundParameter);
		binds.bind("min", Value::Integer(0));
		binds.check_all_bound().unwrap();
	}
}
