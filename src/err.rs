//! The crate's single error surface.
//!
//! Kinds, not types: one flat, `#[non_exhaustive]` enum of kinds, carried
//! inside a small `Error { kind, message }` struct, so adapters can match
//! on [`ErrorKind`] while a human-readable message flows through unchanged.

use serde::Deserialize;
use serde::Serialize;
use std::error;
use std::fmt;

/// Categories of errors raised anywhere in the shell core.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
	/// A typed extraction (`as_int`, `as_string`, ...) was called on a
	/// [`crate::value::Value`] holding a different variant.
	TypeMismatch,
	/// `get_member`/`call` referenced a name outside `members()`, or a CRUD
	/// builder method was invoked outside the states that admit it.
	UnknownMember,
	/// Wrong arity, wrong argument variant, or a semantic constraint such as
	/// an empty expression.
	ArgumentError,
	/// A CRUD builder method was called twice, or out of the order its
	/// state machine admits.
	InvalidCallOrder,
	/// `execute()` was called while a declared `:name` placeholder had no
	/// bound value.
	UnboundParameter,
	/// The connection string failed to parse.
	UriParseError,
	/// The server rejected a statement; carries server code/SQLSTATE/message.
	SqlError,
	/// An operation was attempted on a session after `close()`.
	SessionClosed,
	/// `sql_one` observed more than one row.
	ResultShapeError,
	/// A new `sql()` call discarded the remaining rows of an open result in
	/// strict mode.
	ResultLeak,
	/// A blocking call was interrupted by a cancel request or timeout.
	Interrupted,
	/// The underlying wire protocol reported a failure.
	ProtocolError,
	/// A condition that should be unreachable given the crate's own
	/// invariants.
	Internal,
	/// Tried to use a session/builder before its connection was initialized.
	ConnectionUninitialized,
	/// A channel to the background router was lost.
	Socket,
	/// A value failed to (de)serialize across a script-runtime boundary.
	Serialization,
	/// A value failed to (de)serialize across a script-runtime boundary.
	Deserialization,
}

impl ErrorKind {
	/// Sets a message directly on an error kind.
	pub fn with_message(self, message: impl Into<String>) -> Error {
		Error {
			kind: self,
			message: message.into(),
		}
	}

	/// Constructs an error from a kind and a lower-level cause, formatting
	/// the message the way each kind's caller naturally reads.
	pub fn with_context(self, context: impl fmt::Display) -> Error {
		let message = match self {
			ErrorKind::SqlError => format!("failed to perform query; {context}"),
			ErrorKind::UriParseError => format!("failed to parse connection string; {context}"),
			ErrorKind::Socket => format!("socket error; {context}"),
			ErrorKind::Interrupted => format!("operation interrupted; {context}"),
			_ => context.to_string(),
		};
		Error {
			kind: self,
			message,
		}
	}
}

/// The crate's error type.
///
/// Every error raised inside a bridge call is surfaced to the invoking
/// script runtime as a native error in that runtime, with [`Error::kind`]
/// preserved so the caller can match on it.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Error {
	kind: ErrorKind,
	message: String,
}

impl Error {
	/// The kind of this error.
	pub const fn kind(&self) -> ErrorKind {
		self.kind
	}

	/// The human-readable message, without any `"<API>: "` prefix.
	pub fn message(&self) -> &str {
		&self.message
	}

	/// Formats the error the way the shell's user-visible messages read:
	/// `"<API>: <human message>"`.
	pub fn for_api(api: &str, message: impl fmt::Display) -> Error {
		Error {
			kind: ErrorKind::ArgumentError,
			message: format!("{api}: {message}"),
		}
	}

	/// An `"Argument #N is expected to be a <kind>"` message, as specified.
	pub fn argument_kind(position: usize, expected: &str) -> Error {
		ErrorKind::ArgumentError
			.with_message(format!("Argument #{position} is expected to be a {expected}"))
	}

	/// An arity error message: `"Invalid number of arguments in <API>, expected M to N but got K"`.
	pub fn arity(api: &str, min: usize, max: usize, got: usize) -> Error {
		let expected = if min == max {
			format!("{min}")
		} else {
			format!("{min} to {max}")
		};
		ErrorKind::ArgumentError.with_message(format!(
			"Invalid number of arguments in {api}, expected {expected} but got {got}"
		))
	}
}

impl error::Error for Error {}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.message)
	}
}

impl From<serde_json::Error> for Error {
	fn from(error: serde_json::Error) -> Self {
		ErrorKind::Serialization.with_context(error)
	}
}

impl From<url::ParseError> for Error {
	fn from(error: url::ParseError) -> Self {
		ErrorKind::UriParseError.with_context(error)
	}
}

impl From<semver::Error> for Error {
	fn from(error: semver::Error) -> Self {
		ErrorKind::UriParseError.with_context(error)
	}
}

impl<T> From<flume::SendError<T>> for Error {
	fn from(error: flume::SendError<T>) -> Self {
		ErrorKind::Socket.with_context(error)
	}
}

impl From<flume::RecvError> for Error {
	fn from(error: flume::RecvError) -> Self {
		ErrorKind::Socket.with_context(error)
	}
}

impl From<std::io::Error> for Error {
	fn from(error: std::io::Error) -> Self {
		ErrorKind::Internal.with_context(error)
	}
}

#[cfg(feature = "scripting-js")]
impl From<js::Error> for Error {
	fn from(error: js::Error) -> Self {
		ErrorKind::ProtocolError.with_context(error)
	}
}

#[cfg(feature = "scripting-js")]
impl From<js::CaughtError<'_>> for Error {
	fn from(error: js::CaughtError) -> Self {
		match error {
			js::CaughtError::Exception(e) => ErrorKind::ProtocolError.with_message(format!(
				"An exception occurred{}: {}{}",
				e.file().map(|file| format!(" at {file}:{}", e.line().unwrap_or(-1))).unwrap_or_default(),
				e.message().unwrap_or_default(),
				e.stack().map(|stack| format!("\n{stack}")).unwrap_or_default()
			)),
			js::CaughtError::Error(js::Error::Unknown) => {
				ErrorKind::ProtocolError.with_message("An unknown error occurred")
			}
			other => ErrorKind::ProtocolError.with_context(other),
		}
	}
}

#[cfg(feature = "scripting-python")]
impl From<pyo3::PyErr> for Error {
	fn from(error: pyo3::PyErr) -> Self {
		ErrorKind::Internal.with_context(error)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn arity_message_matches_spec_pattern() {
		let err = Error::arity("Dba.createCluster", 1, 2, 0);
		assert_eq!(
			err.to_string(),
			"Invalid number of arguments in Dba.createCluster, expected 1 to 2 but got 0"
		);
	}

	#[test]
	fn argument_kind_message_matches_spec_pattern() {
		let err = Error::argument_kind(1, "string");
		assert_eq!(err.to_string(), "Argument #1 is expected to be a string");
	}

	#[test]
	fn kind_is_preserved_through_context() {
		let err = ErrorKind::SqlError.with_context("syntax error near X");
		assert_eq!(err.kind(), ErrorKind::SqlError);
	}
}
