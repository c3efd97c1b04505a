#![forbid(unsafe_code)]
#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(test, deny(warnings))]

//! An interactive, multi-language database shell core.
//!
//! This crate is the embeddable half of a MySQL-family shell: a tagged
//! dynamic value shared across surfaces ([`value`]), a single polymorphic
//! object protocol every script-visible object implements ([`bridge`]), the
//! session and result-set contract ([`session`]), CRUD builder state
//! machines for document collections and relational tables
//! ([`builder::collection`], [`builder::table`]), a connection-string
//! parser ([`connstr`]), a client-side UUID generator ([`uuid_gen`]), the
//! cluster-administration façade ([`cluster`]), and the script runtime
//! adapters that embed all of the above into JavaScript and Python
//! ([`adapter`]).
//!
//! The wire protocol itself is an external collaborator: anything
//! implementing [`protocol::ProtocolConnector`] can be plugged into
//! [`session::Session::connect`] to back a live connection.
//!
//! # Examples
//!
//! ```no_run
//! use shellcore::connstr::{ConnectionString, Protocol};
//! use shellcore::session::{Session, SessionKind, SessionOptions};
//!
//! # async fn dox<C: shellcore::protocol::ProtocolConnector>() -> shellcore::Result<()> {
//! let conn_str = ConnectionString::parse("root@localhost:3306", Protocol::Classic)?;
//! let session = Session::connect::<C>(SessionKind::Classic, conn_str, SessionOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod bridge;
pub mod builder;
pub mod cluster;
pub mod connstr;
mod err;
pub mod expr;
pub mod mapper;
pub mod modules;
pub mod protocol;
mod router;
pub mod schema;
pub mod session;
pub mod uuid_gen;
pub mod value;

pub use err::Error;
pub use err::ErrorKind;

/// Result type returned throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
