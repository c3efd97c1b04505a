//! Script runtime adapters: the two concrete embeddings of the object
//! bridge protocol into a scripting language, installing `mysql`, `mysqlx`
//! and `dba` as globals and marshaling values across the language boundary
//! using a fixed type mapping.
//!
//! Each adapter is gated behind its own crate feature so a consumer that
//! only needs one scripting language does not pull in the other's runtime.

#[cfg(feature = "scripting-js")]
pub mod js;

#[cfg(feature = "scripting-python")]
pub mod python;
