//! The cluster-administration façade: the `dba` module bridge and the
//! `Cluster` handle it returns.
//!
//! The actual cluster-orchestration behavior (provisioning instances,
//! running group-replication bootstrap, and so on) lives in an external
//! collaborator this crate does not implement — this module covers only
//! the call signatures, arity and required option keys the bridge must
//! expose, validating the inputs it does understand and otherwise
//! returning call-signature-shaped stubs.

use crate::bridge::{handle, require_member, Bridge, BridgeHandle};
use crate::err::{Error, ErrorKind};
use crate::value::Value;

/// The 14 members the `dba` façade exposes. `dir(dba)`'s length and
/// membership are both load-bearing: a script introspecting the façade
/// must see exactly this set.
const DBA_MEMBERS: &[&str] = &[
	"createCluster",
	"deleteSandboxInstance",
	"deploySandboxInstance",
	"getCluster",
	"help",
	"killSandboxInstance",
	"resetSession",
	"startSandboxInstance",
	"checkInstanceConfiguration",
	"stopSandboxInstance",
	"dropMetadataSchema",
	"configureLocalInstance",
	"verbose",
	"rebootClusterFromCompleteOutage",
];

/// The `dba` module bridge.
#[derive(Debug)]
pub struct Dba;

impl Dba {
	/// Builds the `dba` module handle.
	pub fn new_handle() -> BridgeHandle {
		handle(Dba)
	}
}

impl Bridge for Dba {
	fn class_name(&self) -> &str {
		"Dba"
	}

	fn members(&self) -> &[&str] {
		DBA_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Ok(Value::Undefined)
	}

	fn call(&mut self, name: &str, args: &[Value]) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"createCluster" => create_cluster(args),
			"getCluster" => get_cluster(args),
			"help" => Ok(Value::String(
				"Dba: performs InnoDB cluster administration operations.".to_string(),
			)),
			// The remaining members are named-only: arity isn't constrained
			// beyond their listing, so any argument list is accepted and a
			// call-signature stub is returned. The actual orchestration
			// lives in an external collaborator this crate does not
			// implement.
			"deleteSandboxInstance"
			| "deploySandboxInstance"
			| "killSandboxInstance"
			| "resetSession"
			| "startSandboxInstance"
			| "checkInstanceConfiguration"
			| "stopSandboxInstance"
			| "dropMetadataSchema"
			| "configureLocalInstance"
			| "verbose"
			| "rebootClusterFromCompleteOutage" => Ok(Value::Undefined),
			_ => unreachable!("require_member already validated name"),
		}
	}
}

fn create_cluster(args: &[Value]) -> Result<Value, Error> {
	if args.is_empty() || args.len() > 2 {
		return Err(Error::arity("Dba.createCluster", 1, 2, args.len()));
	}
	let name = args[0].as_string().map_err(|_| Error::argument_kind(1, "string"))?;
	if name.is_empty() {
		return Err(Error::for_api("Dba.createCluster", "The Cluster name cannot be empty"));
	}
	validate_create_cluster_options(args.get(1))?;
	Ok(Value::Object(Cluster::new_handle(name.to_string())))
}

/// Validates `createCluster`'s options map: `memberSslMode` must be one of
/// `AUTO`/`DISABLED`/`REQUIRED`, `adoptFromGR` is mutually exclusive with
/// `memberSslMode`, `ipWhitelist` must be non-empty, and unknown keys are
/// rejected together in one message.
fn validate_create_cluster_options(options: Option<&Value>) -> Result<(), Error> {
	let options = match options {
		None | Some(Value::Undefined) => return Ok(()),
		Some(v) => v,
	};
	let map = options.as_map().map_err(|_| Error::argument_kind(2, "map"))?;
	let guard = map.lock().unwrap();

	const KNOWN: &[&str] = &["memberSslMode", "adoptFromGR", "ipWhitelist"];
	let mut unknown: Vec<&str> = guard.keys().map(String::as_str).filter(|k| !KNOWN.contains(k)).collect();
	if !unknown.is_empty() {
		unknown.sort_unstable();
		return Err(Error::for_api(
			"Dba.createCluster",
			format!("Invalid values in the options: {}", unknown.join(", ")),
		));
	}

	let ssl_mode = match guard.get("memberSslMode") {
		Some(v) => Some(v.as_string().map_err(|_| Error::argument_kind(2, "string"))?.to_string()),
		None => None,
	};
	if let Some(mode) = &ssl_mode {
		if !["AUTO", "DISABLED", "REQUIRED"].contains(&mode.as_str()) {
			return Err(Error::for_api(
				"Dba.createCluster",
				"Invalid value for memberSslMode option. Supported values: AUTO,DISABLED,REQUIRED.",
			));
		}
	}

	if let Some(adopt) = guard.get("adoptFromGR") {
		let adopt = adopt.as_bool().map_err(|_| Error::argument_kind(2, "bool"))?;
		if adopt && ssl_mode.is_some() {
			return Err(Error::for_api(
				"Dba.createCluster",
				"Cannot use memberSslMode option if adoptFromGR is set to true.",
			));
		}
	}

	if let Some(wl) = guard.get("ipWhitelist") {
		let wl = wl.as_string().map_err(|_| Error::argument_kind(2, "string"))?;
		if wl.is_empty() {
			return Err(Error::for_api("Dba.createCluster", "ipWhitelist cannot be empty"));
		}
	}

	Ok(())
}

fn get_cluster(args: &[Value]) -> Result<Value, Error> {
	let name = match args.first() {
		Some(v) => v.as_string().map_err(|_| Error::argument_kind(1, "string"))?.to_string(),
		None => "default".to_string(),
	};
	Ok(Value::Object(Cluster::new_handle(name)))
}

const CLUSTER_MEMBERS: &[&str] = &["name"];

/// The `<Cluster:NAME>` handle `createCluster`/`getCluster` return.
#[derive(Debug)]
pub struct Cluster {
	full_class_name: String,
	name: String,
}

impl Cluster {
	/// Builds a cluster handle named `name`.
	pub fn new_handle(name: String) -> BridgeHandle {
		handle(Cluster {
			full_class_name: format!("Cluster:{name}"),
			name,
		})
	}
}

impl Bridge for Cluster {
	fn class_name(&self) -> &str {
		&self.full_class_name
	}

	fn members(&self) -> &[&str] {
		CLUSTER_MEMBERS
	}

	fn get_member(&self, name: &str) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		match name {
			"name" => Ok(Value::String(self.name.clone())),
			_ => Ok(Value::Undefined),
		}
	}

	fn call(&mut self, name: &str, _args: &[Value]) -> Result<Value, Error> {
		require_member(self.class_name(), self.members(), name)?;
		Err(ErrorKind::UnknownMember.with_message(format!("{} has no callable member '{name}'", self.class_name())))
	}
}
