//! The Python script-runtime adapter: installs `mysql`, `mysqlx` and
//! `dba` as globals and marshals values between [`ShellValue`] and Python's
//! own object representation.
//!
//! A Bridge is wrapped in [`PyBridge`], a `#[pyclass]` whose `__getattr__`
//! resolves a name through [`crate::bridge::Bridge::get_member`] and, for a
//! callable member, returns a [`PyBoundMethod`] whose `__call__` re-enters
//! [`crate::bridge::Bridge::call`] — the same "resolve on access, not up
//! front" shape the JavaScript adapter's `Proxy` gives.

use crate::bridge::BridgeHandle;
use crate::err::{Error, ErrorKind};
use crate::modules::standard_modules;
use crate::protocol::ProtocolConnector;
use crate::value::Value as ShellValue;
use pyo3::exceptions::{PyAttributeError, PyRuntimeError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyTuple};
use std::fmt;

/// A script-visible Python handle to a Bridge.
#[derive(Debug)]
#[pyclass(name = "Bridge")]
pub struct PyBridge {
	handle: BridgeHandle,
}

#[pymethods]
impl PyBridge {
	fn __getattr__(&self, py: Python<'_>, name: &str) -> PyResult<PyObject> {
		let is_member = self.handle.lock().unwrap().members().contains(&name);
		if !is_member {
			return Err(PyAttributeError::new_err(format!("no attribute '{name}'")));
		}
		let value = self.handle.lock().unwrap().get_member(name).map_err(shell_err_to_py)?;
		if matches!(value, ShellValue::Undefined) {
			let bound = PyBoundMethod {
				handle: self.handle.clone(),
				member: name.to_string(),
			};
			return Ok(Py::new(py, bound)?.into_py(py));
		}
		into_py(py, &value)
	}

	fn __dir__(&self) -> Vec<String> {
		self.handle.lock().unwrap().members().iter().map(|m| m.to_string()).collect()
	}

	fn __repr__(&self) -> String {
		self.handle.lock().unwrap().class_name().to_string()
	}
}

/// A callable member bound to a [`PyBridge`], returned from `__getattr__`
/// in place of a plain Python `Callable` so it can carry the handle and
/// member name across to `__call__`.
#[derive(Debug)]
#[pyclass(name = "BoundMethod")]
pub struct PyBoundMethod {
	handle: BridgeHandle,
	member: String,
}

#[pymethods]
impl PyBoundMethod {
	#[pyo3(signature = (*args))]
	fn __call__(&self, py: Python<'_>, args: &Bound<'_, PyTuple>) -> PyResult<PyObject> {
		let shell_args = args
			.iter()
			.map(|a| from_py(&a))
			.collect::<Result<Vec<_>, Error>>()
			.map_err(shell_err_to_py)?;
		let result = self.handle.lock().unwrap().call(&self.member, &shell_args).map_err(shell_err_to_py)?;
		into_py(py, &result)
	}
}

fn shell_err_to_py(error: Error) -> PyErr {
	PyRuntimeError::new_err(error.message().to_string())
}

/// One script-runtime instance: owns nothing but the globals it installed,
/// since pyo3's interpreter is process-wide.
pub struct PythonAdapter {
	globals: Py<PyDict>,
}

impl fmt::Debug for PythonAdapter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PythonAdapter").finish_non_exhaustive()
	}
}

impl PythonAdapter {
	/// Builds a fresh adapter with `mysql`/`mysqlx`/`dba` installed as
	/// globals, using connector type `C` for every session opened through
	/// them.
	pub fn new<C>() -> Result<PythonAdapter, Error>
	where
		C: ProtocolConnector,
	{
		Python::with_gil(|py| -> Result<PythonAdapter, Error> {
			let globals = PyDict::new_bound(py);
			for (name, handle) in standard_modules::<C>() {
				let bridge = PyBridge {
					handle,
				};
				let obj = Py::new(py, bridge).map_err(Error::from)?;
				globals.set_item(name, obj).map_err(Error::from)?;
			}
			Ok(PythonAdapter {
				globals: globals.unbind(),
			})
		})
	}

	/// Evaluates `source` as an expression, returning its value marshaled
	/// back to a [`ShellValue`].
	pub fn eval(&self, source: &str) -> Result<ShellValue, Error> {
		Python::with_gil(|py| -> Result<ShellValue, Error> {
			let globals = self.globals.bind(py);
			let result = py.eval_bound(source, Some(globals), None).map_err(Error::from)?;
			from_py(&result)
		})
	}
}

impl From<PyErr> for Error {
	fn from(error: PyErr) -> Self {
		ErrorKind::Internal.with_context(error)
	}
}

/// Marshals a [`ShellValue`] into a Python object: scalars map one-to-one,
/// `Array`/`Map` become native `list`/`dict`, and `Object`/`Function`
/// become a [`PyBridge`]/bound callable.
fn into_py(py: Python<'_>, value: &ShellValue) -> PyResult<PyObject> {
	match value {
		ShellValue::Undefined => Ok(py.None()),
		ShellValue::Null => Ok(py.None()),
		ShellValue::Bool(b) => Ok(b.into_py(py)),
		ShellValue::Integer(v) => Ok(v.into_py(py)),
		ShellValue::UInteger(v) => Ok(v.into_py(py)),
		ShellValue::Float(v) => Ok(v.into_py(py)),
		ShellValue::String(s) => Ok(s.into_py(py)),
		ShellValue::Array(a) => {
			let items = a
				.lock()
				.unwrap()
				.iter()
				.map(|v| into_py(py, v))
				.collect::<PyResult<Vec<_>>>()?;
			Ok(PyList::new_bound(py, items).into_py(py))
		}
		ShellValue::Map(m) => {
			let dict = PyDict::new_bound(py);
			for (k, v) in m.lock().unwrap().iter() {
				dict.set_item(k, into_py(py, v)?)?;
			}
			Ok(dict.into_py(py))
		}
		ShellValue::MapRef(_) => into_py(py, &value.resolve()),
		ShellValue::Object(handle) => {
			let bridge = PyBridge {
				handle: handle.clone(),
			};
			Ok(Py::new(py, bridge)?.into_py(py))
		}
		ShellValue::Function(f) => {
			let bound = PyBoundMethod {
				handle: crate::bridge::handle(FunctionAsBridge(f.clone())),
				member: "__call__".to_string(),
			};
			Ok(Py::new(py, bound)?.into_py(py))
		}
	}
}

/// Adapts a [`crate::bridge::FunctionHandle`] into a single-member
/// [`crate::bridge::Bridge`] so [`PyBoundMethod`] can invoke a bare
/// function value the same way it invokes a named bridge method.
struct FunctionAsBridge(crate::bridge::FunctionHandle);

impl crate::bridge::Bridge for FunctionAsBridge {
	fn class_name(&self) -> &str {
		"Function"
	}
	fn members(&self) -> &[&str] {
		&["__call__"]
	}
	fn get_member(&self, name: &str) -> Result<ShellValue, Error> {
		crate::bridge::require_member(self.class_name(), self.members(), name)?;
		Ok(ShellValue::Undefined)
	}
	fn call(&mut self, _name: &str, args: &[ShellValue]) -> Result<ShellValue, Error> {
		self.0.invoke(args)
	}
}

/// Marshals a Python object back into a [`ShellValue`]: an `int` becomes
/// `Integer`, a `float` becomes `Float`, a `bool` is checked before `int`
/// since Python's `bool` is itself an `int` subtype.
fn from_py(value: &Bound<'_, PyAny>) -> Result<ShellValue, Error> {
	if value.is_none() {
		return Ok(ShellValue::Null);
	}
	if let Ok(b) = value.extract::<bool>() {
		return Ok(ShellValue::Bool(b));
	}
	if let Ok(i) = value.extract::<i64>() {
		return Ok(ShellValue::Integer(i));
	}
	if let Ok(f) = value.extract::<f64>() {
		return Ok(ShellValue::Float(f));
	}
	if let Ok(s) = value.extract::<String>() {
		return Ok(ShellValue::String(s));
	}
	if let Ok(list) = value.downcast::<PyList>() {
		let items = list.iter().map(|v| from_py(&v)).collect::<Result<Vec<_>, _>>()?;
		return Ok(ShellValue::array_from(items));
	}
	if let Ok(dict) = value.downcast::<PyDict>() {
		let mut entries = Vec::new();
		for (k, v) in dict.iter() {
			let key = k.extract::<String>().map_err(Error::from)?;
			entries.push((key, from_py(&v)?));
		}
		return Ok(ShellValue::map_from(entries));
	}
	if let Ok(bridge) = value.extract::<PyRef<PyBridge>>() {
		return Ok(ShellValue::Object(bridge.handle.clone()));
	}
	Err(ErrorKind::Deserialization.with_message("unsupported Python value in marshaling"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::connstr::ConnectionString;
	use crate::protocol::{Request, Response};
	use async_trait::async_trait;

	struct StubConnector;

	#[async_trait]
	impl ProtocolConnector for StubConnector {
		async fn connect(_conn_str: &ConnectionString) -> Result<Self, Error> {
			Ok(StubConnector)
		}

		async fn execute(&mut self, request: Request) -> Result<Response, Error> {
			match request {
				Request::Execute { .. } => Ok(Response::Results(Vec::new())),
				Request::Close => Ok(Response::Closed),
			}
		}
	}

	#[test]
	fn mysqlx_expr_is_reachable_through_getattr() {
		let adapter = PythonAdapter::new::<StubConnector>().unwrap();
		let result = adapter.eval("mysqlx.expr('1+1').text").unwrap();
		assert_eq!(result.as_string().unwrap(), "1+1");
	}

	#[test]
	fn dba_reports_fourteen_members_via_dir() {
		let adapter = PythonAdapter::new::<StubConnector>().unwrap();
		let result = adapter.eval("len(dir(dba))").unwrap();
		assert_eq!(result.as_int().unwrap(), 14);
	}
}
