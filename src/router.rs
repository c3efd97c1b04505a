//! Background dispatch for session I/O.
//!
//! One `flume` channel carries requests to a dedicated worker, which holds
//! the actual [`crate::protocol::ProtocolConnector`] and replies on a
//! per-call response channel. Every bridge-facing call in this crate is
//! synchronous, though — `Router::dispatch` blocks the calling thread on
//! `Receiver::recv` instead of returning a `Future`, and the worker itself
//! runs a single-threaded Tokio runtime on its own OS thread so a
//! `ProtocolConnector`'s async `execute` still has an executor to run on.

use crate::connstr::ConnectionString;
use crate::err::{Error, ErrorKind};
use crate::protocol::{ProtocolConnector, Request, Response};
use flume::{Receiver, Sender};
use std::future::Future;
use std::thread::JoinHandle;
use std::time::Duration;

struct Route {
	request: Request,
	response: Sender<Result<Response, Error>>,
}

/// Owns the background worker thread that serializes access to one
/// [`ProtocolConnector`].
#[derive(Debug)]
pub struct Router {
	sender: Sender<Option<Route>>,
	worker: Option<JoinHandle<()>>,
}

impl Router {
	/// Connects to `conn_str` using connector type `C` and spawns the
	/// background worker.
	///
	/// `connect_timeout`/`socket_timeout` each map a still-pending connect
	/// or request to [`ErrorKind::Interrupted`] once it elapses, the same
	/// error a cancel request surfaces.
	pub fn connect<C>(
		conn_str: ConnectionString,
		connect_timeout: Option<Duration>,
		socket_timeout: Option<Duration>,
	) -> Result<Router, Error>
	where
		C: ProtocolConnector,
	{
		let (tx, rx) = flume::unbounded::<Option<Route>>();
		let (ready_tx, ready_rx) = flume::bounded::<Result<(), Error>>(1);

		let worker = std::thread::Builder::new()
			.name("shellcore-router".into())
			.spawn(move || run_worker::<C>(conn_str, connect_timeout, socket_timeout, rx, ready_tx))
			.map_err(|e| ErrorKind::Internal.with_context(e))?;

		ready_rx
			.recv()
			.map_err(|e| ErrorKind::Internal.with_context(e))??;

		Ok(Router {
			sender: tx,
			worker: Some(worker),
		})
	}

	/// Sends a request to the worker and blocks until it answers.
	pub fn dispatch(&self, request: Request) -> Result<Response, Error> {
		let (response_tx, response_rx) = flume::bounded(1);
		self.sender
			.send(Some(Route {
				request,
				response: response_tx,
			}))
			.map_err(|e| ErrorKind::Socket.with_context(e))?;
		response_rx
			.recv()
			.map_err(|e| ErrorKind::Socket.with_context(e))?
	}
}

impl Drop for Router {
	fn drop(&mut self) {
		let _res = self.sender.send(None);
		if let Some(worker) = self.worker.take() {
			let _res = worker.join();
		}
	}
}

/// Runs `fut` to completion, or fails [`ErrorKind::Interrupted`] once
/// `budget` elapses first.
async fn with_timeout<F: Future<Output = Result<T, Error>>, T>(
	budget: Option<Duration>,
	fut: F,
) -> Result<T, Error> {
	match budget {
		None => fut.await,
		Some(dur) => match tokio::time::timeout(dur, fut).await {
			Ok(result) => result,
			Err(_elapsed) => Err(ErrorKind::Interrupted.with_message("operation timed out")),
		},
	}
}

fn run_worker<C>(
	conn_str: ConnectionString,
	connect_timeout: Option<Duration>,
	socket_timeout: Option<Duration>,
	rx: Receiver<Option<Route>>,
	ready: Sender<Result<(), Error>>,
)
where
	C: ProtocolConnector,
{
	let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
		Ok(rt) => rt,
		Err(e) => {
			let _res = ready.send(Err(ErrorKind::Internal.with_context(e)));
			return;
		}
	};

	let mut connector =
		match runtime.block_on(with_timeout(connect_timeout, C::connect(&conn_str))) {
			Ok(c) => {
				let _res = ready.send(Ok(()));
				c
			}
			Err(e) => {
				let _res = ready.send(Err(e));
				return;
			}
		};

	while let Ok(Some(route)) = rx.recv() {
		let result = runtime.block_on(with_timeout(socket_timeout, connector.execute(route.request)));
		tracing::trace!("router dispatched one request");
		let _res = route.response.send(result);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;

	struct EchoConnector;

	#[async_trait]
	impl ProtocolConnector for EchoConnector {
		async fn connect(_conn_str: &ConnectionString) -> Result<Self, Error> {
			Ok(EchoConnector)
		}

		async fn execute(&mut self, request: Request) -> Result<Response, Error> {
			match request {
				Request::Execute { .. } => Ok(Response::Results(Vec::new())),
				Request::Close => Ok(Response::Closed),
			}
		}
	}

	struct SlowConnector;

	#[async_trait]
	impl ProtocolConnector for SlowConnector {
		async fn connect(_conn_str: &ConnectionString) -> Result<Self, Error> {
			tokio::time::sleep(Duration::from_millis(50)).await;
			Ok(SlowConnector)
		}

		async fn execute(&mut self, request: Request) -> Result<Response, Error> {
			tokio::time::sleep(Duration::from_millis(50)).await;
			match request {
				Request::Execute { .. } => Ok(Response::Results(Vec::new())),
				Request::Close => Ok(Response::Closed),
			}
		}
	}

	fn conn_str() -> ConnectionString {
		crate::connstr::ConnectionString::parse("root@localhost", crate::connstr::Protocol::Classic).unwrap()
	}

	#[test]
	fn dispatch_round_trips_through_the_worker_thread() {
		let router = Router::connect::<EchoConnector>(conn_str(), None, None).unwrap();
		let response = router
			.dispatch(Request::Execute {
				statement: "select 1".into(),
				positional: Vec::new(),
				named: Default::default(),
			})
			.unwrap();
		assert!(matches!(response, Response::Results(blocks) if blocks.is_empty()));
	}

	#[test]
	fn connect_timeout_fails_interrupted() {
		let err = Router::connect::<SlowConnector>(conn_str(), Some(Duration::from_millis(1)), None)
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Interrupted);
	}

	#[test]
	fn socket_timeout_fails_interrupted() {
		let router =
			Router::connect::<SlowConnector>(conn_str(), None, Some(Duration::from_millis(1))).unwrap();
		let err = router
			.dispatch(Request::Execute {
				statement: "select sleep(1)".into(),
				positional: Vec::new(),
				named: Default::default(),
			})
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Interrupted);
	}
}
