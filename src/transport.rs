//! The seams between the client and the outside world.
//!
//! A [`Transport`] is one connection to a server. An [`Agent`] decides which connection each
//! request uses and what happens to a connection after its last cycle.

mod io;

pub use io::IoTransport;

use crate::error::Error;
use crate::request::RequestOptions;
use crate::{RequestId, SocketId};
use bytes::Bytes;
use std::task::{Context, Poll};
use std::time::Duration;

/// Something that happened on a connection.
#[derive(Debug)]
pub enum SocketEvent {
	/// Bytes arrived.
	Data(Bytes),

	/// The server finished sending.
	End,

	/// The connection is fully closed.
	Close,

	/// The connection failed. A [`Close`](Self::Close) follows.
	Error(std::io::Error),

	/// Buffered output has been written out.
	Drain,

	/// The connection was idle for longer than the timeout set with
	/// [`set_timeout`](Transport::set_timeout).
	Timeout,
}

/// One connection to a server.
///
/// The client calls these methods; activity on the connection reaches the client either through
/// [`poll_event`](Self::poll_event) or by the application calling the client’s `socket_*`
/// methods.
pub trait Transport {
	/// Queues bytes for sending.
	///
	/// Returns `false` if the caller should wait for [`SocketEvent::Drain`] before writing more.
	fn write(&mut self, data: &[u8]) -> bool;

	/// Finishes the sending side once queued bytes are written.
	fn end(&mut self);

	/// Tears the connection down immediately, discarding queued bytes.
	///
	/// The client treats the connection as closed from this point; the transport need not report
	/// [`SocketEvent::Close`] afterwards.
	fn destroy(&mut self, error: Option<&Error>);

	/// Closes the connection once queued bytes are written.
	///
	/// Returns `true` if the transport will report [`SocketEvent::Close`] when it is done. The
	/// default ends and destroys the connection on the spot and returns `false`, in which case the
	/// client treats the connection as closed immediately.
	fn destroy_soon(&mut self) -> bool {
		self.end();
		self.destroy(None);
		false
	}

	/// Arms (`Some`) or disarms (`None`) the inactivity timeout.
	fn set_timeout(&mut self, timeout: Option<Duration>);

	/// Enables or disables Nagle’s algorithm.
	fn set_no_delay(&mut self, _no_delay: bool) {}

	/// Enables or disables TCP keep-alive probes.
	fn set_keep_alive(&mut self, _enable: bool, _initial_delay: Duration) {}

	/// Returns whether bytes can still be sent.
	fn is_writable(&self) -> bool;

	/// Returns whether the connection is still being established.
	fn is_connecting(&self) -> bool {
		false
	}

	/// Reports the next thing that happened on the connection, if any.
	fn poll_event(&mut self, _cx: &mut Context<'_>) -> Poll<SocketEvent> {
		Poll::Pending
	}
}

/// A connection together with its identifier.
#[derive(Debug)]
pub struct Socket<S> {
	/// The identifier.
	pub id: SocketId,

	/// The connection.
	pub transport: S,
}

impl<S> Socket<S> {
	/// Pairs a connection with its identifier.
	pub fn new(id: SocketId, transport: S) -> Self {
		Self { id, transport }
	}
}

/// Decides which connection each request uses.
pub trait Agent<S: Transport> {
	/// Asks for a connection for a request.
	///
	/// Returns `Ok(Some(socket))` if one is available now. `Ok(None)` means the agent will hand
	/// one over later through [`Client::assign_socket`](crate::Client::assign_socket) or report
	/// failure through [`Client::connect_failed`](crate::Client::connect_failed).
	///
	/// # Errors
	/// An error means no connection could be made; the request fails with it.
	fn add_request(
		&mut self,
		request: RequestId,
		options: &RequestOptions,
	) -> std::io::Result<Option<Socket<S>>>;

	/// Takes back a connection that finished a cycle and can carry another.
	fn free_socket(&mut self, socket: Socket<S>);

	/// Forgets a connection that is closed or no longer managed by the client.
	fn remove_socket(&mut self, _socket: SocketId) {}

	/// Returns whether connections are reused across requests.
	fn keep_alive(&self) -> bool {
		false
	}

	/// Returns the default inactivity timeout for requests.
	fn timeout(&self) -> Option<Duration> {
		None
	}

	/// Returns the URL scheme, including the trailing colon, that this agent connects to.
	fn protocol(&self) -> &str {
		"http:"
	}
}

/// An agent that opens a fresh connection for every request and never reuses one.
pub struct Direct<F> {
	connect: F,
	next_id: u64,
}

impl<F> Direct<F> {
	/// Constructs an agent that calls `connect` for every request.
	pub fn new(connect: F) -> Self {
		Self {
			connect,
			next_id: 0,
		}
	}
}

impl<F> std::fmt::Debug for Direct<F> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
		f.debug_struct("Direct")
			.field("next_id", &self.next_id)
			.finish()
	}
}

impl<S, F> Agent<S> for Direct<F>
where
	S: Transport,
	F: FnMut(&RequestOptions) -> std::io::Result<S>,
{
	fn add_request(
		&mut self,
		request: RequestId,
		options: &RequestOptions,
	) -> std::io::Result<Option<Socket<S>>> {
		let transport = (self.connect)(options)?;
		let id = SocketId(self.next_id);
		self.next_id += 1;
		tracing::debug!(%request, socket = %id, host = %options.host, "Connection created");
		Ok(Some(Socket::new(id, transport)))
	}

	fn free_socket(&mut self, mut socket: Socket<S>) {
		// Nothing is pooled.
		socket.transport.destroy(None);
	}
}
