use crate::parser::{Discard, ParserHandle, ParserPool};
use crate::transport::Socket;
use crate::RequestId;

/// Which socket events the bound request currently reacts to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(super) struct Listeners {
	pub data: bool,
	pub end: bool,
	pub close: bool,
	pub error: bool,
	pub drain: bool,
	pub timeout: bool,
}

impl Listeners {
	/// Everything except the timeout, which is armed separately.
	fn attached() -> Self {
		Self {
			data: true,
			end: true,
			close: true,
			error: true,
			drain: true,
			timeout: false,
		}
	}

	/// Stops reacting to the events that drive a cycle forward.
	///
	/// `close` and `error` stay attached so that the end of the connection is still noticed.
	pub fn detach_data_path(&mut self) {
		self.data = false;
		self.end = false;
		self.drain = false;
		self.timeout = false;
	}

	/// Stops reacting to anything; the connection is leaving the client.
	pub fn detach_all(&mut self) {
		*self = Self::default();
	}
}

/// The pairing of one connection with the one request it is carrying.
#[derive(Debug)]
pub(super) struct Binding<S> {
	pub socket: Socket<S>,
	pub request: RequestId,
	pub parser: Option<ParserHandle>,
	pub listeners: Listeners,
}

impl<S> Binding<S> {
	pub fn new(socket: Socket<S>, request: RequestId, parser: ParserHandle) -> Self {
		Self {
			socket,
			request,
			parser: Some(parser),
			listeners: Listeners::attached(),
		}
	}

	/// Finishes and releases the parser if it has not been already.
	pub fn free_parser(&mut self, parsers: &mut ParserPool) {
		if let Some(handle) = self.parser.take() {
			retire(parsers, handle);
		}
	}
}

/// Finishes a parser, discarding anything it still had, and returns it to the pool.
pub(super) fn retire(parsers: &mut ParserPool, handle: ParserHandle) {
	if let Err(e) = parsers.finish(&handle, &mut Discard) {
		tracing::trace!(error = %e, "Parser held a partial message");
	}
	parsers.release(handle);
}
