//! The response half of a request/response cycle.

use crate::headers::HeaderMap;

/// An HTTP status line and response headers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResponseHead {
	/// The HTTP minor version number.
	///
	/// For example, for HTTP/1.0, this is zero; for HTTP/1.1, this is 1.
	pub minor_version: u8,

	/// The status code.
	pub status: u16,

	/// The reason phrase.
	pub reason: String,

	/// The response headers, in the order received.
	pub headers: HeaderMap,

	/// Whether the server is willing to keep the connection open after this response.
	///
	/// This is true for HTTP/1.1 responses without `Connection: close` and for HTTP/1.0 responses
	/// with `Connection: keep-alive`, except that a response whose body runs until the connection
	/// closes never keeps the connection alive.
	pub keep_alive: bool,

	/// Whether this is a 101 Switching Protocols response.
	pub upgrade: bool,
}

impl ResponseHead {
	/// Returns whether the status code is in the 1xx range.
	#[must_use]
	pub fn is_informational(&self) -> bool {
		(100..200).contains(&self.status)
	}
}

/// Bookkeeping for the final response attached to a request.
///
/// The body itself is not stored here; it is handed to the consumer as it arrives.
#[derive(Debug)]
pub(crate) struct IncomingResponse {
	/// The status code of the response.
	status: u16,

	/// Whether the parser has seen the end of the message.
	complete: bool,

	/// Whether the connection went away before the message was complete.
	aborted: bool,

	/// Whether the consumer asked for the rest of the body to be discarded.
	dumped: bool,

	/// Whether the end of the body has been reported to the consumer.
	ended: bool,

	/// How many body bytes have arrived, delivered or not.
	received: u64,
}

impl IncomingResponse {
	pub(crate) fn new(status: u16) -> Self {
		Self {
			status,
			complete: false,
			aborted: false,
			dumped: false,
			ended: false,
			received: 0,
		}
	}

	pub(crate) fn status(&self) -> u16 {
		self.status
	}

	pub(crate) fn is_complete(&self) -> bool {
		self.complete
	}

	pub(crate) fn mark_complete(&mut self) {
		self.complete = true;
	}

	pub(crate) fn is_aborted(&self) -> bool {
		self.aborted
	}

	pub(crate) fn mark_aborted(&mut self) {
		self.aborted = true;
	}

	/// Discards all further body data.
	///
	/// Returns `false` if the body was already being discarded.
	pub(crate) fn dump(&mut self) -> bool {
		!std::mem::replace(&mut self.dumped, true)
	}

	/// Accounts for `len` body bytes and returns whether they should be passed to the consumer.
	pub(crate) fn accept(&mut self, len: usize) -> bool {
		self.received += len as u64;
		!self.dumped && !self.ended
	}

	/// Returns the number of body bytes received so far.
	pub(crate) fn received(&self) -> u64 {
		self.received
	}

	/// Marks the end of the body as reported.
	///
	/// Returns `true` the first time only, so that the end is reported to the consumer once.
	pub(crate) fn end(&mut self) -> bool {
		!std::mem::replace(&mut self.ended, true)
	}
}
