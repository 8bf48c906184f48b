use crate::error::Error;
use crate::response::ResponseHead;
use crate::transport::Socket;
use crate::{RequestId, SocketId};
use bytes::Bytes;

/// A notification about one request.
#[derive(Debug)]
pub struct Event<S> {
	/// The request the notification is about.
	pub request: RequestId,

	/// What happened.
	pub kind: EventKind<S>,
}

/// The things that can happen to a request.
#[derive(Debug)]
pub enum EventKind<S> {
	/// A connection was bound to the request.
	Socket {
		/// The connection.
		socket: SocketId,
	},

	/// The final response head arrived.
	Response {
		/// The status line and headers.
		head: ResponseHead,
	},

	/// A piece of the response body arrived.
	ResponseData {
		/// The decoded body bytes.
		data: Bytes,
	},

	/// The response body ended. Sent once per response, including after an abort.
	ResponseEnd,

	/// The connection closed before the response body was complete.
	ResponseAborted,

	/// An informational (1xx other than 101) response arrived.
	Information {
		/// The status line and headers.
		head: ResponseHead,
	},

	/// A 100 Continue response arrived. Followed by an [`Information`](Self::Information).
	Continue,

	/// The server switched protocols and the connection now belongs to the application.
	Upgrade {
		/// The 101 response.
		head: ResponseHead,

		/// The connection, no longer managed by the client or its agent.
		socket: Socket<S>,

		/// Bytes that arrived after the response head.
		body_head: Bytes,
	},

	/// A `CONNECT` request succeeded and the connection now belongs to the application.
	Connect {
		/// The response.
		head: ResponseHead,

		/// The connection, no longer managed by the client or its agent.
		socket: Socket<S>,

		/// Bytes that arrived after the response head.
		body_head: Bytes,
	},

	/// The connection was idle for longer than the request’s timeout.
	Timeout,

	/// The request failed.
	Error {
		/// Why.
		error: Error,
	},

	/// The request was aborted by the application.
	Abort,

	/// The request is over. Nothing else is reported about it afterwards.
	Close,

	/// The connection has room for more body data.
	Drain,
}

/// The protocol switches an application can take over.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Interest {
	/// 101 Switching Protocols responses.
	Upgrade,

	/// Responses to `CONNECT` requests.
	Connect,
}
