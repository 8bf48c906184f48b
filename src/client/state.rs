/// Where a request is in its cycle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum State {
	/// Created; nothing has been serialized.
	Idle,

	/// The head is serialized and waiting for a connection to be requested.
	HeadersQueued,

	/// A connection has been requested from the agent.
	AwaitingSocket,

	/// Bound to a connection; the request is being sent.
	Active,

	/// The request has been sent in full; no response head yet.
	ResponseHeaderWait,

	/// The final response head arrived; its body is arriving.
	ResponseBodyStreaming,

	/// The response ended or the connection was handed over.
	Done,

	/// The application aborted or destroyed the request.
	Aborted,

	/// The request failed.
	Errored,
}

impl State {
	/// Returns whether the cycle is over.
	#[must_use]
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Done | Self::Aborted | Self::Errored)
	}

	/// Returns whether a request in this state may move to `next`.
	pub(super) fn can_become(self, next: Self) -> bool {
		use State::{
			Aborted, Active, AwaitingSocket, Done, Errored, HeadersQueued, Idle,
			ResponseBodyStreaming, ResponseHeaderWait,
		};
		match (self, next) {
			(Idle, HeadersQueued)
			| (Idle, AwaitingSocket)
			| (HeadersQueued, AwaitingSocket)
			| (AwaitingSocket, Active)
			| (Active, ResponseHeaderWait)
			| (Active, ResponseBodyStreaming)
			| (Active, Done)
			| (ResponseHeaderWait, ResponseBodyStreaming)
			| (ResponseHeaderWait, Done)
			| (ResponseBodyStreaming, Done) => true,
			(from, Aborted) | (from, Errored) => !from.is_terminal(),
			_ => false,
		}
	}
}
