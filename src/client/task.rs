use super::Client;
use crate::error::Error;
use crate::event::{Event, EventKind};
use crate::transport::{Agent, Socket, Transport};
use crate::{RequestId, SocketId};

/// Work that must run after the current call returns.
///
/// Tasks run in order from [`Client::run_deferred`], or from the client’s `Stream` implementation
/// once every queued notification has been taken. A task queued while tasks are running runs in
/// the same pass.
#[derive(Debug)]
pub(super) enum Task<S> {
	/// Ask the agent for a connection.
	Dispatch(RequestId),

	/// The agent answered.
	OnSocket(RequestId, std::io::Result<Socket<S>>),

	/// A connection the client destroyed is gone.
	SocketClose(SocketId),

	/// Report an abort.
	EmitAbort(RequestId),

	/// Report the end of a request that never had a connection, with its error if any.
	EmitClose(RequestId, Option<Error>),

	/// Report the end of a request whose connection goes back to the agent, then return it.
	EmitFree(RequestId, Socket<S>),
}

impl<S: Transport, A: Agent<S>> Client<S, A> {
	pub(super) fn run_task(&mut self, task: Task<S>) {
		match task {
			Task::Dispatch(id) => self.dispatch(id),
			Task::OnSocket(id, result) => self.on_socket(id, result),
			Task::SocketClose(socket) => self.socket_close(socket),
			Task::EmitAbort(id) => {
				if self.requests.contains_key(&id) {
					self.emit(id, EventKind::Abort);
				}
			}
			Task::EmitClose(id, error) => {
				if self.requests.remove(&id).is_some() {
					if let Some(error) = error {
						self.emit(id, EventKind::Error { error });
					}
					tracing::debug!(request = %id, "Request closed");
					self.emit(id, EventKind::Close);
				}
			}
			Task::EmitFree(id, socket) => {
				if self.requests.remove(&id).is_some() {
					tracing::debug!(request = %id, "Request closed");
					self.emit(id, EventKind::Close);
				}
				tracing::debug!(request = %id, socket = %socket.id, "Connection returned to agent");
				self.agent.free_socket(socket);
			}
		}
	}

	pub(super) fn emit(&mut self, request: RequestId, kind: EventKind<S>) {
		self.events.push_back(Event { request, kind });
	}
}
