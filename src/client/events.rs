use super::binding::retire;
use super::sink::ResponseSink;
use super::state::State;
use super::task::Task;
use super::Client;
use crate::error::{Error, ParseError, Reset};
use crate::event::{Event, EventKind, Interest};
use crate::parser::ParseResult;
use crate::request::OutgoingMessage as _;
use crate::transport::{Agent, Transport};
use crate::SocketId;
use bytes::Bytes;

/// How a batch of received bytes left the response.
enum Fed {
	/// More bytes are needed.
	Pending,

	/// The final response ended.
	Complete,

	/// The connection switched protocols after this many bytes.
	Upgrade(usize),

	/// The bytes were malformed.
	Failed(ParseError),
}

impl<S: Transport, A: Agent<S>> Client<S, A> {
	/// Delivers bytes received on a connection.
	pub fn socket_data(&mut self, socket: SocketId, data: Bytes) {
		let Self {
			requests,
			bindings,
			parsers,
			events,
			..
		} = self;
		let binding = match bindings.get_mut(&socket) {
			Some(binding) if binding.listeners.data => binding,
			_ => return,
		};
		let id = binding.request;
		let cycle = match requests.get_mut(&id) {
			Some(cycle) => cycle,
			None => return,
		};
		let handle = match binding.parser.take() {
			Some(handle) => handle,
			None => return,
		};

		let mut offset = 0;
		let mut completed = false;
		let mut upgrade_head = None;
		let fed = loop {
			let mut sink = ResponseSink::new(id, cycle, events);
			let result = parsers.feed(&handle, &data[offset..], &mut sink);
			completed |= sink.completed;
			if let Some(head) = sink.upgrade_head.take() {
				upgrade_head = Some(head);
			}
			match result {
				ParseResult::NeedMore => break if completed { Fed::Complete } else { Fed::Pending },
				ParseResult::MessageComplete(n) => {
					offset += n;
					if offset == data.len() {
						break Fed::Complete;
					}
				}
				ParseResult::Upgrade(n) => break Fed::Upgrade(offset + n),
				ParseResult::Error { kind, bytes_parsed } => {
					break Fed::Failed(ParseError {
						kind,
						bytes_parsed: offset + bytes_parsed,
						raw_packet: data.clone(),
					});
				}
			}
		};

		match fed {
			Fed::Pending => binding.parser = Some(handle),

			Fed::Complete => {
				retire(parsers, handle);
				binding.listeners.data = false;
				self.response_on_end(id);
			}

			Fed::Failed(error) => {
				tracing::warn!(request = %id, %socket, %error, "Malformed response");
				retire(parsers, handle);
				binding.listeners.detach_data_path();
				cycle.timeout.disarm(Some(&mut *binding));
				let error = Error::Parse(error);
				binding.socket.transport.destroy(Some(&error));
				if !cycle.had_error {
					cycle.had_error = true;
					events.push_back(Event {
						request: id,
						kind: EventKind::Error { error },
					});
				}
				cycle.fail(id, State::Errored);
				self.deferred.push_back(Task::SocketClose(socket));
			}

			Fed::Upgrade(at) => {
				retire(parsers, handle);
				let interest = cycle.switch_kind();
				let head = match upgrade_head {
					Some(head) if cycle.wants(interest) => head,
					_ => {
						tracing::debug!(request = %id, %socket, "Protocol switch not taken");
						binding.listeners.detach_data_path();
						binding.socket.transport.destroy(None);
						cycle.transition(id, State::Done);
						self.deferred.push_back(Task::SocketClose(socket));
						return;
					}
				};
				let body_head = data.slice(at..);
				let mut binding = match bindings.remove(&socket) {
					Some(binding) => binding,
					None => return,
				};
				binding.listeners.detach_all();
				cycle.timeout.disarm(Some(&mut binding));
				cycle.destroyed = true;
				cycle.socket = None;
				cycle.transition(id, State::Done);
				tracing::debug!(request = %id, %socket, status = head.status, "Connection handed over");
				let kind = match interest {
					Interest::Upgrade => EventKind::Upgrade {
						head,
						socket: binding.socket,
						body_head,
					},
					Interest::Connect => EventKind::Connect {
						head,
						socket: binding.socket,
						body_head,
					},
				};
				let _ = requests.remove(&id);
				self.agent.remove_socket(socket);
				self.emit(id, kind);
				tracing::debug!(request = %id, "Request closed");
				self.emit(id, EventKind::Close);
			}
		}
	}

	/// Delivers the end of the server’s sending side.
	pub fn socket_end(&mut self, socket: SocketId) {
		let Self {
			requests,
			bindings,
			parsers,
			events,
			deferred,
			..
		} = self;
		let binding = match bindings.get_mut(&socket) {
			Some(binding) if binding.listeners.end => binding,
			_ => return,
		};
		let id = binding.request;
		let cycle = match requests.get_mut(&id) {
			Some(cycle) => cycle,
			None => return,
		};
		tracing::debug!(request = %id, %socket, "Server ended the connection");

		if cycle.res.is_none() && !cycle.had_error {
			cycle.had_error = true;
			events.push_back(Event {
				request: id,
				kind: EventKind::Error {
					error: Error::ConnectionReset(Reset::HangUp),
				},
			});
			cycle.fail(id, State::Errored);
		}

		if let Some(handle) = binding.parser.take() {
			let mut sink = ResponseSink::new(id, cycle, events);
			let result = parsers.finish(&handle, &mut sink);
			let completed = sink.completed;
			parsers.release(handle);
			if completed {
				cycle.ended = true;
				cycle.transition(id, State::Done);
			} else if let Err(e) = result {
				tracing::debug!(request = %id, error = %e, "Response cut short");
			}
		}

		binding.listeners.detach_data_path();
		cycle.timeout.disarm(Some(&mut *binding));
		binding.socket.transport.destroy(None);
		deferred.push_back(Task::SocketClose(socket));
	}

	/// Delivers the closing of a connection.
	///
	/// This is where every request bound to a connection that did not go back to the agent ends.
	pub fn socket_close(&mut self, socket: SocketId) {
		match self.bindings.get(&socket) {
			Some(binding) if binding.listeners.close => (),
			_ => return,
		}
		let mut binding = match self.bindings.remove(&socket) {
			Some(binding) => binding,
			None => return,
		};
		binding.free_parser(&mut self.parsers);
		self.agent.remove_socket(socket);

		let id = binding.request;
		let mut cycle = match self.requests.remove(&id) {
			Some(cycle) => cycle,
			None => return,
		};
		cycle.timeout.disarm(Some(&mut binding));
		cycle.destroyed = true;
		let quiet = cycle.had_error || cycle.aborted;
		match &mut cycle.res {
			Some(res) if !res.is_complete() && !res.is_aborted() => {
				tracing::debug!(request = %id, %socket, "Connection closed mid-response");
				res.mark_aborted();
				let end = res.end();
				self.emit(id, EventKind::ResponseAborted);
				if end {
					self.emit(id, EventKind::ResponseEnd);
				}
				if !quiet {
					self.emit(id, EventKind::Error {
						error: Error::ConnectionReset(Reset::Aborted),
					});
				}
			}
			Some(_) => (),
			None => {
				if !quiet {
					self.emit(id, EventKind::Error {
						error: Error::ConnectionReset(Reset::HangUp),
					});
				}
			}
		}
		tracing::debug!(request = %id, "Request closed");
		self.emit(id, EventKind::Close);
	}

	/// Delivers a connection failure.
	///
	/// The transport is expected to close afterwards; the request ends when it does.
	pub fn socket_error(&mut self, socket: SocketId, error: std::io::Error) {
		let Self {
			requests,
			bindings,
			parsers,
			events,
			..
		} = self;
		let binding = match bindings.get_mut(&socket) {
			Some(binding) if binding.listeners.error => binding,
			_ => return,
		};
		let id = binding.request;
		let cycle = match requests.get_mut(&id) {
			Some(cycle) => cycle,
			None => return,
		};
		tracing::debug!(request = %id, %socket, %error, "Connection failed");
		if !cycle.had_error {
			cycle.had_error = true;
			events.push_back(Event {
				request: id,
				kind: EventKind::Error {
					error: Error::Transport(error),
				},
			});
		}
		binding.free_parser(parsers);
		binding.listeners.detach_data_path();
		cycle.timeout.disarm(Some(&mut *binding));
		cycle.fail(id, State::Errored);
	}

	/// Delivers the news that a connection’s output buffer emptied.
	pub fn socket_drain(&mut self, socket: SocketId) {
		let id = match self.bindings.get(&socket) {
			Some(binding) if binding.listeners.drain => binding.request,
			_ => return,
		};
		let drain = match self.requests.get_mut(&id) {
			Some(cycle) if cycle.needs_drain && !cycle.req.outgoing().is_finished() => {
				cycle.needs_drain = false;
				true
			}
			_ => false,
		};
		if drain {
			self.emit(id, EventKind::Drain);
		}
	}

	/// Delivers the expiry of a connection’s inactivity timeout.
	pub fn socket_timeout(&mut self, socket: SocketId) {
		let id = match self.bindings.get(&socket) {
			Some(binding) if binding.listeners.timeout => binding.request,
			_ => return,
		};
		tracing::debug!(request = %id, %socket, "Timed out");
		self.emit(id, EventKind::Timeout);
	}
}
