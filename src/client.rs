//! The request/response state machine.

mod binding;
mod cycle;
mod events;
mod sink;
mod state;
mod task;
mod timeout;

#[cfg(test)]
mod test;

pub use state::State;

use crate::config::ClientConfig;
use crate::error::{Error, Reset, Usage};
use crate::event::{Event, EventKind, Interest};
use crate::parser::{ParserKind, ParserPool, PoolStats, Settings};
use crate::request::{ClientRequest, OutgoingMessage, RequestOptions};
use crate::transport::{Agent, Socket, SocketEvent, Transport};
use crate::{RequestId, SocketId};
use binding::Binding;
use cycle::Cycle;
use futures_core::Stream;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use task::Task;

/// Drives HTTP/1.1 request/response cycles over connections supplied by an [`Agent`].
///
/// The client performs no I/O on its own. Connection activity is delivered through
/// [`handle_socket_event`](Self::handle_socket_event) or the individual `socket_*` methods, and
/// whatever the client has to say comes out of [`poll_event`](Self::poll_event). Some work is
/// deferred until the current call has returned; [`run_deferred`](Self::run_deferred) performs
/// it.
///
/// When the transports can poll themselves, the [`Stream`] implementation does all of this: it
/// yields notifications, runs deferred work when no notification is waiting, and polls every
/// bound transport.
#[derive(Debug)]
pub struct Client<S, A> {
	agent: A,
	config: ClientConfig,
	next_id: u64,
	requests: HashMap<RequestId, Cycle>,
	bindings: HashMap<SocketId, Binding<S>>,
	parsers: ParserPool,
	events: VecDeque<Event<S>>,
	deferred: VecDeque<Task<S>>,
}

impl<S: Transport, A: Agent<S>> Client<S, A> {
	/// Constructs a client with the default configuration.
	pub fn new(agent: A) -> Self {
		Self::with_config(agent, ClientConfig::default())
	}

	/// Constructs a client.
	pub fn with_config(agent: A, config: ClientConfig) -> Self {
		Self {
			agent,
			config,
			next_id: 0,
			requests: HashMap::new(),
			bindings: HashMap::new(),
			parsers: ParserPool::new(),
			events: VecDeque::new(),
			deferred: VecDeque::new(),
		}
	}

	/// Creates a request.
	///
	/// The agent is asked for a connection once deferred work runs, so headers can still be
	/// changed after this returns.
	///
	/// # Errors
	/// This function returns a [`Usage`] error if the method, path or a header is invalid or if
	/// the protocol does not match the agent’s.
	pub fn request(&mut self, options: RequestOptions) -> Result<RequestId, Error> {
		let req = ClientRequest::new(
			&options,
			self.agent.protocol(),
			self.agent.keep_alive(),
			self.config.high_water_mark,
		)?;
		let settings = Settings {
			max_header_size: options
				.max_header_size
				.unwrap_or(self.config.max_header_size),
			max_headers: self.config.max_headers,
			lenient: options
				.insecure_http_parser
				.unwrap_or(self.config.insecure_http_parser),
		};
		let timeout = options.timeout.or_else(|| self.agent.timeout());

		let id = RequestId(self.next_id);
		self.next_id += 1;
		tracing::debug!(request = %id, method = %req.method(), path = %req.path(), "Request created");

		let mut cycle = Cycle::new(req, options, settings);
		if let Some(timeout) = timeout {
			cycle.timeout.arm::<S>(timeout, None);
		}
		if cycle.req.outgoing().headers_sent() {
			cycle.transition(id, State::HeadersQueued);
		}
		let _ = self.requests.insert(id, cycle);
		self.deferred.push_back(Task::Dispatch(id));
		Ok(id)
	}

	fn cycle(&self, id: RequestId) -> Result<&Cycle, Usage> {
		self.requests.get(&id).ok_or(Usage::UnknownRequest(id))
	}

	fn cycle_mut(&mut self, id: RequestId) -> Result<&mut Cycle, Usage> {
		self.requests
			.get_mut(&id)
			.ok_or(Usage::UnknownRequest(id))
	}

	/// Replaces every header named `name` with one field.
	///
	/// # Errors
	/// This function returns an error if the head has been serialized, if the request was created
	/// with raw headers, or if the field is invalid.
	pub fn set_header(
		&mut self,
		id: RequestId,
		name: &str,
		value: impl AsRef<[u8]>,
	) -> Result<(), Error> {
		Ok(self
			.cycle_mut(id)?
			.req
			.outgoing_mut()
			.set_header(name, value.as_ref())?)
	}

	/// Returns the first header named `name`.
	///
	/// # Errors
	/// This function returns an error if the request is unknown.
	pub fn get_header(&self, id: RequestId, name: &str) -> Result<Option<&[u8]>, Error> {
		Ok(self.cycle(id)?.req.outgoing().get_header(name))
	}

	/// Returns whether a header named `name` is present.
	///
	/// # Errors
	/// This function returns an error if the request is unknown.
	pub fn has_header(&self, id: RequestId, name: &str) -> Result<bool, Error> {
		Ok(self.cycle(id)?.req.outgoing().has_header(name))
	}

	/// Removes every header named `name`, returning whether there were any.
	///
	/// # Errors
	/// This function returns an error if the head has been serialized or the request was created
	/// with raw headers.
	pub fn remove_header(&mut self, id: RequestId, name: &str) -> Result<bool, Error> {
		Ok(self.cycle_mut(id)?.req.outgoing_mut().remove_header(name)?)
	}

	/// Serializes the head now instead of at the first write.
	///
	/// # Errors
	/// This function returns an error if the request is unknown or destroyed.
	pub fn flush_headers(&mut self, id: RequestId) -> Result<(), Error> {
		let cycle = self.cycle_mut(id)?;
		if cycle.destroyed {
			return Err(Usage::Destroyed.into());
		}
		if !cycle.req.outgoing().headers_sent() {
			cycle.req.implicit_header(None)?;
		}
		if cycle.state == State::Idle {
			cycle.transition(id, State::HeadersQueued);
		}
		let _ = self.flush(id);
		Ok(())
	}

	/// Writes body data.
	///
	/// Returns `false` if the caller should wait for [`EventKind::Drain`] before writing more.
	///
	/// # Errors
	/// This function returns an error if the request is unknown, destroyed or ended, or if the
	/// data overflows a declared `Content-Length`.
	pub fn write(&mut self, id: RequestId, data: &[u8]) -> Result<bool, Error> {
		let cycle = self.cycle_mut(id)?;
		if cycle.destroyed {
			return Err(Usage::Destroyed.into());
		}
		let below_mark = cycle.req.write(data)?;
		if cycle.state == State::Idle {
			cycle.transition(id, State::HeadersQueued);
		}
		let bound = cycle.socket.is_some();
		let ok = if bound { self.flush(id) } else { below_mark };
		if !ok {
			if let Some(cycle) = self.requests.get_mut(&id) {
				cycle.needs_drain = true;
			}
		}
		Ok(ok)
	}

	/// Ends the request, optionally with a last piece of body.
	///
	/// # Errors
	/// This function returns an error if the request is unknown or destroyed, or if the body does
	/// not match a declared `Content-Length`.
	pub fn end(&mut self, id: RequestId, data: Option<&[u8]>) -> Result<(), Error> {
		let cycle = self.cycle_mut(id)?;
		if cycle.destroyed {
			return Err(Usage::Destroyed.into());
		}
		cycle.req.end(data)?;
		if cycle.state == State::Idle {
			cycle.transition(id, State::HeadersQueued);
		}
		let _ = self.flush(id);
		self.maybe_prefinish(id);
		Ok(())
	}

	/// Aborts the request.
	///
	/// An [`EventKind::Abort`] is reported once, followed by the usual [`EventKind::Close`].
	/// Aborting an unknown or already aborted request does nothing.
	pub fn abort(&mut self, id: RequestId) {
		match self.requests.get_mut(&id) {
			Some(cycle) if !cycle.aborted => {
				tracing::debug!(request = %id, "Request aborted");
				cycle.aborted = true;
			}
			_ => return,
		}
		self.deferred.push_back(Task::EmitAbort(id));
		self.destroy(id, None);
	}

	/// Destroys the request and the connection carrying it.
	///
	/// If the request has no connection yet, one that arrives later is destroyed without being
	/// used. Destroying an unknown or already destroyed request does nothing.
	pub fn destroy(&mut self, id: RequestId, error: Option<Error>) {
		let Self {
			requests,
			bindings,
			events,
			deferred,
			..
		} = self;
		let cycle = match requests.get_mut(&id) {
			Some(cycle) if !cycle.destroyed => cycle,
			_ => return,
		};
		cycle.destroyed = true;
		if let Some(res) = &mut cycle.res {
			if !res.is_complete() && res.dump() {
				tracing::trace!(request = %id, "Response body discarded");
			}
		}
		cycle.req.outgoing_mut().clear_output();
		cycle.fail(
			id,
			if error.is_some() {
				State::Errored
			} else {
				State::Aborted
			},
		);

		match cycle.socket.and_then(|s| bindings.get_mut(&s)) {
			Some(binding) => {
				tracing::debug!(request = %id, socket = %binding.socket.id, "Destroying connection");
				binding.socket.transport.destroy(error.as_ref());
				binding.listeners.detach_data_path();
				cycle.timeout.disarm(Some(&mut *binding));
				if let Some(error) = error {
					if !cycle.had_error {
						cycle.had_error = true;
						events.push_back(Event {
							request: id,
							kind: EventKind::Error { error },
						});
					}
				}
				deferred.push_back(Task::SocketClose(binding.socket.id));
			}
			None => {
				let error = match error {
					Some(error) => Some(error),
					None if !cycle.aborted => Some(Error::ConnectionReset(Reset::HangUp)),
					None => None,
				};
				if error.is_some() {
					cycle.had_error = true;
				}
				deferred.push_back(Task::EmitClose(id, error));
			}
		}
	}

	/// Sets the inactivity timeout. Zero disarms it.
	///
	/// # Errors
	/// This function returns an error if the request is unknown.
	pub fn set_timeout(&mut self, id: RequestId, timeout: Duration) -> Result<(), Error> {
		let Self {
			requests, bindings, ..
		} = self;
		let cycle = requests.get_mut(&id).ok_or(Usage::UnknownRequest(id))?;
		let binding = cycle.socket.and_then(|s| bindings.get_mut(&s));
		cycle.timeout.arm(timeout, binding);
		Ok(())
	}

	/// Enables or disables Nagle’s algorithm on the request’s connection.
	///
	/// # Errors
	/// This function returns an error if the request is unknown.
	pub fn set_no_delay(&mut self, id: RequestId, no_delay: bool) -> Result<(), Error> {
		let Self {
			requests, bindings, ..
		} = self;
		let cycle = requests.get_mut(&id).ok_or(Usage::UnknownRequest(id))?;
		match cycle.socket.and_then(|s| bindings.get_mut(&s)) {
			Some(binding) => binding.socket.transport.set_no_delay(no_delay),
			None => cycle.no_delay = Some(no_delay),
		}
		Ok(())
	}

	/// Enables or disables TCP keep-alive probes on the request’s connection.
	///
	/// # Errors
	/// This function returns an error if the request is unknown.
	pub fn set_socket_keep_alive(
		&mut self,
		id: RequestId,
		enable: bool,
		initial_delay: Duration,
	) -> Result<(), Error> {
		let Self {
			requests, bindings, ..
		} = self;
		let cycle = requests.get_mut(&id).ok_or(Usage::UnknownRequest(id))?;
		match cycle.socket.and_then(|s| bindings.get_mut(&s)) {
			Some(binding) => binding
				.socket
				.transport
				.set_keep_alive(enable, initial_delay),
			None => cycle.socket_keep_alive = Some((enable, initial_delay)),
		}
		Ok(())
	}

	/// Takes the connection if the response switches protocols.
	///
	/// Without this, a connection whose protocol switches is destroyed.
	///
	/// # Errors
	/// This function returns an error if the request is unknown.
	pub fn listen(&mut self, id: RequestId, interest: Interest) -> Result<(), Error> {
		self.cycle_mut(id)?.listen(interest);
		Ok(())
	}

	/// Hands a connection to a request whose agent returned `Ok(None)` from
	/// [`Agent::add_request`].
	///
	/// A request that has been destroyed in the meantime does not use the connection; it is
	/// destroyed.
	///
	/// # Errors
	/// This function returns an error, and destroys the connection, if the request was never
	/// issued by this client or if the connection is already carrying a request.
	pub fn assign_socket(&mut self, id: RequestId, mut socket: Socket<S>) -> Result<(), Error> {
		if id.0 >= self.next_id {
			socket.transport.destroy(None);
			self.agent.remove_socket(socket.id);
			return Err(Usage::UnknownRequest(id).into());
		}
		if self.bindings.contains_key(&socket.id) {
			tracing::warn!(request = %id, socket = %socket.id, "Connection is already bound");
			socket.transport.destroy(None);
			return Err(Usage::SocketInUse.into());
		}
		self.deferred.push_back(Task::OnSocket(id, Ok(socket)));
		Ok(())
	}

	/// Reports that the agent could not provide a connection.
	///
	/// # Errors
	/// This function returns an error if the request was never issued by this client.
	pub fn connect_failed(&mut self, id: RequestId, error: std::io::Error) -> Result<(), Error> {
		if id.0 >= self.next_id {
			return Err(Usage::UnknownRequest(id).into());
		}
		self.deferred.push_back(Task::OnSocket(id, Err(error)));
		Ok(())
	}

	/// Runs deferred work, including work queued while it runs.
	pub fn run_deferred(&mut self) {
		while let Some(task) = self.deferred.pop_front() {
			self.run_task(task);
		}
	}

	/// Returns the number of deferred tasks waiting to run.
	#[must_use]
	pub fn pending_tasks(&self) -> usize {
		self.deferred.len()
	}

	/// Takes the next notification.
	pub fn poll_event(&mut self) -> Option<Event<S>> {
		self.events.pop_front()
	}

	/// Returns the state of a request, or `None` once it has closed.
	#[must_use]
	pub fn state(&self, id: RequestId) -> Option<State> {
		self.requests.get(&id).map(|c| c.state)
	}

	/// Returns the connection carrying a request.
	#[must_use]
	pub fn socket_of(&self, id: RequestId) -> Option<SocketId> {
		self.requests.get(&id).and_then(|c| c.socket)
	}

	/// Returns the request a connection is carrying.
	#[must_use]
	pub fn bound_request(&self, socket: SocketId) -> Option<RequestId> {
		self.bindings.get(&socket).map(|b| b.request)
	}

	/// Returns whether the connection will be reused after the request’s cycle.
	#[must_use]
	pub fn should_keep_alive(&self, id: RequestId) -> Option<bool> {
		self.requests.get(&id).map(|c| c.req.should_keep_alive())
	}

	/// Returns the parser pool counters.
	#[must_use]
	pub fn parser_stats(&self) -> PoolStats {
		self.parsers.stats()
	}

	/// Returns the agent.
	pub fn agent(&self) -> &A {
		&self.agent
	}

	/// Returns the agent.
	pub fn agent_mut(&mut self) -> &mut A {
		&mut self.agent
	}

	/// Returns the configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	fn dispatch(&mut self, id: RequestId) {
		let cycle = match self.requests.get_mut(&id) {
			Some(cycle) if !cycle.destroyed => cycle,
			_ => return,
		};
		cycle.transition(id, State::AwaitingSocket);
		match self.agent.add_request(id, &cycle.options) {
			Ok(Some(socket)) => self.deferred.push_back(Task::OnSocket(id, Ok(socket))),
			Ok(None) => tracing::trace!(request = %id, "Waiting for a connection"),
			Err(e) => self.deferred.push_back(Task::OnSocket(id, Err(e))),
		}
	}

	fn on_socket(&mut self, id: RequestId, result: std::io::Result<Socket<S>>) {
		let waiting = matches!(
			self.requests.get(&id),
			Some(cycle) if !cycle.destroyed && cycle.state == State::AwaitingSocket
		);
		let mut socket = match result {
			Ok(socket) => socket,
			Err(error) => {
				if waiting {
					self.connection_failed(id, error.into());
				}
				return;
			}
		};
		if !waiting {
			tracing::debug!(request = %id, socket = %socket.id, "Connection arrived too late");
			socket.transport.destroy(None);
			self.agent.remove_socket(socket.id);
			return;
		}
		if self.bindings.contains_key(&socket.id) {
			tracing::warn!(request = %id, socket = %socket.id, "Connection is already bound");
			socket.transport.destroy(None);
			self.connection_failed(id, Usage::SocketInUse.into());
			return;
		}

		let Self {
			requests,
			bindings,
			parsers,
			events,
			..
		} = self;
		let cycle = match requests.get_mut(&id) {
			Some(cycle) => cycle,
			None => return,
		};
		let handle = parsers.acquire();
		parsers.initialize(&handle, ParserKind::Response, cycle.settings);
		let sid = socket.id;
		let mut binding = Binding::new(socket, id, handle);
		cycle.socket = Some(sid);
		cycle.transition(id, State::Active);
		tracing::debug!(
			request = %id,
			socket = %sid,
			connecting = binding.socket.transport.is_connecting(),
			timeout = ?cycle.timeout.duration(),
			"Connection bound"
		);
		events.push_back(Event {
			request: id,
			kind: EventKind::Socket { socket: sid },
		});
		if let Some(no_delay) = cycle.no_delay {
			binding.socket.transport.set_no_delay(no_delay);
		}
		if let Some((enable, initial_delay)) = cycle.socket_keep_alive {
			binding
				.socket
				.transport
				.set_keep_alive(enable, initial_delay);
		}
		cycle.timeout.retarget(&mut binding);
		let _ = bindings.insert(sid, binding);

		// A write that hit the mark before the connection arrived is still owed a drain.
		if self.flush(id) {
			let owed = match self.requests.get_mut(&id) {
				Some(cycle) if cycle.needs_drain && !cycle.req.outgoing().is_finished() => {
					cycle.needs_drain = false;
					true
				}
				_ => false,
			};
			if owed {
				self.emit(id, EventKind::Drain);
			}
		}
		self.maybe_prefinish(id);
	}

	/// Fails a request that could not get a connection.
	fn connection_failed(&mut self, id: RequestId, error: Error) {
		if let Some(mut cycle) = self.requests.remove(&id) {
			tracing::debug!(request = %id, %error, "No connection");
			cycle.destroyed = true;
			cycle.fail(id, State::Errored);
			if !cycle.had_error {
				self.emit(id, EventKind::Error { error });
			}
			self.emit(id, EventKind::Close);
		}
	}

	/// Writes queued output to the request’s connection.
	///
	/// Returns `false` if the connection asked for writes to pause.
	fn flush(&mut self, id: RequestId) -> bool {
		let Self {
			requests, bindings, ..
		} = self;
		let cycle = match requests.get_mut(&id) {
			Some(cycle) => cycle,
			None => return true,
		};
		let binding = match cycle.socket.and_then(|s| bindings.get_mut(&s)) {
			Some(binding) => binding,
			None => return true,
		};
		let mut ok = true;
		for chunk in cycle.req.outgoing_mut().take_output() {
			tracing::trace!(request = %id, socket = %binding.socket.id, len = chunk.len(), "Writing");
			ok &= binding.socket.transport.write(&chunk);
		}
		ok
	}

	/// Notes that the request has been written out in full, once it has.
	///
	/// If the response already ended, the connection goes back to the agent.
	fn maybe_prefinish(&mut self, id: RequestId) {
		let cycle = match self.requests.get_mut(&id) {
			Some(cycle) => cycle,
			None => return,
		};
		let out = cycle.req.outgoing();
		if cycle.prefinished
			|| cycle.destroyed
			|| cycle.socket.is_none()
			|| !out.is_finished()
			|| out.buffered() != 0
		{
			return;
		}
		cycle.prefinished = true;
		tracing::trace!(request = %id, "Request sent");
		if cycle.res.is_none() && cycle.state == State::Active {
			cycle.transition(id, State::ResponseHeaderWait);
		}
		if cycle.ended && cycle.req.should_keep_alive() {
			self.response_keep_alive(id);
		}
	}

	/// Finishes the cycle after the response body ended.
	fn response_on_end(&mut self, id: RequestId) {
		let Self {
			requests,
			bindings,
			deferred,
			..
		} = self;
		let cycle = match requests.get_mut(&id) {
			Some(cycle) => cycle,
			None => return,
		};
		cycle.ended = true;
		let mut binding = cycle.socket.and_then(|s| bindings.get_mut(&s));
		cycle.timeout.disarm(binding.as_deref_mut());
		if cycle.state != State::Done {
			cycle.transition(id, State::Done);
		}

		if !cycle.req.should_keep_alive() {
			if let Some(binding) = binding {
				if binding.socket.transport.is_writable() {
					tracing::debug!(request = %id, socket = %binding.socket.id, "Closing connection");
					if !binding.socket.transport.destroy_soon() {
						deferred.push_back(Task::SocketClose(binding.socket.id));
					}
				} else {
					binding.socket.transport.destroy(None);
					deferred.push_back(Task::SocketClose(binding.socket.id));
				}
			}
		} else if cycle.prefinished && !cycle.aborted {
			self.response_keep_alive(id);
		}
	}

	/// Lets go of a connection that can carry another request.
	///
	/// The agent gets it back once deferred work runs, after the request’s close has been
	/// reported.
	fn response_keep_alive(&mut self, id: RequestId) {
		let Self {
			requests,
			bindings,
			parsers,
			deferred,
			..
		} = self;
		let cycle = match requests.get_mut(&id) {
			Some(cycle) => cycle,
			None => return,
		};
		let mut binding = match cycle.socket.take().and_then(|s| bindings.remove(&s)) {
			Some(binding) => binding,
			None => return,
		};
		cycle.timeout.disarm(Some(&mut binding));
		binding.listeners.detach_all();
		binding.free_parser(parsers);
		cycle.destroyed = true;
		if cycle.state != State::Done {
			cycle.transition(id, State::Done);
		}
		tracing::debug!(request = %id, socket = %binding.socket.id, "Keeping connection alive");
		deferred.push_back(Task::EmitFree(id, binding.socket));
	}
}

impl<S, A> Stream for Client<S, A>
where
	S: Transport + Unpin,
	A: Agent<S> + Unpin,
{
	type Item = Event<S>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event<S>>> {
		let this = self.get_mut();
		loop {
			if let Some(event) = this.events.pop_front() {
				return Poll::Ready(Some(event));
			}
			if let Some(task) = this.deferred.pop_front() {
				this.run_task(task);
				continue;
			}

			let sockets: Vec<SocketId> = this.bindings.keys().copied().collect();
			let mut progressed = false;
			for sid in sockets {
				let polled = match this.bindings.get_mut(&sid) {
					Some(binding) => binding.socket.transport.poll_event(cx),
					None => continue,
				};
				if let Poll::Ready(event) = polled {
					this.handle_socket_event(sid, event);
					progressed = true;
					break;
				}
			}
			if progressed {
				continue;
			}

			return if this.requests.is_empty() {
				Poll::Ready(None)
			} else {
				Poll::Pending
			};
		}
	}
}

impl<S: Transport, A: Agent<S>> Client<S, A> {
	/// Delivers something that happened on a connection.
	///
	/// Events for connections not bound to a request, or that the bound request no longer reacts
	/// to, are ignored.
	pub fn handle_socket_event(&mut self, socket: SocketId, event: SocketEvent) {
		match event {
			SocketEvent::Data(data) => self.socket_data(socket, data),
			SocketEvent::End => self.socket_end(socket),
			SocketEvent::Close => self.socket_close(socket),
			SocketEvent::Error(error) => self.socket_error(socket, error),
			SocketEvent::Drain => self.socket_drain(socket),
			SocketEvent::Timeout => self.socket_timeout(socket),
		}
	}
}
