use super::state::State;
use super::timeout::TimeoutSlot;
use crate::event::Interest;
use crate::parser::Settings;
use crate::request::{ClientRequest, RequestOptions};
use crate::response::IncomingResponse;
use crate::{RequestId, SocketId};
use std::time::Duration;

/// Everything the client tracks about one request.
#[derive(Debug)]
pub(super) struct Cycle {
	pub req: ClientRequest,

	/// The options the request was created from, passed to the agent.
	pub options: RequestOptions,

	pub state: State,

	/// The connection carrying the request, until it is handed over or closed.
	pub socket: Option<SocketId>,

	/// The final response, once its head has arrived.
	pub res: Option<IncomingResponse>,

	pub timeout: TimeoutSlot,

	/// Parser settings for the response.
	pub settings: Settings,

	/// Protocol switches the application takes the connection for.
	upgrade_listener: bool,
	connect_listener: bool,

	/// Connection options set before a connection was bound.
	pub no_delay: Option<bool>,
	pub socket_keep_alive: Option<(bool, Duration)>,

	/// The application aborted the request.
	pub aborted: bool,

	/// The request let go of its connection, by destruction or handover.
	pub destroyed: bool,

	/// An error has been reported. Later failures on the same connection are not.
	pub had_error: bool,

	/// The response switched protocols.
	pub upgrade_or_connect: bool,

	/// A write returned `false` and a drain is owed.
	pub needs_drain: bool,

	/// The response body ended.
	pub ended: bool,

	/// The request was written out in full.
	pub prefinished: bool,
}

impl Cycle {
	pub fn new(req: ClientRequest, options: RequestOptions, settings: Settings) -> Self {
		Self {
			req,
			options,
			state: State::Idle,
			socket: None,
			res: None,
			timeout: TimeoutSlot::default(),
			settings,
			upgrade_listener: false,
			connect_listener: false,
			no_delay: None,
			socket_keep_alive: None,
			aborted: false,
			destroyed: false,
			had_error: false,
			upgrade_or_connect: false,
			needs_drain: false,
			ended: false,
			prefinished: false,
		}
	}

	/// Moves to `next` if the transition table allows it.
	pub fn transition(&mut self, id: RequestId, next: State) {
		if self.state.can_become(next) {
			tracing::trace!(request = %id, from = ?self.state, to = ?next, "State change");
			self.state = next;
		} else {
			tracing::warn!(request = %id, from = ?self.state, to = ?next, "Rejected state change");
		}
	}

	/// Moves to a failure state unless the cycle is already over.
	pub fn fail(&mut self, id: RequestId, next: State) {
		if !self.state.is_terminal() {
			self.transition(id, next);
		}
	}

	pub fn listen(&mut self, interest: Interest) {
		match interest {
			Interest::Upgrade => self.upgrade_listener = true,
			Interest::Connect => self.connect_listener = true,
		}
	}

	/// Returns which protocol switch the response to this request would be.
	pub fn switch_kind(&self) -> Interest {
		if self.req.is_connect() {
			Interest::Connect
		} else {
			Interest::Upgrade
		}
	}

	pub fn wants(&self, interest: Interest) -> bool {
		match interest {
			Interest::Upgrade => self.upgrade_listener,
			Interest::Connect => self.connect_listener,
		}
	}
}
