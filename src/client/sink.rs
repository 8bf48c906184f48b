use super::cycle::Cycle;
use super::state::State;
use crate::event::{Event, EventKind};
use crate::parser::{HeadAction, Sink};
use crate::response::{IncomingResponse, ResponseHead};
use crate::RequestId;
use bytes::Bytes;
use std::collections::VecDeque;

/// Turns parser callbacks into state changes and notifications for one request.
pub(super) struct ResponseSink<'a, S> {
	id: RequestId,
	cycle: &'a mut Cycle,
	events: &'a mut VecDeque<Event<S>>,

	/// The final response ended during this feed.
	pub completed: bool,

	/// The head of a response that switched protocols, kept for the upgrade notification.
	pub upgrade_head: Option<ResponseHead>,
}

impl<'a, S> ResponseSink<'a, S> {
	pub fn new(id: RequestId, cycle: &'a mut Cycle, events: &'a mut VecDeque<Event<S>>) -> Self {
		Self {
			id,
			cycle,
			events,
			completed: false,
			upgrade_head: None,
		}
	}

	fn emit(&mut self, kind: EventKind<S>) {
		self.events.push_back(Event {
			request: self.id,
			kind,
		});
	}
}

impl<S> Sink for ResponseSink<'_, S> {
	fn on_headers(&mut self, head: ResponseHead) -> HeadAction {
		let id = self.id;
		if self.cycle.res.is_some() {
			tracing::warn!(request = %id, status = head.status, "Unsolicited response");
			return HeadAction::Reject;
		}

		// Every response to CONNECT hands the connection over.
		if head.upgrade || self.cycle.req.is_connect() {
			self.cycle.upgrade_or_connect = true;
			let mut res = IncomingResponse::new(head.status);
			res.mark_complete();
			self.cycle.res = Some(res);
			self.upgrade_head = Some(head);
			return HeadAction::Upgrade;
		}

		if head.is_informational() {
			tracing::debug!(request = %id, status = head.status, "Informational response");
			if head.status == 100 {
				self.emit(EventKind::Continue);
			}
			self.emit(EventKind::Information { head });
			return HeadAction::Restart;
		}

		if self.cycle.req.should_keep_alive() && !head.keep_alive {
			tracing::debug!(request = %id, "Server refused keep-alive");
			self.cycle.req.refuse_keep_alive();
		}
		let skip_body = self.cycle.req.is_head() || head.status == 304;
		tracing::debug!(request = %id, status = head.status, "Response received");
		self.cycle.res = Some(IncomingResponse::new(head.status));
		self.cycle.transition(id, State::ResponseBodyStreaming);
		self.emit(EventKind::Response { head });
		if skip_body {
			HeadAction::SkipBody
		} else {
			HeadAction::ReadBody
		}
	}

	fn on_body(&mut self, data: &[u8]) {
		let deliver = match &mut self.cycle.res {
			Some(res) => res.accept(data.len()),
			None => false,
		};
		if deliver {
			self.emit(EventKind::ResponseData {
				data: Bytes::copy_from_slice(data),
			});
		}
	}

	fn on_message_complete(&mut self) {
		let ended = match &mut self.cycle.res {
			Some(res) => {
				res.mark_complete();
				tracing::trace!(
					request = %self.id,
					status = res.status(),
					received = res.received(),
					"Response complete"
				);
				res.end()
			}
			None => false,
		};
		if ended {
			self.emit(EventKind::ResponseEnd);
		}
		self.completed = true;
	}
}
