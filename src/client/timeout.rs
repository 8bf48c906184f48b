use super::binding::Binding;
use crate::transport::Transport;
use std::time::Duration;

/// The inactivity timeout of one request.
///
/// At most one timer exists per request. It lives on whichever connection carries the request and
/// moves with the request when it is bound.
#[derive(Debug, Default)]
pub(super) struct TimeoutSlot {
	duration: Option<Duration>,
}

impl TimeoutSlot {
	/// Sets the timeout, applying it to the connection if there is one. Zero disarms.
	pub fn arm<S: Transport>(&mut self, duration: Duration, binding: Option<&mut Binding<S>>) {
		if duration == Duration::from_secs(0) {
			self.disarm(binding);
			return;
		}
		self.duration = Some(duration);
		if let Some(binding) = binding {
			binding.socket.transport.set_timeout(Some(duration));
			binding.listeners.timeout = true;
		}
	}

	/// Removes the timeout from the request and its connection.
	pub fn disarm<S: Transport>(&mut self, binding: Option<&mut Binding<S>>) {
		self.duration = None;
		if let Some(binding) = binding {
			if binding.listeners.timeout {
				binding.socket.transport.set_timeout(None);
				binding.listeners.timeout = false;
			}
		}
	}

	/// Applies a timeout set before the request had a connection to the one it now has.
	pub fn retarget<S: Transport>(&self, binding: &mut Binding<S>) {
		if let Some(duration) = self.duration {
			binding.socket.transport.set_timeout(Some(duration));
			binding.listeners.timeout = true;
		}
	}

	pub fn duration(&self) -> Option<Duration> {
		self.duration
	}
}
