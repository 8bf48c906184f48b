use super::{SocketEvent, Transport};
use crate::error::Error;
use bytes::{Buf as _, Bytes, BytesMut};
use futures_io::{AsyncRead, AsyncWrite};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// The number of bytes read from the socket at once.
const READ_SIZE: usize = 8192;

/// A [`Transport`] over any `futures-io` socket.
///
/// Writes are buffered and pushed to the socket from [`poll_event`](Transport::poll_event), so the
/// transport only makes progress while something polls it, usually the [`Client`](crate::Client)’s
/// `Stream` implementation.
///
/// The inactivity timeout is recorded but not enforced: this type has no timer. An application
/// that wants timeouts races the client against a timer of its own executor and calls
/// [`Client::socket_timeout`](crate::Client::socket_timeout).
#[derive(Debug)]
pub struct IoTransport<T> {
	io: T,
	write_buf: BytesMut,
	read_buf: Vec<u8>,
	high_water_mark: usize,
	needs_flush: bool,
	needs_drain: bool,
	ending: bool,
	closing: bool,
	ended: bool,
	read_eof: bool,
	destroyed: bool,
	close_reported: bool,
	timeout: Option<Duration>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> IoTransport<T> {
	/// Wraps a socket.
	pub fn new(io: T) -> Self {
		Self::with_high_water_mark(io, crate::config::DEFAULT_HIGH_WATER_MARK)
	}

	/// Wraps a socket, asking writers to wait once `high_water_mark` bytes are buffered.
	pub fn with_high_water_mark(io: T, high_water_mark: usize) -> Self {
		Self {
			io,
			write_buf: BytesMut::new(),
			read_buf: vec![0; READ_SIZE],
			high_water_mark,
			needs_flush: false,
			needs_drain: false,
			ending: false,
			closing: false,
			ended: false,
			read_eof: false,
			destroyed: false,
			close_reported: false,
			timeout: None,
		}
	}

	/// Returns the inactivity timeout last set by the client.
	pub fn timeout(&self) -> Option<Duration> {
		self.timeout
	}

	/// Returns the wrapped socket.
	pub fn get_ref(&self) -> &T {
		&self.io
	}

	/// Unwraps the socket, discarding buffered output.
	pub fn into_inner(self) -> T {
		self.io
	}

	fn fail(&mut self, error: std::io::Error) -> Poll<SocketEvent> {
		tracing::debug!(%error, "Socket failed");
		self.destroyed = true;
		self.write_buf.clear();
		Poll::Ready(SocketEvent::Error(error))
	}

	/// Pushes buffered output into the socket and finishes the sending side if asked to.
	///
	/// Returns an event if one resulted.
	fn poll_output(&mut self, cx: &mut Context<'_>) -> Option<Poll<SocketEvent>> {
		while !self.write_buf.is_empty() {
			match Pin::new(&mut self.io).poll_write(cx, &self.write_buf) {
				Poll::Ready(Ok(0)) => {
					return Some(self.fail(std::io::ErrorKind::WriteZero.into()));
				}
				Poll::Ready(Ok(n)) => {
					self.write_buf.advance(n);
					self.needs_flush = true;
				}
				Poll::Ready(Err(e)) => return Some(self.fail(e)),
				Poll::Pending => return None,
			}
		}
		if self.needs_flush {
			match Pin::new(&mut self.io).poll_flush(cx) {
				Poll::Ready(Ok(())) => self.needs_flush = false,
				Poll::Ready(Err(e)) => return Some(self.fail(e)),
				Poll::Pending => return None,
			}
		}
		if self.needs_drain {
			self.needs_drain = false;
			return Some(Poll::Ready(SocketEvent::Drain));
		}
		if self.ending && !self.ended {
			match Pin::new(&mut self.io).poll_close(cx) {
				Poll::Ready(Ok(())) => {
					self.ended = true;
					if self.closing {
						self.destroyed = true;
						self.close_reported = true;
						return Some(Poll::Ready(SocketEvent::Close));
					}
				}
				Poll::Ready(Err(e)) => return Some(self.fail(e)),
				Poll::Pending => (),
			}
		}
		None
	}
}

impl<T: AsyncRead + AsyncWrite + Unpin> Transport for IoTransport<T> {
	fn write(&mut self, data: &[u8]) -> bool {
		if self.destroyed || self.ending {
			return false;
		}
		self.write_buf.extend_from_slice(data);
		if self.write_buf.len() >= self.high_water_mark {
			self.needs_drain = true;
			false
		} else {
			true
		}
	}

	fn end(&mut self) {
		self.ending = true;
	}

	fn destroy(&mut self, error: Option<&Error>) {
		if !self.destroyed {
			tracing::trace!(error = ?error.map(ToString::to_string), "Socket destroyed");
			self.destroyed = true;
			self.write_buf.clear();
		}
	}

	fn destroy_soon(&mut self) -> bool {
		self.ending = true;
		self.closing = true;
		true
	}

	fn set_timeout(&mut self, timeout: Option<Duration>) {
		self.timeout = timeout;
	}

	fn is_writable(&self) -> bool {
		!self.destroyed && !self.ending
	}

	fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<SocketEvent> {
		if self.destroyed {
			if self.close_reported {
				return Poll::Pending;
			}
			self.close_reported = true;
			return Poll::Ready(SocketEvent::Close);
		}
		if let Some(event) = self.poll_output(cx) {
			return event;
		}
		if self.read_eof {
			return Poll::Pending;
		}
		match Pin::new(&mut self.io).poll_read(cx, &mut self.read_buf) {
			Poll::Ready(Ok(0)) => {
				self.read_eof = true;
				Poll::Ready(SocketEvent::End)
			}
			Poll::Ready(Ok(n)) => Poll::Ready(SocketEvent::Data(Bytes::copy_from_slice(
				&self.read_buf[..n],
			))),
			Poll::Ready(Err(e)) => self.fail(e),
			Poll::Pending => Poll::Pending,
		}
	}
}
