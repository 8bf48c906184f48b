use super::body::Framing;
use super::head::{serialize, HeaderBlock};
use crate::error::Usage;
use crate::util::{is_field_value, is_token};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

/// Checks a header field that the caller wants to send.
pub fn validate_field(name: &str, value: &[u8]) -> Result<(), Usage> {
	if !is_token(name) {
		return Err(Usage::InvalidHeaderName(name.to_owned()));
	}
	if !is_field_value(value) {
		return Err(Usage::InvalidHeaderValue(name.to_owned()));
	}
	Ok(())
}

/// The state shared by every outgoing HTTP message: its header block, the latch that freezes the
/// headers once the head is serialized, the body framing, and the output not yet handed to a
/// transport.
#[derive(Debug)]
pub struct Outgoing {
	/// The caller's header fields.
	headers: HeaderBlock,

	/// Whether the head has been serialized.
	headers_sent: bool,

	/// How body writes are framed.
	framing: Framing,

	/// Serialized output waiting for a transport.
	output: VecDeque<Bytes>,

	/// The total length of `output`.
	output_size: usize,

	/// Buffered output above this size means the caller should wait before writing more.
	high_water_mark: usize,

	/// Whether the body has been ended.
	finished: bool,
}

impl Outgoing {
	/// Constructs a message with the given headers.
	pub fn new(headers: HeaderBlock, high_water_mark: usize) -> Self {
		Self {
			headers,
			headers_sent: false,
			framing: Framing::Unframed,
			output: VecDeque::new(),
			output_size: 0,
			high_water_mark,
			finished: false,
		}
	}

	/// Returns the caller's header block.
	pub fn headers(&self) -> &HeaderBlock {
		&self.headers
	}

	/// Returns the value of the first header named `name`.
	pub fn get_header(&self, name: &str) -> Option<&[u8]> {
		match &self.headers {
			HeaderBlock::Fields(map) => map.get(name),
			HeaderBlock::Raw(fields) => fields
				.iter()
				.find(|(n, _)| n.eq_ignore_ascii_case(name))
				.map(|(_, v)| &v[..]),
		}
	}

	/// Returns whether a header named `name` is present.
	pub fn has_header(&self, name: &str) -> bool {
		self.get_header(name).is_some()
	}

	fn editable(&mut self) -> Result<&mut crate::headers::HeaderMap, Usage> {
		let sent = self.headers_sent;
		match &mut self.headers {
			HeaderBlock::Raw(_) => Err(Usage::RawHeaders),
			HeaderBlock::Fields(_) if sent => Err(Usage::HeadersSent),
			HeaderBlock::Fields(map) => Ok(map),
		}
	}

	/// Replaces every header named `name` with one field.
	///
	/// # Errors
	/// This function returns an error if the head is already serialized, if the headers are raw,
	/// or if the field is invalid.
	pub fn set_header(&mut self, name: &str, value: &[u8]) -> Result<(), Usage> {
		let map = self.editable()?;
		validate_field(name, value)?;
		map.insert(name, value);
		Ok(())
	}

	/// Removes every header named `name`, returning whether any were present.
	///
	/// # Errors
	/// This function returns an error if the head is already serialized or the headers are raw.
	pub fn remove_header(&mut self, name: &str) -> Result<bool, Usage> {
		Ok(self.editable()?.remove(name))
	}

	/// Returns whether the head has been serialized.
	pub fn headers_sent(&self) -> bool {
		self.headers_sent
	}

	/// Serializes the head and closes the header latch.
	///
	/// `extra` is written after the caller's fields. `framing` applies to every later body write.
	///
	/// # Errors
	/// This function returns [`Usage::HeadersSent`] if the head was already serialized.
	pub fn store_header(
		&mut self,
		method: &str,
		request_target: &str,
		extra: &[(&str, String)],
		framing: Framing,
	) -> Result<(), Usage> {
		if self.headers_sent {
			return Err(Usage::HeadersSent);
		}
		let mut out = BytesMut::new();
		serialize(method, request_target, &self.headers, extra, &mut out);
		self.headers_sent = true;
		self.framing = framing;
		self.push(out);
		Ok(())
	}

	/// Frames and queues body data.
	///
	/// Returns whether the queued output is still below the high water mark.
	///
	/// # Errors
	/// This function returns an error if the data would overflow a declared length.
	pub fn write_body(&mut self, data: &[u8]) -> Result<bool, Usage> {
		debug_assert!(self.headers_sent, "Body written before head");
		let mut out = BytesMut::new();
		self.framing.encode(data, &mut out)?;
		self.push(out);
		Ok(self.output_size < self.high_water_mark)
	}

	/// Queues the end of the body and marks the message finished.
	///
	/// # Errors
	/// This function returns an error if a declared length was not reached.
	pub fn finish(&mut self) -> Result<(), Usage> {
		let mut out = BytesMut::new();
		self.framing.finish(&mut out)?;
		self.push(out);
		self.finished = true;
		Ok(())
	}

	/// Returns whether the body has been ended.
	pub fn is_finished(&self) -> bool {
		self.finished
	}

	/// Returns how many bytes of output are waiting for a transport.
	pub fn buffered(&self) -> usize {
		self.output_size
	}

	/// Returns the high water mark.
	pub fn high_water_mark(&self) -> usize {
		self.high_water_mark
	}

	/// Removes and returns every queued piece of output.
	pub fn take_output(&mut self) -> VecDeque<Bytes> {
		self.output_size = 0;
		std::mem::take(&mut self.output)
	}

	/// Discards queued output.
	pub fn clear_output(&mut self) {
		self.output.clear();
		self.output_size = 0;
	}

	fn push(&mut self, out: BytesMut) {
		if !out.is_empty() {
			self.output_size += out.len();
			self.output.push_back(out.freeze());
		}
	}
}

/// An outgoing HTTP message.
///
/// Implementors own an [`Outgoing`] and decide which implicit fields and which body framing the
/// head gets. The provided methods drive the header latch: the first body write, or the end of a
/// message with no writes, serializes the head through [`implicit_header`](Self::implicit_header).
pub trait OutgoingMessage {
	/// Returns the shared message state.
	fn outgoing(&self) -> &Outgoing;

	/// Returns the shared message state.
	fn outgoing_mut(&mut self) -> &mut Outgoing;

	/// Serializes the head with whatever implicit fields this kind of message adds.
	///
	/// `known_length` is the length of the entire body if it is already known.
	///
	/// # Errors
	/// This function returns an error if the head was already serialized.
	fn implicit_header(&mut self, known_length: Option<u64>) -> Result<(), Usage>;

	/// Queues the end of the body.
	///
	/// # Errors
	/// This function returns an error if the body does not match its declared length.
	fn finish(&mut self) -> Result<(), Usage> {
		self.outgoing_mut().finish()
	}

	/// Writes body data, serializing the head first if needed.
	///
	/// Returns whether queued output is still below the high water mark.
	///
	/// # Errors
	/// This function returns an error if the message has ended or the data overflows a declared
	/// length.
	fn write(&mut self, data: &[u8]) -> Result<bool, Usage> {
		if self.outgoing().is_finished() {
			return Err(Usage::WriteAfterEnd);
		}
		if !self.outgoing().headers_sent() {
			self.implicit_header(None)?;
		}
		self.outgoing_mut().write_body(data)
	}

	/// Ends the message, optionally with a final piece of body.
	///
	/// Ending a message that has already ended does nothing.
	///
	/// # Errors
	/// This function returns an error if the body does not match its declared length.
	fn end(&mut self, data: Option<&[u8]>) -> Result<(), Usage> {
		if self.outgoing().is_finished() {
			return Ok(());
		}
		if !self.outgoing().headers_sent() {
			let length = data.map_or(0, |d| d.len() as u64);
			self.implicit_header(Some(length))?;
		}
		if let Some(data) = data {
			let _ = self.outgoing_mut().write_body(data)?;
		}
		self.finish()
	}
}
