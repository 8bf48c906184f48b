//! An incremental HTTP/1.1 response parser, handed out from a pool.
//!
//! Bytes are pushed into a parser with [`ParserPool::feed`] as they arrive. The parser reports
//! what it finds through a [`Sink`]: a parsed head, slices of decoded body, and the end of each
//! message. The sink decides how the body of each response is framed, which lets the caller
//! suppress bodies of responses to HEAD requests, absorb informational responses, and stop parsing
//! when the connection switches protocols.
//!
//! A parser is bound to a connection from [`acquire`](ParserPool::acquire) until
//! [`release`](ParserPool::release). Releasing consumes the [`ParserHandle`], so a parser can be
//! returned to the pool at most once.

mod body;
mod head;

use crate::error::InvalidData;
use crate::response::ResponseHead;
use body::{Decoder, Progress};
use bytes::BytesMut;

pub use head::BodyLength;

/// The kind of message a parser reads.
///
/// Only the response side of HTTP/1.1 is parsed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParserKind {
	/// The parser reads response messages.
	Response,
}

/// Limits and modes applied to one parser.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Settings {
	/// Maximum size, in bytes, of a status line plus headers.
	pub max_header_size: usize,

	/// Maximum number of header fields.
	pub max_headers: usize,

	/// Whether to accept ambiguous or non-conforming framing.
	pub lenient: bool,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			max_header_size: crate::config::DEFAULT_MAX_HEADER_SIZE,
			max_headers: crate::config::DEFAULT_MAX_HEADERS,
			lenient: false,
		}
	}
}

/// What a [`Sink`] wants done with the message whose head it was just given.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HeadAction {
	/// Read the body according to the framing headers.
	ReadBody,

	/// The message has no body regardless of its framing headers.
	SkipBody,

	/// Stop parsing; the rest of the input belongs to another protocol.
	Upgrade,

	/// The message was informational; keep parsing for the next head.
	Restart,

	/// The message is not acceptable; fail with [`InvalidData::UnsolicitedResponse`].
	Reject,
}

/// Receives the results of parsing.
pub trait Sink {
	/// Called when a complete head has been parsed.
	fn on_headers(&mut self, head: ResponseHead) -> HeadAction;

	/// Called with each slice of decoded body data.
	fn on_body(&mut self, data: &[u8]);

	/// Called when a message ends, including messages without a body.
	fn on_message_complete(&mut self);
}

/// The outcome of feeding bytes to a parser.
#[derive(Debug, PartialEq)]
pub enum ParseResult {
	/// All the input was consumed and more is needed.
	NeedMore,

	/// A message ended after this many bytes of the input. The rest has not been parsed.
	MessageComplete(usize),

	/// The connection switched protocols after this many bytes of the input. The rest is not
	/// HTTP.
	Upgrade(usize),

	/// The input is malformed.
	Error {
		/// What was wrong.
		kind: InvalidData,

		/// How many bytes of the input were consumed before the fault.
		bytes_parsed: usize,
	},
}

/// Counters describing how parsers have moved through a pool.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
	/// How many times a parser has been acquired.
	pub acquired: u64,

	/// How many times a parser has been finished.
	pub finished: u64,

	/// How many times a parser has been released.
	pub released: u64,

	/// How many parsers are allocated but not in use.
	pub idle: usize,
}

/// Identifies a parser acquired from a [`ParserPool`].
///
/// This is deliberately neither `Clone` nor `Copy`.
#[derive(Debug, Eq, PartialEq)]
pub struct ParserHandle(usize);

/// Where a parser is within a message.
#[derive(Debug)]
enum Phase {
	/// Waiting for, or accumulating, a head.
	Head,

	/// Reading a body.
	Body(Decoder),

	/// The connection switched protocols; nothing more is HTTP.
	Upgraded,
}

/// One parser instance.
#[derive(Debug)]
struct Parser {
	/// The settings from the last `initialize`.
	settings: Settings,

	/// Head bytes received so far.
	head: BytesMut,

	/// The current phase.
	phase: Phase,

	/// Whether the parser is checked out.
	in_use: bool,

	/// Whether `finish` has been called since the last `acquire`.
	finished: bool,
}

impl Parser {
	fn new() -> Self {
		Self {
			settings: Settings::default(),
			head: BytesMut::new(),
			phase: Phase::Head,
			in_use: false,
			finished: false,
		}
	}

	fn reset(&mut self, settings: Settings) {
		self.settings = settings;
		self.head.clear();
		self.phase = Phase::Head;
		self.finished = false;
	}

	fn feed(&mut self, data: &[u8], sink: &mut dyn Sink) -> ParseResult {
		let mut offset = 0;
		loop {
			match &mut self.phase {
				Phase::Upgraded => return ParseResult::Upgrade(offset),

				Phase::Head => {
					// Stray line terminators between messages are ignored.
					if self.head.is_empty() {
						let skip = data[offset..]
							.iter()
							.take_while(|&&b| b == b'\r' || b == b'\n')
							.count();
						offset += skip;
					}
					if offset == data.len() {
						return ParseResult::NeedMore;
					}

					let previous = self.head.len();
					self.head.extend_from_slice(&data[offset..]);
					let n = match head::headers_length(&self.head) {
						Some(n) if n <= self.settings.max_header_size => n,
						None if self.head.len() <= self.settings.max_header_size => {
							return ParseResult::NeedMore;
						}
						_ => {
							return ParseResult::Error {
								kind: InvalidData::HeadersTooLarge,
								bytes_parsed: offset,
							};
						}
					};
					let head_bytes = self.head.split_to(n);
					self.head.clear();
					let start = offset;
					offset += n - previous;

					let (head, length) = match head::parse(
						&head_bytes,
						self.settings.max_headers,
						self.settings.lenient,
					) {
						Ok(parsed) => parsed,
						Err(kind) => {
							return ParseResult::Error {
								kind,
								bytes_parsed: start,
							};
						}
					};
					tracing::trace!(status = head.status, ?length, "Response head parsed");

					match sink.on_headers(head) {
						HeadAction::Restart => (),
						HeadAction::Reject => {
							return ParseResult::Error {
								kind: InvalidData::UnsolicitedResponse,
								bytes_parsed: start,
							};
						}
						HeadAction::Upgrade => {
							self.phase = Phase::Upgraded;
							return ParseResult::Upgrade(offset);
						}
						HeadAction::SkipBody => {
							sink.on_message_complete();
							return ParseResult::MessageComplete(offset);
						}
						HeadAction::ReadBody => match Decoder::new(length) {
							Some(decoder) => self.phase = Phase::Body(decoder),
							None => {
								sink.on_message_complete();
								return ParseResult::MessageComplete(offset);
							}
						},
					}
				}

				Phase::Body(decoder) => {
					match decoder.decode(&data[offset..], sink) {
						Ok(Progress::NeedMore) => return ParseResult::NeedMore,
						Ok(Progress::Complete(used)) => {
							self.phase = Phase::Head;
							sink.on_message_complete();
							return ParseResult::MessageComplete(offset + used);
						}
						Err((kind, at)) => {
							return ParseResult::Error {
								kind: kind.into(),
								bytes_parsed: offset + at,
							};
						}
					}
				}
			}
		}
	}

	fn finish(&mut self, sink: &mut dyn Sink) -> Result<(), InvalidData> {
		self.finished = true;
		match &self.phase {
			Phase::Body(decoder) if decoder.ends_at_eof() => {
				self.phase = Phase::Head;
				sink.on_message_complete();
				Ok(())
			}
			Phase::Body(_) => Err(InvalidData::Incomplete),
			Phase::Head if !self.head.is_empty() => Err(InvalidData::Incomplete),
			Phase::Head | Phase::Upgraded => Ok(()),
		}
	}
}

/// A set of reusable parsers.
#[derive(Debug, Default)]
pub struct ParserPool {
	parsers: Vec<Parser>,
	stats: PoolStats,
}

impl ParserPool {
	/// Constructs an empty pool.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Takes a parser out of the pool, allocating one if none is idle.
	pub fn acquire(&mut self) -> ParserHandle {
		let index = match self.parsers.iter().position(|p| !p.in_use) {
			Some(index) => index,
			None => {
				self.parsers.push(Parser::new());
				self.parsers.len() - 1
			}
		};
		let parser = &mut self.parsers[index];
		parser.in_use = true;
		parser.reset(Settings::default());
		self.stats.acquired += 1;
		ParserHandle(index)
	}

	/// Prepares an acquired parser to read a new connection.
	pub fn initialize(&mut self, handle: &ParserHandle, kind: ParserKind, settings: Settings) {
		let ParserKind::Response = kind;
		self.parser(handle).reset(settings);
	}

	/// Pushes bytes into a parser.
	pub fn feed(
		&mut self,
		handle: &ParserHandle,
		data: &[u8],
		sink: &mut dyn Sink,
	) -> ParseResult {
		tracing::trace!(len = data.len(), "Feeding parser");
		self.parser(handle).feed(data, sink)
	}

	/// Tells a parser that no more input will arrive.
	///
	/// A body that runs until the end of the connection completes here.
	///
	/// # Errors
	/// This function returns [`InvalidData::Incomplete`] if a message was only partially received.
	pub fn finish(&mut self, handle: &ParserHandle, sink: &mut dyn Sink) -> Result<(), InvalidData> {
		self.stats.finished += 1;
		let parser = self.parser(handle);
		debug_assert!(!parser.finished, "Parser {} finished twice", handle.0);
		parser.finish(sink)
	}

	/// Returns a parser to the pool.
	pub fn release(&mut self, handle: ParserHandle) {
		let parser = self.parser(&handle);
		parser.in_use = false;
		parser.reset(Settings::default());
		self.stats.released += 1;
	}

	/// Returns the pool counters.
	#[must_use]
	pub fn stats(&self) -> PoolStats {
		PoolStats {
			idle: self.parsers.iter().filter(|p| !p.in_use).count(),
			..self.stats
		}
	}

	fn parser(&mut self, handle: &ParserHandle) -> &mut Parser {
		let parser = &mut self.parsers[handle.0];
		debug_assert!(parser.in_use, "Parser {} used while idle", handle.0);
		parser
	}
}

/// A sink that discards everything and rejects every head.
#[derive(Debug)]
pub struct Discard;

impl Sink for Discard {
	fn on_headers(&mut self, _: ResponseHead) -> HeadAction {
		HeadAction::Reject
	}

	fn on_body(&mut self, _: &[u8]) {}

	fn on_message_complete(&mut self) {}
}
