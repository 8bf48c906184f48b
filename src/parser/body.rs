use super::head::BodyLength;
use super::Sink;
use crate::error::BadChunkHeader;
use crate::util::{is_field_vchar, is_tchar};
use std::num::NonZeroU64;

/// Checks whether a character can legally appear in the chunk extensions section.
fn is_chunk_ext_char(b: u8) -> bool {
	b == b'\t' || !b.is_ascii_control()
}

/// The value of a hex digit.
fn nybble(b: u8) -> Option<u64> {
	(b as char).to_digit(16).map(u64::from)
}

/// The different states that the chunked decoder can be in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum State {
	/// The size part of a chunk header is being read, and no characters have been seen yet.
	SizeFirst,

	/// The size part of a chunk header is being read, and at least one hex digit has been seen.
	///
	/// The contained value is the decoded chunk size read so far.
	SizeRest(u64),

	/// The chunk extensions are being read.
	///
	/// The contained value is the chunk size.
	Ext(u64),

	/// The LF at the end of a chunk header is being read.
	///
	/// The contained value is the chunk size.
	HeaderLF(u64),

	/// The chunk data is being read.
	///
	/// The contained value is the remaining chunk size.
	Data(NonZeroU64),

	/// The CR following the chunk data is being read.
	DataCR,

	/// The LF following the chunk data is being read.
	DataLF,

	/// The start of a trailer line, or the CR of the blank line that ends the body, is being read.
	FinalCR,

	/// A trailer field is being read.
	Trailer,

	/// The LF at the end of a trailer field is being read.
	TrailerLF,

	/// The LF of the blank line that ends the body is being read.
	FinalLF,

	/// Everything has been read.
	Done,
}

/// Decodes a body delimited with chunked transfer coding, a byte slice at a time.
#[derive(Debug)]
pub struct Chunked {
	state: State,
}

impl Chunked {
	pub fn new() -> Self {
		Self {
			state: State::SizeFirst,
		}
	}

	/// Consumes bytes from `input`, passing chunk data to `sink`.
	///
	/// On success, returns the number of bytes consumed. All of `input` is consumed unless the
	/// body ends partway through it. On failure, returns the error and the offset of the byte that
	/// caused it.
	fn decode(
		&mut self,
		input: &[u8],
		sink: &mut dyn Sink,
	) -> Result<usize, (BadChunkHeader, usize)> {
		let mut pos = 0;
		while pos < input.len() && self.state != State::Done {
			if let State::Data(remaining) = self.state {
				let available = input.len() - pos;
				let take = std::cmp::min(remaining.get(), available as u64) as usize;
				sink.on_body(&input[pos..pos + take]);
				pos += take;
				self.state = match NonZeroU64::new(remaining.get() - take as u64) {
					Some(n) => State::Data(n),
					None => State::DataCR,
				};
				continue;
			}

			let b = input[pos];
			self.state = match self.advance(b) {
				Ok(next) => next,
				Err(e) => return Err((e, pos)),
			};
			pos += 1;
		}
		Ok(pos)
	}

	/// Computes the state that follows the current one after consuming framing byte `b`.
	fn advance(&self, b: u8) -> Result<State, BadChunkHeader> {
		Ok(match self.state {
			State::SizeFirst => State::SizeRest(nybble(b).ok_or(BadChunkHeader::SizeNotHex)?),
			State::SizeRest(size_so_far) => match b {
				b';' | b' ' | b'\t' => State::Ext(size_so_far),
				b'\r' => State::HeaderLF(size_so_far),
				_ => {
					let n = nybble(b).ok_or(BadChunkHeader::SizeNotHex)?;
					if size_so_far >= 0x1000_0000_0000_0000_u64 {
						// Adding another digit would overflow.
						return Err(BadChunkHeader::SizeNotU64);
					}
					State::SizeRest((size_so_far << 4) | n)
				}
			},
			State::Ext(chunk_size) => match b {
				b'\r' => State::HeaderLF(chunk_size),
				b if is_chunk_ext_char(b) => State::Ext(chunk_size),
				_ => return Err(BadChunkHeader::ExtChar),
			},
			State::HeaderLF(chunk_size) if b == b'\n' => match NonZeroU64::new(chunk_size) {
				Some(n) => State::Data(n),
				None => State::FinalCR,
			},
			State::DataCR if b == b'\r' => State::DataLF,
			State::DataLF if b == b'\n' => State::SizeFirst,
			State::FinalCR => match b {
				b'\r' => State::FinalLF,
				b if is_tchar(b) => State::Trailer,
				_ => return Err(BadChunkHeader::TrailerChar),
			},
			State::Trailer => match b {
				b'\r' => State::TrailerLF,
				b if is_field_vchar(b) => State::Trailer,
				_ => return Err(BadChunkHeader::TrailerChar),
			},
			State::TrailerLF if b == b'\n' => State::FinalCR,
			State::FinalLF if b == b'\n' => State::Done,
			State::HeaderLF(_)
			| State::DataCR
			| State::DataLF
			| State::TrailerLF
			| State::FinalLF => return Err(BadChunkHeader::Newline),
			State::Data(_) | State::Done => {
				debug_assert!(false, "Chunked::advance called in state {:?}", self.state);
				self.state
			}
		})
	}

	fn is_done(&self) -> bool {
		self.state == State::Done
	}
}

/// Decodes one response body of any framing.
#[derive(Debug)]
pub enum Decoder {
	/// The body has this many bytes left.
	Fixed(NonZeroU64),

	/// The body is chunked.
	Chunked(Chunked),

	/// The body runs until the transport ends.
	Eof,
}

/// What happened to a slice of input passed to [`Decoder::decode`].
#[derive(Debug, Eq, PartialEq)]
pub enum Progress {
	/// All input was consumed and the body is not finished.
	NeedMore,

	/// The body finished after consuming this many bytes.
	Complete(usize),
}

impl Decoder {
	/// Constructs a decoder for a body of the given length, or `None` if there is no body.
	pub fn new(length: BodyLength) -> Option<Self> {
		match length {
			BodyLength::Empty => None,
			BodyLength::Fixed(n) => NonZeroU64::new(n).map(Self::Fixed),
			BodyLength::Chunked => Some(Self::Chunked(Chunked::new())),
			BodyLength::Eof => Some(Self::Eof),
		}
	}

	/// Consumes body bytes from `input`, passing decoded data to `sink`.
	///
	/// # Errors
	/// Returns the chunk framing error and the offset into `input` at which it was found.
	pub fn decode(
		&mut self,
		input: &[u8],
		sink: &mut dyn Sink,
	) -> Result<Progress, (BadChunkHeader, usize)> {
		match self {
			Self::Fixed(remaining) => {
				let take = std::cmp::min(remaining.get(), input.len() as u64) as usize;
				if take != 0 {
					sink.on_body(&input[..take]);
				}
				match NonZeroU64::new(remaining.get() - take as u64) {
					Some(n) => {
						*remaining = n;
						Ok(Progress::NeedMore)
					}
					None => Ok(Progress::Complete(take)),
				}
			}
			Self::Chunked(chunked) => {
				let used = chunked.decode(input, sink)?;
				if chunked.is_done() {
					Ok(Progress::Complete(used))
				} else {
					debug_assert_eq!(used, input.len());
					Ok(Progress::NeedMore)
				}
			}
			Self::Eof => {
				if !input.is_empty() {
					sink.on_body(input);
				}
				Ok(Progress::NeedMore)
			}
		}
	}

	/// Returns whether the transport ending is a legitimate end of this body.
	pub fn ends_at_eof(&self) -> bool {
		matches!(self, Self::Eof)
	}
}
