//! Errors that originate inside `h1cycle` or `httparse`.
//!
//! Every failure a request can experience is reported as an [`Error`]. Failures detected
//! synchronously at call time, before any I/O happens, are returned directly from the [`Client`]
//! method that detected them and are always of the [`Error::Usage`] variant. Everything else
//! happens asynchronously and is delivered exactly once through an
//! [`EventKind::Error`](crate::EventKind::Error) notification: protocol faults found by the wire
//! parser ([`Error::Parse`]), faults reported by the transport ([`Error::Transport`]), and
//! premature termination of the connection ([`Error::ConnectionReset`]).
//!
//! An [`Error`] converts into a [`std::io::Error`]. Parse faults become
//! [`InvalidData`](std::io::ErrorKind::InvalidData), resets become
//! [`ConnectionReset`](std::io::ErrorKind::ConnectionReset), usage faults become
//! [`InvalidInput`](std::io::ErrorKind::InvalidInput) and transport errors pass through unmodified.
//! If the `detailed-errors` feature is enabled, the converted error carries the original as its
//! inner error; otherwise only the kind survives.
//!
//! [`Client`]: crate::Client

use crate::RequestId;
use std::fmt::{Display, Formatter};

/// The ways in which a received `Content-Length` header can be invalid.
#[derive(Debug, PartialEq)]
pub enum BadContentLength {
	/// The header is not valid UTF-8.
	NotUtf8(std::str::Utf8Error),

	/// The header is not a nonnegative integer or does not fit into a `u64`.
	NotU64(<u64 as std::str::FromStr>::Err),
}

impl Display for BadContentLength {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::NotUtf8(inner) => inner.fmt(f),
			Self::NotU64(inner) => inner.fmt(f),
		}
	}
}

impl std::error::Error for BadContentLength {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::NotUtf8(inner) => Some(inner),
			Self::NotU64(inner) => Some(inner),
		}
	}
}

/// The ways in which a chunk header can be invalid.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BadChunkHeader {
	/// A byte in the chunk size is not a hex digit.
	SizeNotHex,

	/// The size does not fit in a `u64`.
	SizeNotU64,

	/// A character in the chunk header extensions section was not permitted to appear there.
	ExtChar,

	/// A character in a trailer field was not permitted to appear there.
	TrailerChar,

	/// A newline character (CR or LF) was not present where required, either after the chunk
	/// header, after a chunk’s data, or after the blank line following the end marker.
	Newline,
}

impl Display for BadChunkHeader {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::SizeNotHex => write!(f, "Chunk size is not a hex number"),
			Self::SizeNotU64 => write!(f, "Chunk size is too large"),
			Self::ExtChar => write!(f, "Chunk extensions contains invalid character"),
			Self::TrailerChar => write!(f, "Trailer field contains invalid character"),
			Self::Newline => write!(f, "Chunk framing contains incorrect newlines"),
		}
	}
}

impl std::error::Error for BadChunkHeader {}

/// A protocol fault detected by the wire parser.
#[derive(Debug, PartialEq)]
pub enum InvalidData {
	/// An error occurred during parsing headers.
	ParseHeaders(httparse::Error),

	/// The response status line and headers exceed the configured maximum size.
	HeadersTooLarge,

	/// The server sent a response that nobody asked for, either a second response while the first
	/// one is still attached to the request or bytes after the final response completed.
	UnsolicitedResponse,

	/// The server sent both a `Content-Length` header and a `Transfer-Encoding` header.
	ContentLengthAndTransferEncoding,

	/// The server sent a `Content-Length` header with a 204 No Content status code.
	ContentLengthWithNoContent,

	/// The server sent multiple `Content-Length` headers.
	MultipleContentLengths,

	/// The server sent an invalid `Content-Length` header.
	BadContentLength(BadContentLength),

	/// The server sent a `Transfer-Encoding` header with a 204 No Content status code.
	TransferEncodingWithNoContent,

	/// The server sent a `Transfer-Encoding` header whose final coding is not `chunked`.
	NotChunked,

	/// The server sent an invalid chunk header.
	BadChunkHeader(BadChunkHeader),

	/// The connection ended in the middle of a response whose length was known.
	Incomplete,
}

impl Display for InvalidData {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::ParseHeaders(inner) => inner.fmt(f),
			Self::HeadersTooLarge => write!(f, "Response headers too large"),
			Self::UnsolicitedResponse => write!(f, "Unsolicited response received"),
			Self::ContentLengthAndTransferEncoding => {
				write!(f, "Content-Length and Transfer-Encoding both received")
			}
			Self::ContentLengthWithNoContent => {
				write!(f, "Content-Length received in 204 No Content response")
			}
			Self::MultipleContentLengths => write!(f, "Multiple Content-Length headers received"),
			Self::BadContentLength(inner) => {
				write!(f, "Invalid Content-Length header received: {}", inner)
			}
			Self::TransferEncodingWithNoContent => {
				write!(f, "Transfer-Encoding received in 204 No Content response")
			}
			Self::NotChunked => write!(f, "Unsupported Transfer-Encoding received"),
			Self::BadChunkHeader(inner) => write!(f, "Invalid chunk header received: {}", inner),
			Self::Incomplete => write!(f, "Response ended before its declared length"),
		}
	}
}

impl std::error::Error for InvalidData {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::ParseHeaders(inner) => Some(inner),
			Self::BadContentLength(inner) => Some(inner),
			Self::BadChunkHeader(inner) => Some(inner),
			Self::HeadersTooLarge
			| Self::UnsolicitedResponse
			| Self::ContentLengthAndTransferEncoding
			| Self::ContentLengthWithNoContent
			| Self::MultipleContentLengths
			| Self::TransferEncodingWithNoContent
			| Self::NotChunked
			| Self::Incomplete => None,
		}
	}
}

impl From<httparse::Error> for InvalidData {
	fn from(inner: httparse::Error) -> Self {
		Self::ParseHeaders(inner)
	}
}

impl From<BadContentLength> for InvalidData {
	fn from(inner: BadContentLength) -> Self {
		Self::BadContentLength(inner)
	}
}

impl From<BadChunkHeader> for InvalidData {
	fn from(inner: BadChunkHeader) -> Self {
		Self::BadChunkHeader(inner)
	}
}

/// A parser fault together with the bytes that provoked it.
#[derive(Debug, PartialEq)]
pub struct ParseError {
	/// What was wrong.
	pub kind: InvalidData,

	/// How many bytes of `raw_packet` were consumed successfully before the fault.
	pub bytes_parsed: usize,

	/// The chunk of data, as delivered by the transport, in which the fault was found.
	pub raw_packet: bytes::Bytes,
}

impl Display for ParseError {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		write!(
			f,
			"Parse error at byte {} of {}: {}",
			self.bytes_parsed,
			self.raw_packet.len(),
			self.kind
		)
	}
}

impl std::error::Error for ParseError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		Some(&self.kind)
	}
}

/// A synchronous validation failure.
///
/// These are raised at call time, before any I/O, and never touch the request lifecycle.
#[derive(Debug, Eq, PartialEq)]
pub enum Usage {
	/// The request head has already been serialized, so headers can no longer change.
	HeadersSent,

	/// The request was built from a raw header block, which is sent verbatim and cannot be edited.
	RawHeaders,

	/// The request method is not a token.
	InvalidMethod(String),

	/// The request path contains characters that must be escaped.
	InvalidPath,

	/// A header name is not a token.
	InvalidHeaderName(String),

	/// A header value contains forbidden characters.
	InvalidHeaderValue(String),

	/// The request protocol does not match the protocol of the agent.
	ProtocolMismatch {
		/// The protocol the agent speaks.
		expected: String,

		/// The protocol the request asked for.
		actual: String,
	},

	/// Body bytes were written after the request was ended.
	WriteAfterEnd,

	/// Body bytes were written after the request was destroyed.
	Destroyed,

	/// The amount of body written disagrees with the `Content-Length` header.
	ContentLengthMismatch {
		/// The length declared in the header.
		declared: u64,

		/// The number of bytes the caller tried to send.
		actual: u64,
	},

	/// No live request has this identifier.
	UnknownRequest(RequestId),

	/// A socket was assigned while another request is still bound to it.
	SocketInUse,
}

impl Display for Usage {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::HeadersSent => write!(f, "Cannot set headers after they are sent"),
			Self::RawHeaders => write!(f, "Raw header blocks cannot be modified"),
			Self::InvalidMethod(m) => write!(f, "Method {:?} is not a valid HTTP token", m),
			Self::InvalidPath => write!(f, "Request path contains unescaped characters"),
			Self::InvalidHeaderName(n) => write!(f, "Header name {:?} is not a valid HTTP token", n),
			Self::InvalidHeaderValue(n) => write!(f, "Invalid character in header {:?}", n),
			Self::ProtocolMismatch { expected, actual } => {
				write!(f, "Protocol {:?} not supported, expected {:?}", actual, expected)
			}
			Self::WriteAfterEnd => write!(f, "Write after end"),
			Self::Destroyed => write!(f, "Cannot write to a destroyed request"),
			Self::ContentLengthMismatch { declared, actual } => write!(
				f,
				"Request body length {} does not match Content-Length {}",
				actual, declared
			),
			Self::UnknownRequest(id) => write!(f, "No live request {}", id),
			Self::SocketInUse => write!(f, "Socket is already bound to a request"),
		}
	}
}

impl std::error::Error for Usage {}

/// Why a connection was classified as reset.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reset {
	/// The connection ended before any response arrived.
	HangUp,

	/// The connection ended while a response body was still arriving.
	Aborted,
}

/// A coarse classification of [`Error`], for callers that only need to branch on the category.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
	/// See [`Error::Usage`].
	Usage,

	/// See [`Error::Parse`].
	Protocol,

	/// See [`Error::ConnectionReset`].
	ConnectionReset,

	/// See [`Error::Transport`].
	Transport,

	/// See [`Error::Custom`].
	Custom,
}

/// The type of every error reported by `h1cycle`.
#[derive(Debug)]
pub enum Error {
	/// A synchronous validation failure.
	Usage(Usage),

	/// The server sent a malformed or unexpected message.
	Parse(ParseError),

	/// The connection ended before the response was complete.
	ConnectionReset(Reset),

	/// The transport reported an error.
	Transport(std::io::Error),

	/// The application destroyed the request with a reason of its own.
	Custom(String),
}

impl Error {
	/// Returns the category of this error.
	#[must_use]
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Usage(_) => ErrorKind::Usage,
			Self::Parse(_) => ErrorKind::Protocol,
			Self::ConnectionReset(_) => ErrorKind::ConnectionReset,
			Self::Transport(_) => ErrorKind::Transport,
			Self::Custom(_) => ErrorKind::Custom,
		}
	}
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		match self {
			Self::Usage(inner) => inner.fmt(f),
			Self::Parse(inner) => inner.fmt(f),
			Self::ConnectionReset(Reset::HangUp) => write!(f, "socket hang up"),
			Self::ConnectionReset(Reset::Aborted) => write!(f, "aborted"),
			Self::Transport(inner) => inner.fmt(f),
			Self::Custom(reason) => f.write_str(reason),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Usage(inner) => Some(inner),
			Self::Parse(inner) => Some(inner),
			Self::Transport(inner) => Some(inner),
			Self::ConnectionReset(_) | Self::Custom(_) => None,
		}
	}
}

impl From<Usage> for Error {
	fn from(inner: Usage) -> Self {
		Self::Usage(inner)
	}
}

impl From<ParseError> for Error {
	fn from(inner: ParseError) -> Self {
		Self::Parse(inner)
	}
}

impl From<std::io::Error> for Error {
	fn from(inner: std::io::Error) -> Self {
		Self::Transport(inner)
	}
}

impl From<Error> for std::io::Error {
	#[cfg(feature = "detailed-errors")]
	fn from(inner: Error) -> Self {
		use std::io::ErrorKind as K;
		match inner {
			Error::Transport(inner) => inner,
			Error::Parse(_) => Self::new(K::InvalidData, inner),
			Error::ConnectionReset(_) => Self::new(K::ConnectionReset, inner),
			Error::Usage(_) => Self::new(K::InvalidInput, inner),
			Error::Custom(_) => Self::new(K::Other, inner),
		}
	}

	#[cfg(not(feature = "detailed-errors"))]
	fn from(inner: Error) -> Self {
		use std::io::ErrorKind as K;
		match inner {
			Error::Transport(inner) => inner,
			Error::Parse(_) => K::InvalidData.into(),
			Error::ConnectionReset(_) => K::ConnectionReset.into(),
			Error::Usage(_) => K::InvalidInput.into(),
			Error::Custom(_) => K::Other.into(),
		}
	}
}
