use crate::error::Usage;
use bytes::{BufMut as _, BytesMut};
use std::fmt::Write as _;

/// How a request body is delimited on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Framing {
	/// Bytes are written as given. Used when the caller framed the body itself or the request has
	/// no body.
	Unframed,

	/// The body has a declared length.
	Fixed {
		/// The length declared in `Content-Length`.
		declared: u64,

		/// How much has been written so far.
		sent: u64,
	},

	/// Each write becomes one chunk.
	Chunked,
}

impl Framing {
	/// Constructs a fixed-length framing.
	pub fn fixed(declared: u64) -> Self {
		Self::Fixed { declared, sent: 0 }
	}

	/// Encodes one write of body data into `out`.
	///
	/// Empty writes produce nothing; in particular, an empty chunk would end the body.
	///
	/// # Errors
	/// This function returns [`Usage::ContentLengthMismatch`] if a fixed-length body would
	/// overflow its declared length. Nothing is written in that case.
	pub fn encode(&mut self, data: &[u8], out: &mut BytesMut) -> Result<(), Usage> {
		if data.is_empty() {
			return Ok(());
		}
		match self {
			Self::Unframed => out.put_slice(data),
			Self::Fixed { declared, sent } => {
				let total = *sent + data.len() as u64;
				if total > *declared {
					return Err(Usage::ContentLengthMismatch {
						declared: *declared,
						actual: total,
					});
				}
				*sent = total;
				out.put_slice(data);
			}
			Self::Chunked => {
				let mut header = String::new();
				// Writing to a String cannot fail.
				let _ = write!(header, "{:X}\r\n", data.len());
				out.reserve(header.len() + data.len() + 2);
				out.put_slice(header.as_bytes());
				out.put_slice(data);
				out.put_slice(b"\r\n");
			}
		}
		Ok(())
	}

	/// Encodes the end of the body into `out`.
	///
	/// # Errors
	/// This function returns [`Usage::ContentLengthMismatch`] if a fixed-length body is shorter
	/// than its declared length.
	pub fn finish(&mut self, out: &mut BytesMut) -> Result<(), Usage> {
		match *self {
			Self::Unframed => Ok(()),
			Self::Fixed { declared, sent } if sent == declared => Ok(()),
			Self::Fixed { declared, sent } => Err(Usage::ContentLengthMismatch {
				declared,
				actual: sent,
			}),
			Self::Chunked => {
				out.put_slice(b"0\r\n\r\n");
				Ok(())
			}
		}
	}
}
