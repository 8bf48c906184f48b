use crate::error::{BadContentLength, InvalidData};
use crate::headers::HeaderMap;
use crate::response::ResponseHead;
use crate::util::{has_option, trim_ows};

/// How the body of a response is delimited.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BodyLength {
	/// The message ends with its header block.
	Empty,

	/// The body is exactly this many bytes long.
	Fixed(u64),

	/// The body uses chunked transfer coding.
	Chunked,

	/// The body runs until the server closes the connection.
	Eof,
}

/// The transfer coding named last in the `Transfer-Encoding` header(s).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Coding {
	Chunked,
	Other,
}

/// Scans the buffer and determines the length of the response head.
///
/// If the whole head has been received, returns `Some(n)` where `n` is the length of the head in
/// bytes, including the final [CR]LF[CR]LF. Otherwise returns `None`.
pub fn headers_length(buffer: &[u8]) -> Option<usize> {
	// position() reports the distance from wherever the previous call stopped, not from the start
	// of the buffer.
	let mut start_pos = 0;
	let mut iter = buffer.iter();
	while let Some(dist) = iter.position(|&b| b == b'\n' || b == b'\r') {
		let eol_pos = start_pos + dist;
		for &candidate in &[
			&b"\r\n\r\n"[..],
			&b"\r\n\n"[..],
			&b"\n\r\n"[..],
			&b"\n\n"[..],
		] {
			if buffer[eol_pos..].starts_with(candidate) {
				return Some(eol_pos + candidate.len());
			}
		}
		start_pos = eol_pos + 1;
	}
	None
}

/// Parses a complete response head.
///
/// `buffer` must hold exactly one head as measured by [`headers_length`]. At most `max_headers`
/// fields are accepted. `lenient` relaxes the framing checks described in [`body_length`].
///
/// # Errors
/// This function returns an error if the status line or headers are malformed, or if the framing
/// headers are contradictory.
pub fn parse(
	buffer: &[u8],
	max_headers: usize,
	lenient: bool,
) -> Result<(ResponseHead, BodyLength), InvalidData> {
	let mut storage = vec![httparse::EMPTY_HEADER; max_headers];
	let mut resp = httparse::Response::new(&mut storage);
	match resp.parse(buffer)? {
		httparse::Status::Complete(n) if n == buffer.len() => (),
		// httparse disagrees about where the head ends, which means the newlines are malformed in
		// some way that headers_length accepted.
		_ => return Err(httparse::Error::NewLine.into()),
	}
	let (minor_version, status, reason) = match (resp.version, resp.code, resp.reason) {
		(Some(v), Some(c), Some(r)) => (v, c, r.to_owned()),
		_ => return Err(httparse::Error::Status.into()),
	};
	let headers: HeaderMap = resp.headers.iter().map(|h| (h.name, h.value)).collect();

	let length = body_length(status, &headers, lenient)?;
	let keep_alive = length != BodyLength::Eof && persistent(minor_version, &headers);
	Ok((
		ResponseHead {
			minor_version,
			status,
			reason,
			headers,
			keep_alive,
			upgrade: status == 101,
		},
		length,
	))
}

/// Decides whether the connection may persist after a response, ignoring body framing.
fn persistent(minor_version: u8, headers: &HeaderMap) -> bool {
	let mut close = false;
	let mut keep_alive = false;
	for value in headers.get_all("connection") {
		close |= has_option(value, "close");
		keep_alive |= has_option(value, "keep-alive");
	}
	if minor_version >= 1 {
		!close
	} else {
		keep_alive && !close
	}
}

/// Applies the message body length rules of RFC 7230 §3.3.3 to a response.
///
/// Responses to HEAD requests are not handled here; the caller decides that after seeing the
/// head.
///
/// # Errors
/// In strict mode this function returns an error under the following conditions:
/// * if both `Content-Length` and `Transfer-Encoding` are present
/// * if the final transfer coding is not chunked
/// * if either header is present in a 204 No Content response
/// * if `Content-Length` appears more than once with different values
///
/// In lenient mode `Transfer-Encoding` wins over `Content-Length`, the first `Content-Length`
/// wins over later ones, and unknown transfer codings are read until the connection closes.
/// Malformed `Content-Length` values are rejected in both modes.
pub fn body_length(
	status: u16,
	headers: &HeaderMap,
	lenient: bool,
) -> Result<BodyLength, InvalidData> {
	let content_length = get_content_length(headers, lenient)?;
	let coding = transfer_coding(headers);

	// 1xx, 204 and 304 responses are always terminated by the first empty line after the header
	// fields.
	if (100..200).contains(&status) || status == 304 {
		return Ok(BodyLength::Empty);
	}
	if status == 204 {
		if !lenient {
			if coding.is_some() {
				return Err(InvalidData::TransferEncodingWithNoContent);
			}
			if content_length.is_some() {
				return Err(InvalidData::ContentLengthWithNoContent);
			}
		}
		return Ok(BodyLength::Empty);
	}

	match coding {
		Some(_) if content_length.is_some() && !lenient => {
			Err(InvalidData::ContentLengthAndTransferEncoding)
		}
		Some(Coding::Chunked) => Ok(BodyLength::Chunked),
		Some(Coding::Other) if lenient => Ok(BodyLength::Eof),
		Some(Coding::Other) => Err(InvalidData::NotChunked),
		None => Ok(match content_length {
			Some(0) => BodyLength::Empty,
			Some(n) => BodyLength::Fixed(n),
			None => BodyLength::Eof,
		}),
	}
}

/// Decodes the `Content-Length` header, if any.
fn get_content_length(headers: &HeaderMap, lenient: bool) -> Result<Option<u64>, InvalidData> {
	let mut ret = None;
	for value in headers.get_all("content-length") {
		let value = std::str::from_utf8(trim_ows(value)).map_err(BadContentLength::NotUtf8)?;
		let value = value.parse::<u64>().map_err(BadContentLength::NotU64)?;
		match ret {
			None => ret = Some(value),
			Some(previous) if previous == value || lenient => (),
			Some(_) => return Err(InvalidData::MultipleContentLengths),
		}
	}
	Ok(ret)
}

/// Finds the final transfer coding across every `Transfer-Encoding` header.
fn transfer_coding(headers: &HeaderMap) -> Option<Coding> {
	let last = headers
		.get_all("transfer-encoding")
		.flat_map(|value| value.split(|b| *b == b','))
		.map(trim_ows)
		.filter(|coding| !coding.is_empty())
		.last();
	if headers.contains("transfer-encoding") {
		Some(match last {
			Some(coding) if coding.eq_ignore_ascii_case(b"chunked") => Coding::Chunked,
			_ => Coding::Other,
		})
	} else {
		None
	}
}
