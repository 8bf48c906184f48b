use crate::headers::HeaderMap;
use crate::util::{is_field_value, is_request_target, is_token};
use bytes::{BufMut as _, BytesMut};

/// The headers to put in a request head.
#[derive(Clone, Debug)]
pub enum HeaderBlock {
	/// Fields that can still be edited, followed by whatever implicit fields the message adds.
	Fields(HeaderMap),

	/// Fields sent verbatim and never edited, with nothing added.
	Raw(Vec<(String, Vec<u8>)>),
}

/// Serializes a request line and header block into `out`.
///
/// `extra` holds fields computed at serialization time (connection management and framing); they
/// are written after the caller's own fields. The caller must already have validated every piece.
pub fn serialize(
	method: &str,
	request_target: &str,
	headers: &HeaderBlock,
	extra: &[(&str, String)],
	out: &mut BytesMut,
) {
	debug_assert!(is_token(method), "Request method {} is not a token", method);
	debug_assert!(
		is_request_target(request_target),
		"Request target contains invalid characters"
	);

	out.put_slice(method.as_bytes());
	out.put_u8(b' ');
	// The target holds nothing above U+00FF; each character goes out as one Latin-1 byte.
	out.extend(request_target.chars().map(|c| c as u8));
	out.put_slice(b" HTTP/1.1\r\n");

	match headers {
		HeaderBlock::Fields(map) => {
			for field in map {
				put_field(out, &field.name, &field.value);
			}
			for (name, value) in extra {
				put_field(out, name, value.as_bytes());
			}
		}
		HeaderBlock::Raw(fields) => {
			debug_assert!(extra.is_empty(), "Raw header blocks take no implicit fields");
			for (name, value) in fields {
				put_field(out, name, value);
			}
		}
	}

	out.put_slice(b"\r\n");
}

fn put_field(out: &mut BytesMut, name: &str, value: &[u8]) {
	debug_assert!(is_token(name), "Request header {} is not a token", name);
	debug_assert!(
		is_field_value(value),
		"Request header value {:?} is not a valid field value",
		value
	);
	out.put_slice(name.as_bytes());
	out.put_slice(b": ");
	out.put_slice(value);
	out.put_slice(b"\r\n");
}
