/// Checks whether a byte is a `tchar` (token character).
pub fn is_tchar(b: u8) -> bool {
	b.is_ascii_alphanumeric()
		|| matches!(
			b,
			b'!' | b'#'
				| b'$' | b'%'
				| b'&' | b'\''
				| b'*' | b'+'
				| b'-' | b'.'
				| b'^' | b'_'
				| b'`' | b'|'
				| b'~'
		)
}

/// Checks whether a string is a token.
pub fn is_token(name: &str) -> bool {
	!name.is_empty() && name.bytes().all(is_tchar)
}

/// Checks whether a byte can legally appear in an HTTP header value.
pub fn is_field_vchar(b: u8) -> bool {
	b == b'\t' || (b >= 0x20 && b != 0x7F)
}

/// Checks whether a sequence of bytes is a valid HTTP header value.
///
/// Leading and trailing whitespace is tolerated here because it is stripped by the receiver; only
/// control characters (which would allow response splitting) are rejected.
pub fn is_field_value(value: &[u8]) -> bool {
	value.iter().all(|b| is_field_vchar(*b))
}

/// Checks whether a character may appear unescaped in a request path.
pub fn is_request_target_char(c: char) -> bool {
	('\u{21}'..='\u{FF}').contains(&c)
}

/// Checks whether a string is a `request-target`.
///
/// This check is relaxed and does not check the full requirements for path validity.
pub fn is_request_target(req: &str) -> bool {
	!req.is_empty() && req.chars().all(is_request_target_char)
}

/// Checks whether a comma-separated header value contains `option`, compared case-insensitively.
pub fn has_option(value: &[u8], option: &str) -> bool {
	value
		.split(|b| *b == b',')
		.map(trim_ows)
		.any(|candidate| candidate.eq_ignore_ascii_case(option.as_bytes()))
}

/// Strips optional whitespace (spaces and tabs) from both ends of a byte string.
pub fn trim_ows(mut value: &[u8]) -> &[u8] {
	while value.first() == Some(&b' ') || value.first() == Some(&b'\t') {
		value = &value[1..];
	}
	while value.last() == Some(&b' ') || value.last() == Some(&b'\t') {
		value = &value[..value.len() - 1];
	}
	value
}
