//! Engine-wide configuration.

use std::str::FromStr;

/// Default limit on the size of a response status line plus headers.
pub const DEFAULT_MAX_HEADER_SIZE: usize = 16 * 1024;

/// Default limit on the number of response header fields.
pub const DEFAULT_MAX_HEADERS: usize = 128;

/// Default amount of unsent request output above which writes report back-pressure.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Settings shared by every request issued through one [`Client`](crate::Client).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
	/// Maximum size, in bytes, of a response status line plus headers.
	pub max_header_size: usize,

	/// Maximum number of response header fields.
	pub max_headers: usize,

	/// Whether to accept responses with ambiguous or non-conforming framing.
	pub insecure_http_parser: bool,

	/// Amount of buffered, unsent request output above which `write` asks the caller to wait for
	/// `Drain`.
	pub high_water_mark: usize,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			max_header_size: DEFAULT_MAX_HEADER_SIZE,
			max_headers: DEFAULT_MAX_HEADERS,
			insecure_http_parser: false,
			high_water_mark: DEFAULT_HIGH_WATER_MARK,
		}
	}
}

impl ClientConfig {
	/// Builds a configuration from the environment.
	///
	/// Reads `H1CYCLE_MAX_HEADER_SIZE`, `H1CYCLE_MAX_HEADERS`, `H1CYCLE_INSECURE_PARSER` and
	/// `H1CYCLE_HIGH_WATER_MARK`. Variables that are absent or malformed leave the default in
	/// place.
	#[must_use]
	pub fn load() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		fn parse<T: FromStr>(raw: Option<String>, default: T) -> T {
			raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
		}

		let defaults = Self::default();
		let insecure = match lookup("H1CYCLE_INSECURE_PARSER").as_deref().map(str::trim) {
			Some("1") | Some("true") | Some("yes") => true,
			Some("0") | Some("false") | Some("no") => false,
			_ => defaults.insecure_http_parser,
		};
		let config = Self {
			max_header_size: parse(lookup("H1CYCLE_MAX_HEADER_SIZE"), defaults.max_header_size),
			max_headers: parse(lookup("H1CYCLE_MAX_HEADERS"), defaults.max_headers),
			insecure_http_parser: insecure,
			high_water_mark: parse(lookup("H1CYCLE_HIGH_WATER_MARK"), defaults.high_water_mark),
		};
		tracing::debug!(
			max_header_size = config.max_header_size,
			max_headers = config.max_headers,
			insecure_http_parser = config.insecure_http_parser,
			high_water_mark = config.high_water_mark,
			"Client configuration loaded"
		);
		config
	}
}
