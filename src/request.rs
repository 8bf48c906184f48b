//! The request half of a request/response cycle.

mod body;
mod head;
mod outgoing;

pub use body::Framing;
pub use head::HeaderBlock;
pub use outgoing::{Outgoing, OutgoingMessage};

use crate::error::Usage;
use crate::headers::HeaderMap;
use crate::util::{has_option, is_request_target, is_token};
use std::time::Duration;

/// The default port for plain HTTP.
const DEFAULT_PORT: u16 = 80;

/// Methods whose requests carry a body unless told otherwise.
///
/// A request with one of the methods listed here gets no framing header unless the caller adds
/// one; any other method gets `Content-Length` or chunked transfer coding.
const BODYLESS_BY_DEFAULT: &[&str] = &["GET", "HEAD", "DELETE", "OPTIONS", "TRACE", "CONNECT"];

/// Everything needed to issue a request.
#[derive(Clone, Debug)]
pub struct RequestOptions {
	/// The request method. It is converted to upper case.
	pub method: String,

	/// The request target, which must not contain characters that need escaping.
	pub path: String,

	/// The server’s host name, used for the `Host` header.
	pub host: String,

	/// The server’s port, used for the `Host` header when it differs from the default.
	pub port: Option<u16>,

	/// The URL scheme of the request, including the trailing colon. It must match the agent’s.
	pub protocol: String,

	/// The header fields.
	pub headers: HeaderBlock,

	/// Whether to add a `Host` header when the caller did not supply one.
	pub set_host: bool,

	/// Whether the connection should be reused afterwards. `None` follows the agent.
	pub keep_alive: Option<bool>,

	/// Inactivity timeout. `None` follows the agent.
	pub timeout: Option<Duration>,

	/// Maximum response head size. `None` follows the client configuration.
	pub max_header_size: Option<usize>,

	/// Whether to parse the response leniently. `None` follows the client configuration.
	pub insecure_http_parser: Option<bool>,
}

impl Default for RequestOptions {
	fn default() -> Self {
		Self {
			method: "GET".to_owned(),
			path: "/".to_owned(),
			host: "localhost".to_owned(),
			port: None,
			protocol: "http:".to_owned(),
			headers: HeaderBlock::Fields(HeaderMap::new()),
			set_host: true,
			keep_alive: None,
			timeout: None,
			max_header_size: None,
			insecure_http_parser: None,
		}
	}
}

impl RequestOptions {
	/// Constructs options for a request with the given method and path and defaults otherwise.
	#[must_use]
	pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
		Self {
			method: method.into(),
			path: path.into(),
			..Self::default()
		}
	}

	/// The value of the `Host` header these options imply.
	#[must_use]
	pub fn host_header(&self) -> String {
		match self.port {
			Some(port) if port != DEFAULT_PORT => format!("{}:{}", self.host, port),
			_ => self.host.clone(),
		}
	}
}

/// An HTTP request message being written.
///
/// This decides the implicit parts of the head: `Connection` and body framing.
#[derive(Debug)]
pub struct ClientRequest {
	/// The request method, in upper case.
	method: String,

	/// The request target.
	path: String,

	/// Header fields, latch and queued output.
	outgoing: Outgoing,

	/// Whether the agent pools connections.
	agent_keep_alive: bool,

	/// Whether the connection should be reused after this cycle.
	should_keep_alive: bool,
}

impl ClientRequest {
	/// Validates `options` and builds the request.
	///
	/// A request with an `Expect` header, or with a raw header block, has its head serialized
	/// immediately.
	///
	/// # Errors
	/// This function returns an error if the method, path or any header is invalid, or if the
	/// protocol does not match the agent's.
	pub(crate) fn new(
		options: &RequestOptions,
		agent_protocol: &str,
		agent_keep_alive: bool,
		high_water_mark: usize,
	) -> Result<Self, Usage> {
		if options.protocol != agent_protocol {
			return Err(Usage::ProtocolMismatch {
				expected: agent_protocol.to_owned(),
				actual: options.protocol.clone(),
			});
		}
		if !is_token(&options.method) {
			return Err(Usage::InvalidMethod(options.method.clone()));
		}
		if !is_request_target(&options.path) {
			return Err(Usage::InvalidPath);
		}

		let mut headers = options.headers.clone();
		match &mut headers {
			HeaderBlock::Fields(map) => {
				for field in map.iter() {
					outgoing::validate_field(&field.name, &field.value)?;
				}
				if options.set_host && !map.contains("host") {
					map.insert("Host", options.host_header());
				}
			}
			HeaderBlock::Raw(fields) => {
				for (name, value) in fields.iter() {
					outgoing::validate_field(name, value)?;
				}
			}
		}

		let raw = matches!(headers, HeaderBlock::Raw(_));
		let mut req = Self {
			method: options.method.to_ascii_uppercase(),
			path: options.path.clone(),
			outgoing: Outgoing::new(headers, high_water_mark),
			agent_keep_alive,
			should_keep_alive: agent_keep_alive && options.keep_alive != Some(false),
		};
		if raw || req.outgoing.has_header("expect") {
			req.implicit_header(None)?;
		}
		Ok(req)
	}

	/// Returns the request method.
	pub fn method(&self) -> &str {
		&self.method
	}

	/// Returns the request target.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Returns whether the connection should be reused after this cycle.
	pub fn should_keep_alive(&self) -> bool {
		self.should_keep_alive
	}

	/// Stops the connection from being reused after this cycle.
	pub(crate) fn refuse_keep_alive(&mut self) {
		self.should_keep_alive = false;
	}

	/// Returns whether this is a HEAD request.
	pub fn is_head(&self) -> bool {
		self.method == "HEAD"
	}

	/// Returns whether this is a CONNECT request.
	pub fn is_connect(&self) -> bool {
		self.method == "CONNECT"
	}

	/// Applies any `Connection` header the caller supplied to the keep-alive decision.
	fn apply_connection_header(&mut self) {
		let (close, keep_alive) = match self.outgoing.get_header("connection") {
			Some(value) => (has_option(value, "close"), has_option(value, "keep-alive")),
			None => return,
		};
		if close {
			self.should_keep_alive = false;
		} else if keep_alive && self.agent_keep_alive {
			self.should_keep_alive = true;
		}
	}

	/// Chooses the body framing and any framing header to add.
	fn framing(&self, known_length: Option<u64>) -> (Framing, Option<(&'static str, String)>) {
		if let Some(value) = self.outgoing.get_header("content-length") {
			let declared = std::str::from_utf8(value)
				.ok()
				.and_then(|v| v.trim().parse::<u64>().ok());
			return (declared.map_or(Framing::Unframed, Framing::fixed), None);
		}
		if let Some(value) = self.outgoing.get_header("transfer-encoding") {
			let framing = if has_option(value, "chunked") {
				Framing::Chunked
			} else {
				Framing::Unframed
			};
			return (framing, None);
		}
		if BODYLESS_BY_DEFAULT.contains(&self.method.as_str()) {
			return (Framing::Unframed, None);
		}
		match known_length {
			Some(n) => (
				Framing::fixed(n),
				Some(("Content-Length", n.to_string())),
			),
			None => (
				Framing::Chunked,
				Some(("Transfer-Encoding", "chunked".to_owned())),
			),
		}
	}
}

impl OutgoingMessage for ClientRequest {
	fn outgoing(&self) -> &Outgoing {
		&self.outgoing
	}

	fn outgoing_mut(&mut self) -> &mut Outgoing {
		&mut self.outgoing
	}

	fn implicit_header(&mut self, known_length: Option<u64>) -> Result<(), Usage> {
		self.apply_connection_header();
		if let HeaderBlock::Raw(_) = self.outgoing.headers() {
			return self
				.outgoing
				.store_header(&self.method, &self.path, &[], Framing::Unframed);
		}

		let mut extra = Vec::new();
		if !self.outgoing.has_header("connection") {
			let value = if self.should_keep_alive {
				"keep-alive"
			} else {
				"close"
			};
			extra.push(("Connection", value.to_owned()));
		}
		let (framing, framing_header) = self.framing(known_length);
		extra.extend(framing_header);
		self.outgoing
			.store_header(&self.method, &self.path, &extra, framing)
	}

	fn finish(&mut self) -> Result<(), Usage> {
		self.outgoing.finish()?;
		tracing::trace!(method = %self.method, path = %self.path, "Request body finished");
		Ok(())
	}
}
