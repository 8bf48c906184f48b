#![forbid(unsafe_code)]
#![warn(
	future_incompatible,
	nonstandard_style,
	rust_2018_idioms,
	rustdoc,
	unused
)]
#![warn(
	deprecated_in_future,
	missing_crate_level_docs,
	missing_debug_implementations,
	missing_docs,
	// Disabled due to <https://github.com/rust-lang/rust/issues/69952> and
	// <https://github.com/rust-lang/rust/issues/77217>.
	// single_use_lifetimes,
	trivial_casts,
	trivial_numeric_casts,
	unused_crate_dependencies,
	unused_import_braces,
	// Disabled due to <https://github.com/rust-lang/rust/issues/77217>.
	// unused_lifetimes,
	unused_qualifications,
	unused_results
)]
#![warn(clippy::pedantic, clippy::cargo)]
// Disabled because we frequently mix u64 and usize, where the former is used for message body
// lengths and the latter for in-memory buffer sizes.
#![allow(clippy::cast_possible_truncation)]

//! HTTP/1.1 Request/Response Cycle Engine
//!
//! This crate drives HTTP/1.1 client request/response cycles over connections that it does not
//! own. It serializes requests, parses responses, and decides after every cycle whether a
//! connection goes back to a pool or is destroyed. Keep-alive reuse, protocol upgrades, `CONNECT`
//! tunnels, informational responses, timeouts and aborts are all handled, and every request
//! reports its end exactly once through a [`Close`](EventKind::Close) notification.
//!
//! The engine performs no I/O by itself. The application supplies connections through an
//! [`Agent`], feeds socket activity in through the `socket_*` methods of [`Client`] (or lets
//! [`Client`]’s [`Stream`](futures_core::Stream) implementation poll [`Transport`]s for it), and
//! pulls [`Event`]s out. [`IoTransport`] adapts any `futures-io` socket, which allows `h1cycle`
//! to be used in any asynchronous executor/reactor environment that provides TCP sockets.
//!
//! # Example
//! ```no_run
//! # use h1cycle::{Client, Direct, EventKind, IoTransport, RequestOptions};
//! # use futures_core::Stream as _;
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!		.enable_io()
//!		.build()
//!		.unwrap();
//! runtime.block_on(async {
//!		use async_compat::CompatExt as _;
//!
//!		// Connect to the server.
//!		let socket = tokio::net::TcpStream::connect("example.com:80").await.unwrap();
//!		let mut socket = Some(IoTransport::new(socket.compat()));
//!
//!		// An agent that hands out the one connection.
//!		let agent = Direct::new(move |_: &RequestOptions| {
//!			socket
//!				.take()
//!				.ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotConnected))
//!		});
//!		let mut client = Client::new(agent);
//!
//!		// Issue the request.
//!		let options = RequestOptions {
//!			host: "example.com".to_owned(),
//!			..RequestOptions::new("GET", "/")
//!		};
//!		let id = client.request(options).unwrap();
//!		client.end(id, None).unwrap();
//!
//!		// Drive the cycle until the request closes.
//!		let mut body = vec![];
//!		loop {
//!			let event = std::future::poll_fn(|cx| {
//!				std::pin::Pin::new(&mut client).poll_next(cx)
//!			})
//!			.await;
//!			match event.map(|e| e.kind) {
//!				Some(EventKind::Response { head }) => assert_eq!(head.status, 200),
//!				Some(EventKind::ResponseData { data }) => body.extend_from_slice(&data),
//!				Some(EventKind::Close) | None => break,
//!				Some(_) => (),
//!			}
//!		}
//! })
//! ```

pub mod config;
pub mod error;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod transport;

mod client;
mod event;
mod util;

use std::fmt::{Display, Formatter};

pub use client::{Client, State};
pub use config::ClientConfig;
pub use error::Error;
pub use event::{Event, EventKind, Interest};
pub use headers::HeaderMap;
pub use request::{HeaderBlock, RequestOptions};
pub use response::ResponseHead;
pub use transport::{Agent, Direct, IoTransport, Socket, SocketEvent, Transport};

/// Identifies one request issued through a [`Client`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RequestId(u64);

impl RequestId {
	/// Returns the numeric value of the identifier.
	#[must_use]
	pub fn get(self) -> u64 {
		self.0
	}
}

impl Display for RequestId {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		write!(f, "req#{}", self.0)
	}
}

/// Identifies one connection.
///
/// Identifiers are chosen by the [`Agent`] and must be unique among connections it has handed
/// out and not yet seen removed or freed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SocketId(pub u64);

impl Display for SocketId {
	fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
		write!(f, "sock#{}", self.0)
	}
}
