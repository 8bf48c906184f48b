use super::*;
use crate::error::{ErrorKind, InvalidData};
use crate::request::HeaderBlock;
use crate::transport::Direct;
use bytes::Bytes;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// What a mock connection has been asked to do.
#[derive(Debug, Default)]
struct Wire {
	written: Vec<u8>,
	ended: bool,
	destroyed: bool,
	closing: bool,
	timeout: Option<Duration>,
	no_delay: Option<bool>,
	keep_alive: Option<(bool, Duration)>,
	/// Writes report backpressure once this many bytes have been written.
	limit: Option<usize>,
	/// Events handed out by `poll_event`.
	incoming: VecDeque<SocketEvent>,
}

/// A connection whose state stays visible to the test after the client takes it.
#[derive(Clone, Debug, Default)]
struct Mock(Rc<RefCell<Wire>>);

impl Mock {
	fn written(&self) -> String {
		String::from_utf8(self.0.borrow().written.clone()).unwrap()
	}
}

impl Transport for Mock {
	fn write(&mut self, data: &[u8]) -> bool {
		let mut wire = self.0.borrow_mut();
		wire.written.extend_from_slice(data);
		wire.limit.map_or(true, |limit| wire.written.len() < limit)
	}

	fn end(&mut self) {
		self.0.borrow_mut().ended = true;
	}

	fn destroy(&mut self, _: Option<&Error>) {
		self.0.borrow_mut().destroyed = true;
	}

	fn destroy_soon(&mut self) -> bool {
		let mut wire = self.0.borrow_mut();
		wire.ended = true;
		wire.closing = true;
		true
	}

	fn set_timeout(&mut self, timeout: Option<Duration>) {
		self.0.borrow_mut().timeout = timeout;
	}

	fn set_no_delay(&mut self, no_delay: bool) {
		self.0.borrow_mut().no_delay = Some(no_delay);
	}

	fn set_keep_alive(&mut self, enable: bool, initial_delay: Duration) {
		self.0.borrow_mut().keep_alive = Some((enable, initial_delay));
	}

	fn is_writable(&self) -> bool {
		let wire = self.0.borrow();
		!wire.destroyed && !wire.ended
	}

	fn poll_event(&mut self, _: &mut Context<'_>) -> Poll<SocketEvent> {
		match self.0.borrow_mut().incoming.pop_front() {
			Some(event) => Poll::Ready(event),
			None => Poll::Pending,
		}
	}
}

/// An agent that keeps every connection it opens and can pool them.
#[derive(Debug, Default)]
struct Pool {
	keep_alive: bool,
	timeout: Option<Duration>,
	/// Answer `Ok(None)` and leave the connection to a later `assign_socket`.
	defer: bool,
	refuse: bool,
	/// Events queued on each new connection.
	script: Vec<SocketEvent>,
	opened: Vec<Mock>,
	idle: Vec<Socket<Mock>>,
	requested: Vec<RequestId>,
	freed: Vec<SocketId>,
	removed: Vec<SocketId>,
}

impl Pool {
	fn pooling() -> Self {
		Self {
			keep_alive: true,
			..Self::default()
		}
	}

	fn wire(&self, index: usize) -> Mock {
		self.opened[index].clone()
	}
}

impl Agent<Mock> for Pool {
	fn add_request(
		&mut self,
		request: RequestId,
		_: &RequestOptions,
	) -> std::io::Result<Option<Socket<Mock>>> {
		self.requested.push(request);
		if self.refuse {
			return Err(std::io::ErrorKind::ConnectionRefused.into());
		}
		if self.defer {
			return Ok(None);
		}
		if let Some(socket) = self.idle.pop() {
			return Ok(Some(socket));
		}
		let mock = Mock::default();
		mock.0.borrow_mut().incoming.extend(self.script.drain(..));
		let id = SocketId(self.opened.len() as u64);
		self.opened.push(mock.clone());
		Ok(Some(Socket::new(id, mock)))
	}

	fn free_socket(&mut self, socket: Socket<Mock>) {
		self.freed.push(socket.id);
		self.idle.push(socket);
	}

	fn remove_socket(&mut self, socket: SocketId) {
		self.removed.push(socket);
	}

	fn keep_alive(&self) -> bool {
		self.keep_alive
	}

	fn timeout(&self) -> Option<Duration> {
		self.timeout
	}
}

type TestClient = Client<Mock, Pool>;

/// Takes every notification, running deferred work whenever none is waiting.
fn pump(client: &mut TestClient) -> Vec<EventKind<Mock>> {
	let mut out = Vec::new();
	loop {
		while let Some(event) = client.poll_event() {
			out.push(event.kind);
		}
		if client.pending_tasks() == 0 {
			return out;
		}
		client.run_deferred();
	}
}

fn name<S>(kind: &EventKind<S>) -> &'static str {
	match kind {
		EventKind::Socket { .. } => "socket",
		EventKind::Response { .. } => "response",
		EventKind::ResponseData { .. } => "data",
		EventKind::ResponseEnd => "end",
		EventKind::ResponseAborted => "aborted",
		EventKind::Information { .. } => "information",
		EventKind::Continue => "continue",
		EventKind::Upgrade { .. } => "upgrade",
		EventKind::Connect { .. } => "connect",
		EventKind::Timeout => "timeout",
		EventKind::Error { .. } => "error",
		EventKind::Abort => "abort",
		EventKind::Close => "close",
		EventKind::Drain => "drain",
	}
}

fn names<S>(kinds: &[EventKind<S>]) -> Vec<&'static str> {
	kinds.iter().map(name).collect()
}

fn errors(kinds: &[EventKind<Mock>]) -> Vec<&Error> {
	kinds
		.iter()
		.filter_map(|k| match k {
			EventKind::Error { error } => Some(error),
			_ => None,
		})
		.collect()
}

fn body(kinds: &[EventKind<Mock>]) -> Vec<u8> {
	kinds
		.iter()
		.filter_map(|k| match k {
			EventKind::ResponseData { data } => Some(&data[..]),
			_ => None,
		})
		.flatten()
		.copied()
		.collect()
}

/// Issues a request, ends it, and binds it to a connection.
fn started(client: &mut TestClient, options: RequestOptions) -> (RequestId, SocketId) {
	let id = client.request(options).unwrap();
	client.end(id, None).unwrap();
	let events = pump(client);
	assert_eq!(names(&events), ["socket"]);
	let socket = client.socket_of(id).unwrap();
	(id, socket)
}

fn data(client: &mut TestClient, socket: SocketId, bytes: &'static [u8]) {
	client.socket_data(socket, Bytes::from_static(bytes));
}

fn assert_parsers_balanced(client: &TestClient) {
	let stats = client.parser_stats();
	assert_eq!(stats.acquired, stats.finished);
	assert_eq!(stats.acquired, stats.released);
}

/// Tests a simple GET on a connection that is not reused.
#[test]
fn test_get() {
	let mut client = Client::new(Pool::default());
	let (id, socket) = started(&mut client, RequestOptions::default());
	assert_eq!(client.state(id), Some(State::ResponseHeaderWait));
	assert_eq!(client.bound_request(socket), Some(id));
	let wire = client.agent().wire(0);
	assert_eq!(
		wire.written(),
		"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
	);

	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi");
	let events = pump(&mut client);
	assert_eq!(names(&events), ["response", "data", "end"]);
	match &events[0] {
		EventKind::Response { head } => assert_eq!(head.status, 200),
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(body(&events), b"hi");
	assert_eq!(client.state(id), Some(State::Done));
	assert!(wire.0.borrow().closing);
	assert!(client.agent().freed.is_empty());

	client.socket_close(socket);
	assert_eq!(names(&pump(&mut client)), ["close"]);
	assert_eq!(client.state(id), None);
	assert_eq!(client.agent().removed, [socket]);
	client.socket_close(socket);
	assert!(pump(&mut client).is_empty());
	assert_parsers_balanced(&client);
	assert_eq!(client.parser_stats().acquired, 1);
}

/// Tests that a kept-alive connection goes back to the agent once, after the close, and is then
/// reused by the next request.
#[test]
fn test_keep_alive_reuse() {
	let mut client = Client::new(Pool::pooling());
	let (first, socket) = started(&mut client, RequestOptions::default());
	assert_eq!(client.should_keep_alive(first), Some(true));
	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\na");

	let mut seen = Vec::new();
	while let Some(event) = client.poll_event() {
		seen.push(event.kind);
	}
	assert_eq!(names(&seen), ["response", "data", "end"]);
	assert!(client.agent().freed.is_empty());
	assert_eq!(client.bound_request(socket), None);

	assert_eq!(names(&pump(&mut client)), ["close"]);
	assert_eq!(client.agent().freed, [socket]);
	assert!(client.agent().removed.is_empty());

	let (second, reused) = started(&mut client, RequestOptions::default());
	assert_eq!(reused, socket);
	assert_eq!(client.bound_request(socket), Some(second));
	assert_eq!(client.agent().opened.len(), 1);
	data(&mut client, socket, b"HTTP/1.1 204 No Content\r\n\r\n");
	assert_eq!(names(&pump(&mut client)), ["response", "end", "close"]);
	assert_eq!(client.agent().freed, [socket, socket]);
	assert_parsers_balanced(&client);
	assert_eq!(client.parser_stats().idle, 1);
}

/// Tests that the connection is not freed until the request has been sent in full, even if the
/// response ends first.
#[test]
fn test_free_waits_for_request() {
	let mut client = Client::new(Pool::pooling());
	let id = client.request(RequestOptions::new("POST", "/upload")).unwrap();
	assert!(client.write(id, b"part").unwrap());
	assert_eq!(names(&pump(&mut client)), ["socket"]);
	let socket = client.socket_of(id).unwrap();
	assert_eq!(client.state(id), Some(State::Active));

	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
	assert_eq!(names(&pump(&mut client)), ["response", "end"]);
	assert!(client.agent().freed.is_empty());
	assert_eq!(client.bound_request(socket), Some(id));

	client.end(id, None).unwrap();
	assert_eq!(names(&pump(&mut client)), ["close"]);
	assert_eq!(client.agent().freed, [socket]);
	assert_eq!(
		client.agent().wire(0).written(),
		"POST /upload HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive\r\n\
		Transfer-Encoding: chunked\r\n\r\n4\r\npart\r\n0\r\n\r\n"
	);
}

/// Tests that a connection cannot carry two requests at once.
#[test]
fn test_exclusive_binding() {
	let mut client = Client::new(Pool {
		defer: true,
		..Pool::pooling()
	});
	let first = client.request(RequestOptions::default()).unwrap();
	let second = client.request(RequestOptions::default()).unwrap();
	assert!(pump(&mut client).is_empty());
	assert_eq!(client.state(first), Some(State::AwaitingSocket));

	let shared = Mock::default();
	client
		.assign_socket(first, Socket::new(SocketId(7), shared.clone()))
		.unwrap();
	assert_eq!(names(&pump(&mut client)), ["socket"]);

	let intruder = Mock::default();
	match client.assign_socket(second, Socket::new(SocketId(7), intruder.clone())) {
		Err(Error::Usage(Usage::SocketInUse)) => (),
		other => panic!("unexpected {:?}", other),
	}
	assert!(intruder.0.borrow().destroyed);
	assert!(!shared.0.borrow().destroyed);
	assert_eq!(client.bound_request(SocketId(7)), Some(first));
	assert_eq!(client.state(second), Some(State::AwaitingSocket));

	match client.assign_socket(RequestId(99), Socket::new(SocketId(8), Mock::default())) {
		Err(Error::Usage(Usage::UnknownRequest(id))) => assert_eq!(id, RequestId(99)),
		other => panic!("unexpected {:?}", other),
	}
}

/// Tests that informational responses are absorbed before the final one.
#[test]
fn test_informational() {
	let mut client = Client::new(Pool::default());
	let (id, socket) = started(&mut client, RequestOptions::default());
	data(
		&mut client,
		socket,
		b"HTTP/1.1 102 Processing\r\n\r\nHTTP/1.1 103 Early Hints\r\nLink: </a.css>\r\n\r\n",
	);
	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
	let events = pump(&mut client);
	assert_eq!(names(&events), ["information", "information", "response", "end"]);
	match &events[1] {
		EventKind::Information { head } => {
			assert_eq!(head.status, 103);
			assert_eq!(head.headers.get("link"), Some(&b"</a.css>"[..]));
		}
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(client.state(id), Some(State::Done));
}

/// Tests that 100 Continue gets its own notification.
#[test]
fn test_continue() {
	let mut client = Client::new(Pool::default());
	let mut options = RequestOptions::new("PUT", "/file");
	if let HeaderBlock::Fields(map) = &mut options.headers {
		map.insert("Expect", "100-continue");
		map.insert("Content-Length", "3");
	}
	let id = client.request(options).unwrap();
	assert_eq!(client.state(id), Some(State::HeadersQueued));
	assert_eq!(names(&pump(&mut client)), ["socket"]);
	let socket = client.socket_of(id).unwrap();
	assert!(client
		.agent()
		.wire(0)
		.written()
		.starts_with("PUT /file HTTP/1.1\r\n"));

	data(&mut client, socket, b"HTTP/1.1 100 Continue\r\n\r\n");
	assert_eq!(names(&pump(&mut client)), ["continue", "information"]);
	client.end(id, Some(b"abc")).unwrap();
	assert!(client.agent().wire(0).written().ends_with("\r\n\r\nabc"));
	assert_eq!(client.state(id), Some(State::ResponseHeaderWait));
}

/// Tests that a HEAD response delivers no body whatever its length says.
#[test]
fn test_head_skips_body() {
	let mut client = Client::new(Pool::pooling());
	let (_, socket) = started(&mut client, RequestOptions::new("HEAD", "/"));
	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: 500\r\n\r\n");
	let events = pump(&mut client);
	assert_eq!(names(&events), ["response", "end", "close"]);
	assert!(body(&events).is_empty());
	assert_eq!(client.agent().freed, [socket]);
}

/// Tests that a server refusing keep-alive gets its connection closed instead of pooled.
#[test]
fn test_keep_alive_refused() {
	let mut client = Client::new(Pool::pooling());
	let (id, socket) = started(&mut client, RequestOptions::default());
	assert_eq!(client.should_keep_alive(id), Some(true));
	data(
		&mut client,
		socket,
		b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
	);
	assert_eq!(names(&pump(&mut client)), ["response", "end"]);
	assert_eq!(client.should_keep_alive(id), Some(false));
	assert!(client.agent().wire(0).0.borrow().closing);
	client.handle_socket_event(socket, SocketEvent::Close);
	assert_eq!(names(&pump(&mut client)), ["close"]);
	assert!(client.agent().freed.is_empty());
	assert_eq!(client.agent().removed, [socket]);
}

/// Tests that a successful CONNECT hands the connection to the application.
#[test]
fn test_connect() {
	let mut client = Client::new(Pool::pooling());
	let id = client
		.request(RequestOptions::new("CONNECT", "proxy:443"))
		.unwrap();
	client.listen(id, Interest::Connect).unwrap();
	client.end(id, None).unwrap();
	assert_eq!(names(&pump(&mut client)), ["socket"]);
	let socket = client.socket_of(id).unwrap();

	data(&mut client, socket, b"HTTP/1.1 200 Connection Established\r\n\r\n");
	let mut events = pump(&mut client);
	assert_eq!(names(&events), ["connect", "close"]);
	match events.remove(0) {
		EventKind::Connect {
			head,
			socket: taken,
			body_head,
		} => {
			assert_eq!(head.status, 200);
			assert_eq!(taken.id, socket);
			assert!(body_head.is_empty());
			assert!(!taken.transport.0.borrow().destroyed);
		}
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(client.bound_request(socket), None);
	assert_eq!(client.agent().removed, [socket]);
	assert!(client.agent().freed.is_empty());
	assert_parsers_balanced(&client);
}

/// Tests that bytes after a 101 response are handed over with the connection.
#[test]
fn test_upgrade_body_head() {
	let mut client = Client::new(Pool::default());
	let mut options = RequestOptions::default();
	if let HeaderBlock::Fields(map) = &mut options.headers {
		map.insert("Connection", "Upgrade");
		map.insert("Upgrade", "websocket");
	}
	let id = client.request(options).unwrap();
	client.listen(id, Interest::Upgrade).unwrap();
	client.end(id, None).unwrap();
	let _ = pump(&mut client);
	let socket = client.socket_of(id).unwrap();

	data(
		&mut client,
		socket,
		b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n\x81\x00",
	);
	let events = pump(&mut client);
	assert_eq!(names(&events), ["upgrade", "close"]);
	match &events[0] {
		EventKind::Upgrade { body_head, .. } => assert_eq!(&body_head[..], b"\x81\x00"),
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(client.state(id), None);
}

/// Tests that a protocol switch nobody takes destroys the connection quietly.
#[test]
fn test_upgrade_unclaimed() {
	let mut client = Client::new(Pool::default());
	let (_, socket) = started(&mut client, RequestOptions::default());
	data(&mut client, socket, b"HTTP/1.1 101 Switching Protocols\r\n\r\n");
	assert_eq!(names(&pump(&mut client)), ["close"]);
	assert!(client.agent().wire(0).0.borrow().destroyed);
	assert_parsers_balanced(&client);
}

/// Tests that aborting a request that is waiting for a connection destroys the connection when it
/// arrives.
#[test]
fn test_abort_while_awaiting_socket() {
	let mut client = Client::new(Pool {
		defer: true,
		..Pool::default()
	});
	let id = client.request(RequestOptions::default()).unwrap();
	assert!(pump(&mut client).is_empty());
	assert_eq!(client.state(id), Some(State::AwaitingSocket));

	client.abort(id);
	client.abort(id);
	assert_eq!(names(&pump(&mut client)), ["abort", "close"]);

	let late = Mock::default();
	client
		.assign_socket(id, Socket::new(SocketId(1), late.clone()))
		.unwrap();
	assert!(pump(&mut client).is_empty());
	assert!(late.0.borrow().destroyed);
	assert!(late.0.borrow().written.is_empty());
	assert_eq!(client.bound_request(SocketId(1)), None);
	assert_eq!(client.agent().removed, [SocketId(1)]);
	assert_eq!(client.parser_stats().acquired, 0);
}

/// Tests that aborting before deferred work runs never asks the agent for a connection.
#[test]
fn test_abort_before_dispatch() {
	let mut client = Client::new(Pool::default());
	let id = client.request(RequestOptions::default()).unwrap();
	client.abort(id);
	assert_eq!(names(&pump(&mut client)), ["abort", "close"]);
	assert!(client.agent().requested.is_empty());
}

/// Tests aborting mid-response.
#[test]
fn test_abort_mid_response() {
	let mut client = Client::new(Pool::default());
	let (id, socket) = started(&mut client, RequestOptions::default());
	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc");
	assert_eq!(names(&pump(&mut client)), ["response", "data"]);
	client.abort(id);
	assert_eq!(client.state(id), Some(State::Aborted));
	data(&mut client, socket, b"defg");
	let events = pump(&mut client);
	assert_eq!(names(&events), ["abort", "aborted", "end", "close"]);
	assert!(errors(&events).is_empty());
	assert!(client.agent().wire(0).0.borrow().destroyed);
	assert_parsers_balanced(&client);
}

/// Tests a connection closing while the response body is still arriving.
#[test]
fn test_close_mid_response() {
	let mut client = Client::new(Pool::default());
	let (_, socket) = started(&mut client, RequestOptions::default());
	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc");
	client.socket_close(socket);
	let events = pump(&mut client);
	assert_eq!(
		names(&events),
		["response", "data", "aborted", "end", "error", "close"]
	);
	match errors(&events)[..] {
		[Error::ConnectionReset(Reset::Aborted)] => (),
		ref other => panic!("unexpected {:?}", other),
	}
	assert_parsers_balanced(&client);
}

/// Tests that a server hanging up without answering is reported once.
#[test]
fn test_hang_up() {
	let mut client = Client::new(Pool::default());
	let (id, socket) = started(&mut client, RequestOptions::default());
	client.socket_end(socket);
	assert_eq!(client.state(id), Some(State::Errored));
	client.socket_close(socket);
	let events = pump(&mut client);
	assert_eq!(names(&events), ["error", "close"]);
	assert_eq!(errors(&events)[0].kind(), ErrorKind::ConnectionReset);
	assert!(client.agent().wire(0).0.borrow().destroyed);
	assert_parsers_balanced(&client);
}

/// Tests that an error followed by a close is reported once.
#[test]
fn test_error_then_close() {
	let mut client = Client::new(Pool::default());
	let (id, socket) = started(&mut client, RequestOptions::default());
	client.socket_error(socket, std::io::ErrorKind::ConnectionReset.into());
	client.socket_error(socket, std::io::ErrorKind::BrokenPipe.into());
	assert_eq!(client.state(id), Some(State::Errored));
	client.socket_end(socket);
	client.socket_close(socket);
	let events = pump(&mut client);
	assert_eq!(names(&events), ["error", "close"]);
	match errors(&events)[..] {
		[Error::Transport(e)] => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
		ref other => panic!("unexpected {:?}", other),
	}
	assert_parsers_balanced(&client);
}

/// Tests that a malformed response fails the request with the offending bytes attached.
#[test]
fn test_parse_error() {
	let mut client = Client::new(Pool::default());
	let (id, socket) = started(&mut client, RequestOptions::default());
	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nx");
	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: nope\r\n\r\n");
	let first = pump(&mut client);
	assert_eq!(names(&first), ["response", "data", "end"]);
	assert_eq!(client.state(id), Some(State::Done));

	let mut client = Client::new(Pool::default());
	let (id, socket) = started(&mut client, RequestOptions::default());
	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: nope\r\n\r\n");
	assert_eq!(client.state(id), Some(State::Errored));
	let events = pump(&mut client);
	assert_eq!(names(&events), ["error", "close"]);
	match errors(&events)[..] {
		[Error::Parse(e)] => {
			assert!(matches!(e.kind, InvalidData::BadContentLength(_)));
			assert_eq!(e.bytes_parsed, 0);
			assert_eq!(
				&e.raw_packet[..],
				&b"HTTP/1.1 200 OK\r\nContent-Length: nope\r\n\r\n"[..]
			);
		}
		ref other => panic!("unexpected {:?}", other),
	}
	assert!(client.agent().wire(0).0.borrow().destroyed);
	assert_parsers_balanced(&client);
}

/// Tests that a second response in the same packet is rejected.
#[test]
fn test_unsolicited_response() {
	let mut client = Client::new(Pool::default());
	let (_, socket) = started(&mut client, RequestOptions::default());
	data(
		&mut client,
		socket,
		b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\nHTTP/1.1 200 OK\r\n\r\n",
	);
	let events = pump(&mut client);
	assert_eq!(names(&events), ["response", "end", "error", "close"]);
	match errors(&events)[..] {
		[Error::Parse(e)] => {
			assert_eq!(e.kind, InvalidData::UnsolicitedResponse);
			assert_eq!(e.bytes_parsed, 38);
		}
		ref other => panic!("unexpected {:?}", other),
	}
	assert_parsers_balanced(&client);
}

/// Tests a body that runs until the server closes.
#[test]
fn test_body_until_end() {
	let mut client = Client::new(Pool::pooling());
	let (id, socket) = started(&mut client, RequestOptions::default());
	data(&mut client, socket, b"HTTP/1.1 200 OK\r\n\r\nsome ");
	data(&mut client, socket, b"bytes");
	client.socket_end(socket);
	assert_eq!(client.state(id), Some(State::Done));
	let events = pump(&mut client);
	assert_eq!(names(&events), ["response", "data", "data", "end", "close"]);
	assert_eq!(body(&events), b"some bytes");
	assert!(client.agent().freed.is_empty());
	assert_parsers_balanced(&client);
}

/// Tests that destroying with a reason reports it once.
#[test]
fn test_destroy_with_error() {
	let mut client = Client::new(Pool::default());
	let (id, socket) = started(&mut client, RequestOptions::default());
	client.destroy(id, Some(Error::Custom("enough".to_owned())));
	client.destroy(id, Some(Error::Custom("again".to_owned())));
	assert_eq!(client.state(id), Some(State::Errored));
	match client.write(id, b"x") {
		Err(Error::Usage(Usage::Destroyed)) => (),
		other => panic!("unexpected {:?}", other),
	}
	client.socket_close(socket);
	let events = pump(&mut client);
	assert_eq!(names(&events), ["error", "close"]);
	assert_eq!(errors(&events)[0].to_string(), "enough");
}

/// Tests that destroying a request without a connection reports a hang-up.
#[test]
fn test_destroy_unbound() {
	let mut client = Client::new(Pool {
		defer: true,
		..Pool::default()
	});
	let id = client.request(RequestOptions::default()).unwrap();
	client.destroy(id, None);
	let events = pump(&mut client);
	assert_eq!(names(&events), ["error", "close"]);
	assert!(matches!(
		errors(&events)[..],
		[Error::ConnectionReset(Reset::HangUp)]
	));
}

/// Tests that a refused connection fails the request.
#[test]
fn test_connection_refused() {
	let mut client = Client::new(Pool {
		refuse: true,
		..Pool::default()
	});
	let id = client.request(RequestOptions::default()).unwrap();
	let events = pump(&mut client);
	assert_eq!(names(&events), ["error", "close"]);
	assert_eq!(errors(&events)[0].kind(), ErrorKind::Transport);
	assert_eq!(client.state(id), None);

	let mut client = Client::new(Pool {
		defer: true,
		..Pool::default()
	});
	let id = client.request(RequestOptions::default()).unwrap();
	let _ = pump(&mut client);
	client
		.connect_failed(id, std::io::ErrorKind::TimedOut.into())
		.unwrap();
	assert_eq!(names(&pump(&mut client)), ["error", "close"]);
}

/// Tests that the timeout follows the request onto its connection and is removed at the end.
#[test]
fn test_timeout() {
	let mut client = Client::new(Pool {
		timeout: Some(Duration::from_secs(30)),
		..Pool::pooling()
	});
	let options = RequestOptions {
		timeout: Some(Duration::from_secs(5)),
		..RequestOptions::default()
	};
	let (id, socket) = started(&mut client, options);
	let wire = client.agent().wire(0);
	assert_eq!(wire.0.borrow().timeout, Some(Duration::from_secs(5)));

	client.socket_timeout(socket);
	assert_eq!(names(&pump(&mut client)), ["timeout"]);

	client.set_timeout(id, Duration::from_secs(0)).unwrap();
	assert_eq!(wire.0.borrow().timeout, None);
	client.socket_timeout(socket);
	assert!(pump(&mut client).is_empty());

	client.set_timeout(id, Duration::from_secs(9)).unwrap();
	assert_eq!(wire.0.borrow().timeout, Some(Duration::from_secs(9)));
	data(&mut client, socket, b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
	let _ = pump(&mut client);
	assert_eq!(wire.0.borrow().timeout, None);

	// The agent's timeout applies when the request has none.
	let (_, _) = started(&mut client, RequestOptions::default());
	assert_eq!(wire.0.borrow().timeout, Some(Duration::from_secs(30)));
}

/// Tests that connection options set before binding are applied at binding.
#[test]
fn test_socket_options() {
	let mut client = Client::new(Pool::default());
	let id = client.request(RequestOptions::default()).unwrap();
	client.set_no_delay(id, true).unwrap();
	client
		.set_socket_keep_alive(id, true, Duration::from_secs(1))
		.unwrap();
	client.end(id, None).unwrap();
	let _ = pump(&mut client);
	let wire = client.agent().wire(0);
	assert_eq!(wire.0.borrow().no_delay, Some(true));
	assert_eq!(
		wire.0.borrow().keep_alive,
		Some((true, Duration::from_secs(1)))
	);
	client.set_no_delay(id, false).unwrap();
	assert_eq!(wire.0.borrow().no_delay, Some(false));
}

/// Tests that backpressure from the connection is reported and relieved.
#[test]
fn test_drain() {
	let mut client = Client::new(Pool::default());
	let id = client.request(RequestOptions::new("POST", "/")).unwrap();
	client.flush_headers(id).unwrap();
	assert_eq!(client.state(id), Some(State::HeadersQueued));
	let _ = pump(&mut client);
	let socket = client.socket_of(id).unwrap();
	client.agent().wire(0).0.borrow_mut().limit = Some(1);

	assert!(!client.write(id, b"abc").unwrap());
	client.socket_drain(socket);
	assert_eq!(names(&pump(&mut client)), ["drain"]);
	client.socket_drain(socket);
	assert!(pump(&mut client).is_empty());
}

/// Tests that writes are buffered until a connection is bound.
#[test]
fn test_buffered_until_bound() {
	let mut client = Client::new(Pool {
		defer: true,
		..Pool::default()
	});
	let id = client.request(RequestOptions::new("POST", "/")).unwrap();
	client.set_header(id, "X-Early", "yes").unwrap();
	assert!(client.write(id, b"hello").unwrap());
	client.end(id, None).unwrap();
	let _ = pump(&mut client);
	assert_eq!(client.agent().requested, [id]);

	let wire = Mock::default();
	client
		.assign_socket(id, Socket::new(SocketId(0), wire.clone()))
		.unwrap();
	let _ = pump(&mut client);
	assert_eq!(
		wire.written(),
		"POST / HTTP/1.1\r\nHost: localhost\r\nX-Early: yes\r\nConnection: close\r\n\
		Transfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n"
	);
	assert_eq!(client.state(id), Some(State::ResponseHeaderWait));
}

/// Tests that a write held back before the connection arrived gets its drain once the connection
/// takes every byte.
#[test]
fn test_drain_after_bind() {
	let config = ClientConfig {
		high_water_mark: 8,
		..ClientConfig::default()
	};
	let pool = Pool {
		defer: true,
		..Pool::default()
	};
	let mut client = Client::with_config(pool, config);
	let id = client.request(RequestOptions::new("POST", "/")).unwrap();
	assert!(!client.write(id, b"0123456789abcdef").unwrap());
	assert!(pump(&mut client).is_empty());
	assert_eq!(client.state(id), Some(State::AwaitingSocket));

	let wire = Mock::default();
	client
		.assign_socket(id, Socket::new(SocketId(0), wire.clone()))
		.unwrap();
	assert_eq!(names(&pump(&mut client)), ["socket", "drain"]);
	assert!(wire.written().ends_with("\r\n\r\n10\r\n0123456789abcdef\r\n"));

	assert!(client.write(id, b"x").unwrap());
	client.end(id, None).unwrap();
	assert!(pump(&mut client).is_empty());
}

/// A connection that implements only the required transport methods.
#[derive(Clone, Debug, Default)]
struct Plain(Rc<RefCell<(bool, bool)>>);

impl Transport for Plain {
	fn write(&mut self, _: &[u8]) -> bool {
		true
	}

	fn end(&mut self) {
		self.0.borrow_mut().0 = true;
	}

	fn destroy(&mut self, _: Option<&Error>) {
		self.0.borrow_mut().1 = true;
	}

	fn set_timeout(&mut self, _: Option<Duration>) {}

	fn is_writable(&self) -> bool {
		let (ended, destroyed) = *self.0.borrow();
		!ended && !destroyed
	}
}

/// Tests that a request still closes when its connection shuts down through the default graceful
/// close, which never reports a close of its own.
#[test]
fn test_close_with_default_destroy_soon() {
	let plain = Plain::default();
	let shared = plain.clone();
	let mut client = Client::new(Direct::new(
		move |_: &RequestOptions| -> std::io::Result<Plain> { Ok(shared.clone()) },
	));
	let id = client.request(RequestOptions::default()).unwrap();
	client.end(id, None).unwrap();
	client.run_deferred();
	let socket = client.socket_of(id).unwrap();

	let head = b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";
	client.socket_data(socket, Bytes::from_static(head));
	client.run_deferred();
	let mut events = Vec::new();
	while let Some(event) = client.poll_event() {
		events.push(event.kind);
	}
	assert_eq!(names(&events), ["socket", "response", "end", "close"]);
	assert_eq!(*plain.0.borrow(), (true, true));
	assert_eq!(client.state(id), None);
	assert_eq!(client.bound_request(socket), None);
	assert_eq!(client.pending_tasks(), 0);
	let stats = client.parser_stats();
	assert_eq!(stats.acquired, stats.released);
}

/// Tests that the agent is asked for a connection only after the caller’s synchronous setup.
#[test]
fn test_dispatch_deferred() {
	let mut client = Client::new(Pool::default());
	let id = client.request(RequestOptions::default()).unwrap();
	assert_eq!(client.state(id), Some(State::Idle));
	assert!(client.agent().requested.is_empty());
	client.set_header(id, "Accept", "*/*").unwrap();
	assert_eq!(client.get_header(id, "accept").unwrap(), Some(&b"*/*"[..]));
	assert!(client.has_header(id, "host").unwrap());
	assert!(client.remove_header(id, "accept").unwrap());
	client.run_deferred();
	assert_eq!(client.agent().requested, [id]);
}

/// Tests synchronous usage errors.
#[test]
fn test_usage_errors() {
	let mut client = Client::new(Pool::default());
	match client.request(RequestOptions::new("GE T", "/")) {
		Err(Error::Usage(Usage::InvalidMethod(_))) => (),
		other => panic!("unexpected {:?}", other),
	}
	match client.request(RequestOptions::new("GET", "/a b")) {
		Err(Error::Usage(Usage::InvalidPath)) => (),
		other => panic!("unexpected {:?}", other),
	}
	let options = RequestOptions {
		protocol: "https:".to_owned(),
		..RequestOptions::default()
	};
	match client.request(options) {
		Err(Error::Usage(Usage::ProtocolMismatch { .. })) => (),
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(client.pending_tasks(), 0);

	let id = client.request(RequestOptions::default()).unwrap();
	match client.set_header(id, "X-Bad", "a\nb") {
		Err(Error::Usage(Usage::InvalidHeaderValue(_))) => (),
		other => panic!("unexpected {:?}", other),
	}
	client.end(id, None).unwrap();
	match client.set_header(id, "X-Late", "1") {
		Err(Error::Usage(Usage::HeadersSent)) => (),
		other => panic!("unexpected {:?}", other),
	}
	match client.write(id, b"more") {
		Err(Error::Usage(Usage::WriteAfterEnd)) => (),
		other => panic!("unexpected {:?}", other),
	}
	match client.write(RequestId(42), b"x") {
		Err(Error::Usage(Usage::UnknownRequest(_))) => (),
		other => panic!("unexpected {:?}", other),
	}
	client.abort(RequestId(42));
	client.destroy(RequestId(42), None);
}

/// Tests that the stream drives a cycle from scripted connection events to the end.
#[test]
fn test_stream() {
	let mut client = Client::new(Pool {
		script: vec![
			SocketEvent::Data(Bytes::from_static(
				b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nyes",
			)),
			SocketEvent::Close,
		],
		..Pool::default()
	});
	let id = client.request(RequestOptions::default()).unwrap();
	client.end(id, None).unwrap();

	let mut seen = Vec::new();
	futures_executor::block_on(async {
		while let Some(event) =
			std::future::poll_fn(|cx| Pin::new(&mut client).poll_next(cx)).await
		{
			assert_eq!(event.request, id);
			seen.push(event.kind);
		}
	});
	assert_eq!(names(&seen), ["socket", "response", "data", "end", "close"]);
	assert_eq!(body(&seen), b"yes");
	assert_parsers_balanced(&client);
}
