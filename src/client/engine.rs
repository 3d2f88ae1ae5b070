//! The client reliability engine (§4.6): send, timeout, bounded retry,
//! reply demultiplexing, and the separate bounded monitor receive loop.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::error::ClientError;
use crate::server::dispatcher::MAX_DATAGRAM_SIZE;
use crate::wire::message::{MonitorUpdate, OpCode, Reply, Request, RequestPayload, ServerMessage};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// One call site's view of the protocol: `IDLE -> SENT -> (reply -> DONE) |
/// (timeout -> (attempts<max ? SENT : FAILED))` (§4.6).
pub struct ClientEngine {
  socket: UdpSocket,
  timeout: Duration,
  max_attempts: u32,
  next_request_id: u32,
}

impl ClientEngine {
  /// Bind an ephemeral local port and connect it to `server`, so `send`/
  /// `recv` need not repeat the peer address on every call.
  pub fn connect(server: SocketAddr) -> io::Result<Self> {
    let bind_addr: SocketAddr = if server.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" }.parse().unwrap();
    let socket = UdpSocket::bind(bind_addr)?;
    socket.connect(server)?;
    Ok(Self {
      socket,
      timeout: DEFAULT_TIMEOUT,
      max_attempts: DEFAULT_MAX_ATTEMPTS,
      next_request_id: 0,
    })
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
    self.max_attempts = max_attempts;
    self
  }

  /// A fresh request-id. Monotonic within the process; wraparound is
  /// tolerated, reuse within the history TTL window is the caller's
  /// responsibility to avoid (§4.6 step 1).
  fn fresh_request_id(&mut self) -> u32 {
    let id = self.next_request_id;
    self.next_request_id = self.next_request_id.wrapping_add(1);
    id
  }

  /// Send `payload` and wait for its reply, retransmitting with the *same*
  /// request-id on timeout (at-most-once relies on this to hit the server's
  /// cache) until `max_attempts` is exhausted.
  pub fn call(&mut self, payload: RequestPayload) -> Result<Reply, ClientError> {
    let request_id = self.fresh_request_id();
    let expected_op = payload.op_code();
    let bytes = Request::new(request_id, payload).encode();

    for attempt in 1..=self.max_attempts {
      debug!("sending {expected_op:?} #{request_id} (attempt {attempt}/{})", self.max_attempts);
      self.socket.send(&bytes)?;

      match self.await_reply(expected_op)? {
        Some(outcome) => return outcome,
        None => continue, // this attempt's deadline elapsed; retry
      }
    }
    Err(ClientError::Timeout {
      attempts: self.max_attempts,
    })
  }

  /// Wait up to `self.timeout` for a reply to `expected_op`. Datagrams that
  /// don't match are discarded, including MONITOR-UPDATE, which is never
  /// expected in the request loop (§4.6 step 6). Returns `None` on timeout
  /// so the caller can retry.
  fn await_reply(&mut self, expected_op: OpCode) -> Result<Option<Result<Reply, ClientError>>, ClientError> {
    let deadline = Instant::now() + self.timeout;
    loop {
      let remaining = deadline.saturating_duration_since(Instant::now());
      if remaining.is_zero() {
        return Ok(None);
      }
      self.socket.set_read_timeout(Some(remaining))?;

      let mut buf = [0u8; MAX_DATAGRAM_SIZE];
      match self.socket.recv(&mut buf) {
        Ok(len) => match ServerMessage::decode(&buf[..len]) {
          Ok(ServerMessage::Error { code, detail }) => return Ok(Some(Err(ClientError::Remote { code, detail }))),
          Ok(ServerMessage::Reply(reply)) if reply.op_code() == expected_op => return Ok(Some(Ok(reply))),
          Ok(ServerMessage::Reply(_)) | Ok(ServerMessage::MonitorUpdate(_)) => {
            trace!("discarding datagram unrelated to pending {expected_op:?} call");
            continue;
          }
          Err(e) => {
            warn!("dropping undecodable datagram while awaiting {expected_op:?}: {e}");
            continue;
          }
        },
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => return Ok(None),
        Err(e) => return Err(e.into()),
      }
    }
  }

  /// Register for updates on `facility`, then block for `duration_seconds`,
  /// invoking `on_update` for every MONITOR-UPDATE received for it. No
  /// retransmission happens in this window (§4.6 "Monitoring mode").
  pub fn register_and_monitor<F>(&mut self, facility: &str, duration_seconds: u32, mut on_update: F) -> Result<(), ClientError>
  where
    F: FnMut(MonitorUpdate),
  {
    self.call(RequestPayload::MonitorRegister {
      facility: facility.to_string(),
      duration_seconds,
    })?;

    let deadline = Instant::now() + Duration::from_secs(duration_seconds as u64);
    loop {
      let remaining = deadline.saturating_duration_since(Instant::now());
      if remaining.is_zero() {
        return Ok(());
      }
      self.socket.set_read_timeout(Some(remaining))?;

      let mut buf = [0u8; MAX_DATAGRAM_SIZE];
      match self.socket.recv(&mut buf) {
        Ok(len) => match ServerMessage::decode(&buf[..len]) {
          Ok(ServerMessage::MonitorUpdate(update)) if update.facility == facility => on_update(update),
          Ok(_) => continue,
          Err(e) => {
            warn!("dropping undecodable datagram during monitor window: {e}");
            continue;
          }
        },
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => return Ok(()),
        Err(e) => return Err(e.into()),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::booking::time::TimeTriple;
  use crate::server::config::Semantics;
  use crate::server::dispatcher::{dispatch_datagram, ServerContext};
  use std::net::SocketAddr;
  use std::thread;

  fn t(day: u8, hour: u8, minute: u8) -> TimeTriple {
    TimeTriple::new(day, hour, minute).unwrap()
  }

  /// A tiny single-shot loopback server: handles exactly `replies` requests
  /// (deduped via a real `ServerContext`), replying over a real UDP socket,
  /// so the engine's framing and retry logic run over the real transport.
  fn spawn_echo_server(semantics: Semantics, requests_to_handle: usize) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap();
    thread::spawn(move || {
      let mut ctx = ServerContext::new(
        semantics,
        crate::booking::store::DEFAULT_FACILITIES.iter().map(|s| s.to_string()),
        0.0,
        0.0,
      );
      let mut buf = [0u8; MAX_DATAGRAM_SIZE];
      for _ in 0..requests_to_handle {
        let (len, from) = socket.recv_from(&mut buf).unwrap();
        let outcome = dispatch_datagram(&mut ctx, from, &buf[..len]);
        socket.send_to(&outcome.reply, from).unwrap();
      }
    });
    addr
  }

  #[test]
  fn book_round_trips_over_real_udp() {
    let addr = spawn_echo_server(Semantics::AtLeastOnce, 1);
    let mut client = ClientEngine::connect(addr).unwrap().with_timeout(Duration::from_millis(500));
    let reply = client
      .call(RequestPayload::Book {
        facility: "Meeting Room A".to_string(),
        start: t(0, 9, 0),
        end: t(0, 10, 0),
      })
      .unwrap();
    assert!(matches!(reply, Reply::Book { .. }));
  }

  #[test]
  fn timeout_fails_after_max_attempts_when_nobody_answers() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap();
    // socket is never read from; every attempt must time out.
    let mut client = ClientEngine::connect(addr)
      .unwrap()
      .with_timeout(Duration::from_millis(50))
      .with_max_attempts(2);
    let err = client
      .call(RequestPayload::Cancel {
        confirmation_id: "1".to_string(),
      })
      .unwrap_err();
    assert_eq!(err, ClientError::Timeout { attempts: 2 });
  }
}
