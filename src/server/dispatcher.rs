//! The single-threaded server dispatcher (§4.4): one receive loop owns the
//! socket, the booking store, the history cache and the monitor registry as
//! a single consistency domain (§5, §9 "Global mutable state").

use std::io;
use std::net::UdpSocket;
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::booking::store::{BookingStore, NotificationSet};
use crate::endpoint::{self, Endpoint};
use crate::error::{DomainError, ServerError};
use crate::history::HistoryCache;
use crate::monitor::MonitorRegistry;
use crate::server::config::Semantics;
use crate::wire::message::{ErrorReply, MonitorUpdate, Reply, Request, RequestPayload};

/// The conventional UDP-over-Ethernet safe payload size (§6); large enough
/// for every message this protocol defines, and the protocol never
/// fragments a logical message across datagrams.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// The store, history cache and monitor registry bundled as the one
/// consistency domain the dispatcher owns (§5 "Shared-resource policy").
pub struct ServerContext {
  pub store: BookingStore,
  pub history: HistoryCache,
  pub monitor: MonitorRegistry,
  pub semantics: Semantics,
  pub p_req_loss: f64,
  pub p_rep_loss: f64,
}

impl ServerContext {
  pub fn new(
    semantics: Semantics,
    facilities: impl IntoIterator<Item = String>,
    p_req_loss: f64,
    p_rep_loss: f64,
  ) -> Self {
    Self {
      store: BookingStore::new(facilities),
      history: HistoryCache::new(),
      monitor: MonitorRegistry::new(),
      semantics,
      p_req_loss,
      p_rep_loss,
    }
  }
}

/// The outcome of handling one decoded (or failed-to-decode) datagram,
/// before any send has been attempted. Kept separate from socket I/O so the
/// handling logic can be exercised without a real socket (§SPEC_FULL ambient
/// test tooling).
pub struct DispatchOutcome {
  pub reply: Vec<u8>,
  pub notify: NotificationSet,
  pub immediate_callback: Option<(Endpoint, Vec<u8>)>,
}

fn roll_loss(p: f64) -> bool {
  p > 0.0 && (p >= 1.0 || rand::random::<f64>() < p)
}

/// The one place a failure of any kind becomes an `ERROR` datagram —
/// `ServerError` composes `WireError` and `DomainError` so this match never
/// needs to know which layer raised it (§7 "Error type design").
fn error_bytes(e: impl Into<ServerError>) -> Vec<u8> {
  let e = e.into();
  ErrorReply {
    code: e.code(),
    detail: e.detail(),
  }
  .encode()
}

/// Handle one already-survived-request-loss datagram (§4.4 steps 2-4, 6).
/// Does not itself simulate reply loss or touch the socket — that is the
/// caller's job, since loss-simulation and send failure handling differ for
/// the primary reply versus fanned-out callbacks.
pub fn dispatch_datagram(ctx: &mut ServerContext, from: Endpoint, bytes: &[u8]) -> DispatchOutcome {
  let request = match Request::decode(bytes) {
    Ok(r) => r,
    Err(e) => {
      warn!("malformed datagram from {from}: {e}");
      return DispatchOutcome {
        reply: error_bytes(e),
        notify: NotificationSet::new(),
        immediate_callback: None,
      };
    }
  };
  trace!("received {:?} #{} from {from}", request.payload.op_code(), request.request_id);

  if let RequestPayload::MonitorRegister {
    facility,
    duration_seconds,
  } = &request.payload
  {
    return handle_monitor_register(ctx, from, facility, *duration_seconds);
  }

  // MONITOR-REGISTER is routed above and never touches the cache; every
  // other op is a candidate for at-most-once deduplication (§4.4 step 4).
  let key = (from, request.request_id);
  if ctx.semantics.uses_history_cache() {
    if let Some(cached) = ctx.history.get(&key) {
      debug!("history cache hit for {from} #{}", request.request_id);
      return DispatchOutcome {
        reply: cached.to_vec(),
        notify: NotificationSet::new(),
        immediate_callback: None,
      };
    }
  }

  let (reply, notify) = match execute(ctx, &request.payload) {
    Ok((reply, notify)) => (reply.encode(), notify),
    Err(e) => (error_bytes(e), NotificationSet::new()),
  };

  if ctx.semantics.uses_history_cache() {
    ctx.history.insert(key, reply.clone());
  }

  DispatchOutcome {
    reply,
    notify,
    immediate_callback: None,
  }
}

/// Run one request against the store. Every store error converts into
/// `ServerError` via `?`, so `dispatch_datagram`'s single `error_bytes` call
/// is the only place a reply byte layout for a failure is decided.
fn execute(ctx: &mut ServerContext, payload: &RequestPayload) -> Result<(Reply, NotificationSet), ServerError> {
  match payload {
    RequestPayload::Query { facility, days } => {
      let intervals = ctx.store.query(facility, days)?;
      Ok((Reply::Query { intervals }, NotificationSet::new()))
    }
    RequestPayload::Book { facility, start, end } => {
      let (confirmation_id, notify) = ctx.store.book(facility, *start, *end)?;
      Ok((Reply::Book { confirmation_id }, notify))
    }
    RequestPayload::Change {
      confirmation_id,
      offset_minutes,
    } => {
      let notify = ctx.store.change(confirmation_id, *offset_minutes)?;
      Ok((Reply::Change, notify))
    }
    RequestPayload::Extend {
      confirmation_id,
      extra_minutes,
    } => {
      let notify = ctx.store.extend(confirmation_id, *extra_minutes)?;
      Ok((Reply::Extend, notify))
    }
    RequestPayload::Cancel { confirmation_id } => {
      let notify = ctx.store.cancel(confirmation_id)?;
      Ok((Reply::Cancel, notify))
    }
    RequestPayload::MonitorRegister { .. } => unreachable!("routed before execute() is called"),
  }
}

fn handle_monitor_register(
  ctx: &mut ServerContext,
  from: Endpoint,
  facility: &str,
  duration_seconds: u32,
) -> DispatchOutcome {
  if !ctx.store.has_facility(facility) {
    return DispatchOutcome {
      reply: error_bytes(DomainError::NotFound(facility.to_string())),
      notify: NotificationSet::new(),
      immediate_callback: None,
    };
  }

  ctx.monitor.register(facility, from, Duration::from_secs(duration_seconds as u64));
  info!("monitor registered: {from} -> {facility} for {duration_seconds}s");

  // An immediate snapshot on success, to just this endpoint (§4.5), distinct
  // from the general fan-out triggered by later mutations.
  let intervals = ctx.store.query(facility, &[]).unwrap_or_default();
  let snapshot = MonitorUpdate {
    facility: facility.to_string(),
    intervals,
  }
  .encode();

  DispatchOutcome {
    reply: Reply::MonitorRegisterAck.encode(),
    notify: NotificationSet::new(),
    immediate_callback: Some((from, snapshot)),
  }
}

/// Send `bytes` to `to`, first rolling the reply-loss Bernoulli trial.
/// Returns `Some(Err(_))` only for a genuine transport failure — a
/// simulated drop is not an error and must not prune a subscription (§4.5).
fn send_as_server(socket: &UdpSocket, p_rep_loss: f64, to: Endpoint, bytes: &[u8]) -> Option<io::Result<()>> {
  if roll_loss(p_rep_loss) {
    debug!("simulated reply loss to {to}");
    return None;
  }
  Some(socket.send_to(bytes, to).map(|_| ()))
}

/// Compute current free intervals for `facility` and push a MONITOR-UPDATE
/// to every active subscriber, pruning subscriptions whose send fails
/// (§4.5). Expired subscriptions are pruned as a side effect of listing the
/// active set.
fn fan_out(ctx: &mut ServerContext, socket: &UdpSocket, facility: &str) {
  let intervals = match ctx.store.query(facility, &[]) {
    Ok(intervals) => intervals,
    Err(_) => return, // facility vanished from under us: nothing to report
  };
  let bytes = MonitorUpdate {
    facility: facility.to_string(),
    intervals,
  }
  .encode();

  for endpoint in ctx.monitor.active_endpoints(facility) {
    if let Some(Err(e)) = send_as_server(socket, ctx.p_rep_loss, endpoint, &bytes) {
      warn!("callback send failed, dropping subscription {endpoint} -> {facility}: {e}");
      ctx.monitor.remove(facility, endpoint);
    }
  }
}

/// Run the server forever. Blocks on `recv_from`; every other step is
/// synchronous and non-blocking from the protocol's perspective (§5).
pub fn run(mut ctx: ServerContext, socket: UdpSocket) -> io::Result<()> {
  let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
  info!(
    "server listening on {:?}, semantics={:?}, p_req_loss={}, p_rep_loss={}",
    socket.local_addr()?,
    match ctx.semantics {
      Semantics::AtLeastOnce => "at-least-once",
      Semantics::AtMostOnce => "at-most-once",
    },
    ctx.p_req_loss,
    ctx.p_rep_loss,
  );

  loop {
    let (len, from) = socket.recv_from(&mut buf)?;
    let from = endpoint::normalize(from);

    if roll_loss(ctx.p_req_loss) {
      debug!("simulated request loss from {from}");
      continue;
    }

    let outcome = dispatch_datagram(&mut ctx, from, &buf[..len]);

    if let Some(Err(e)) = send_as_server(&socket, ctx.p_rep_loss, from, &outcome.reply) {
      warn!("reply send failed to {from}: {e}");
    }

    if let Some((to, bytes)) = outcome.immediate_callback {
      if let Some(Err(e)) = send_as_server(&socket, ctx.p_rep_loss, to, &bytes) {
        warn!("initial monitor snapshot send failed to {to}: {e}");
      }
    }

    for facility in &outcome.notify {
      fan_out(&mut ctx, &socket, facility);
    }
  }
}
