//! The message schema: operation codes and the tagged payload variants that
//! replace the source's dynamically-typed fields (§4.1, §9 "Dynamic typing
//! of payloads").
//!
//! A reply reuses the op code of the request it answers — the envelope
//! carries no separate "reply code" table. Only `ERROR` (`0xFF`) and the
//! unsolicited `MONITOR-UPDATE` callback (`7`) are recognisable on their own.

use log::trace;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive as _;

use crate::booking::time::TimeTriple;
use crate::error::WireError;
use crate::wire::primitives::{Reader, Writer};

pub const ERROR_OP: u8 = 0xFF;

/// A free (or, in requests, bare) interval on the wire: `(start, end)`.
pub type Interval = (TimeTriple, TimeTriple);

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum OpCode {
  Query = 1,
  Book = 2,
  Change = 3,
  MonitorRegister = 4,
  Extend = 5,
  Cancel = 6,
  MonitorUpdate = 7,
}

impl OpCode {
  pub fn from_byte(b: u8) -> Result<Self, WireError> {
    <OpCode as num_traits::FromPrimitive>::from_u8(b).ok_or(WireError::InvalidOpCode(b))
  }

  pub fn to_byte(self) -> u8 {
    self as u8
  }
}

fn put_interval(w: &mut Writer, (start, end): &Interval) {
  w.put_time_triple(*start);
  w.put_time_triple(*end);
}

fn get_interval(r: &mut Reader<'_>) -> Result<Interval, WireError> {
  let start = r.get_time_triple()?;
  let end = r.get_time_triple()?;
  Ok((start, end))
}

/// The payload of a client→server request, tagged by variant instead of the
/// source's heterogeneous field bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
  Query {
    facility: String,
    days: Vec<u8>,
  },
  Book {
    facility: String,
    start: TimeTriple,
    end: TimeTriple,
  },
  Change {
    confirmation_id: String,
    offset_minutes: i32,
  },
  MonitorRegister {
    facility: String,
    duration_seconds: u32,
  },
  Extend {
    confirmation_id: String,
    extra_minutes: u32,
  },
  Cancel {
    confirmation_id: String,
  },
}

impl RequestPayload {
  pub fn op_code(&self) -> OpCode {
    match self {
      RequestPayload::Query { .. } => OpCode::Query,
      RequestPayload::Book { .. } => OpCode::Book,
      RequestPayload::Change { .. } => OpCode::Change,
      RequestPayload::MonitorRegister { .. } => OpCode::MonitorRegister,
      RequestPayload::Extend { .. } => OpCode::Extend,
      RequestPayload::Cancel { .. } => OpCode::Cancel,
    }
  }
}

/// A full client→server request: op code, request-id, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub request_id: u32,
  pub payload: RequestPayload,
}

impl Request {
  pub fn new(request_id: u32, payload: RequestPayload) -> Self {
    Self { request_id, payload }
  }

  pub fn encode(&self) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_u8(self.payload.op_code().to_byte());
    w.put_u32(self.request_id);
    match &self.payload {
      RequestPayload::Query { facility, days } => {
        w.put_string(facility);
        w.put_list(days, |w, d| w.put_u8(*d));
      }
      RequestPayload::Book { facility, start, end } => {
        w.put_string(facility);
        w.put_time_triple(*start);
        w.put_time_triple(*end);
      }
      RequestPayload::Change {
        confirmation_id,
        offset_minutes,
      } => {
        w.put_string(confirmation_id);
        w.put_i32(*offset_minutes);
      }
      RequestPayload::MonitorRegister {
        facility,
        duration_seconds,
      } => {
        w.put_string(facility);
        w.put_u32(*duration_seconds);
      }
      RequestPayload::Extend {
        confirmation_id,
        extra_minutes,
      } => {
        w.put_string(confirmation_id);
        w.put_u32(*extra_minutes);
      }
      RequestPayload::Cancel { confirmation_id } => {
        w.put_string(confirmation_id);
      }
    }
    w.into_bytes()
  }

  pub fn decode(bytes: &[u8]) -> Result<Request, WireError> {
    let mut r = Reader::new(bytes);
    let op_byte = r.get_u8()?;
    let op = OpCode::from_byte(op_byte)?;
    let request_id = r.get_u32()?;
    let payload = match op {
      OpCode::Query => {
        let facility = r.get_string()?;
        let days = r.get_list(|r| r.get_u8())?;
        RequestPayload::Query { facility, days }
      }
      OpCode::Book => {
        let facility = r.get_string()?;
        let start = r.get_time_triple()?;
        let end = r.get_time_triple()?;
        RequestPayload::Book { facility, start, end }
      }
      OpCode::Change => {
        let confirmation_id = r.get_string()?;
        let offset_minutes = r.get_i32()?;
        RequestPayload::Change {
          confirmation_id,
          offset_minutes,
        }
      }
      OpCode::MonitorRegister => {
        let facility = r.get_string()?;
        let duration_seconds = r.get_u32()?;
        RequestPayload::MonitorRegister {
          facility,
          duration_seconds,
        }
      }
      OpCode::Extend => {
        let confirmation_id = r.get_string()?;
        let extra_minutes = r.get_u32()?;
        RequestPayload::Extend {
          confirmation_id,
          extra_minutes,
        }
      }
      OpCode::Cancel => {
        let confirmation_id = r.get_string()?;
        RequestPayload::Cancel { confirmation_id }
      }
      // MONITOR-UPDATE is a server-originated callback; a client is never
      // expected to send it as a request.
      OpCode::MonitorUpdate => return Err(WireError::InvalidOpCode(op_byte)),
    };
    if r.remaining() > 0 {
      trace!("{} trailing byte(s) after request #{request_id}, ignored", r.remaining());
    }
    Ok(Request { request_id, payload })
  }
}

/// The payload of a server→client reply (no request-id, §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
  Query { intervals: Vec<Interval> },
  Book { confirmation_id: String },
  Change,
  MonitorRegisterAck,
  Extend,
  Cancel,
}

impl Reply {
  pub fn op_code(&self) -> OpCode {
    match self {
      Reply::Query { .. } => OpCode::Query,
      Reply::Book { .. } => OpCode::Book,
      Reply::Change => OpCode::Change,
      Reply::MonitorRegisterAck => OpCode::MonitorRegister,
      Reply::Extend => OpCode::Extend,
      Reply::Cancel => OpCode::Cancel,
    }
  }

  pub fn encode(&self) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_u8(self.op_code().to_byte());
    match self {
      Reply::Query { intervals } => w.put_list(intervals, put_interval),
      Reply::Book { confirmation_id } => w.put_string(confirmation_id),
      Reply::Change | Reply::MonitorRegisterAck | Reply::Extend | Reply::Cancel => {}
    }
    w.into_bytes()
  }
}

/// A server-originated `ERROR` datagram: `0xFF`, code, detail string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
  pub code: u8,
  pub detail: String,
}

impl ErrorReply {
  pub fn encode(&self) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_u8(ERROR_OP);
    w.put_u8(self.code);
    w.put_string(&self.detail);
    w.into_bytes()
  }
}

/// An unsolicited `MONITOR-UPDATE` callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorUpdate {
  pub facility: String,
  pub intervals: Vec<Interval>,
}

impl MonitorUpdate {
  pub fn encode(&self) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_u8(OpCode::MonitorUpdate.to_byte());
    w.put_string(&self.facility);
    w.put_list(&self.intervals, put_interval);
    w.into_bytes()
  }
}

/// Anything a client may receive: a reply to its outstanding request, an
/// error, or (only collected during monitor mode) a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
  Reply(Reply),
  Error { code: u8, detail: String },
  MonitorUpdate(MonitorUpdate),
}

impl ServerMessage {
  pub fn decode(bytes: &[u8]) -> Result<ServerMessage, WireError> {
    let mut r = Reader::new(bytes);
    let op_byte = r.get_u8()?;
    if op_byte == ERROR_OP {
      let code = r.get_u8()?;
      let detail = r.get_string()?;
      return Ok(ServerMessage::Error { code, detail });
    }
    let op = OpCode::from_byte(op_byte)?;
    let message = match op {
      OpCode::Query => {
        let intervals = r.get_list(get_interval)?;
        ServerMessage::Reply(Reply::Query { intervals })
      }
      OpCode::Book => {
        let confirmation_id = r.get_string()?;
        ServerMessage::Reply(Reply::Book { confirmation_id })
      }
      OpCode::Change => ServerMessage::Reply(Reply::Change),
      OpCode::MonitorRegister => ServerMessage::Reply(Reply::MonitorRegisterAck),
      OpCode::Extend => ServerMessage::Reply(Reply::Extend),
      OpCode::Cancel => ServerMessage::Reply(Reply::Cancel),
      OpCode::MonitorUpdate => {
        let facility = r.get_string()?;
        let intervals = r.get_list(get_interval)?;
        ServerMessage::MonitorUpdate(MonitorUpdate { facility, intervals })
      }
    };
    if r.remaining() > 0 {
      trace!("{} trailing byte(s) after server message, ignored", r.remaining());
    }
    Ok(message)
  }

  /// The op code this message would be read back under, used by the client
  /// to check a reply matches the call it is waiting on.
  pub fn op_code(&self) -> Option<OpCode> {
    match self {
      ServerMessage::Reply(reply) => Some(reply.op_code()),
      ServerMessage::Error { .. } => None,
      ServerMessage::MonitorUpdate(_) => Some(OpCode::MonitorUpdate),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn t(day: u8, hour: u8, minute: u8) -> TimeTriple {
    TimeTriple::new(day, hour, minute).unwrap()
  }

  #[test]
  fn request_round_trips_book() {
    let req = Request::new(
      42,
      RequestPayload::Book {
        facility: "Meeting Room A".to_string(),
        start: t(0, 9, 0),
        end: t(0, 10, 0),
      },
    );
    let bytes = req.encode();
    assert_eq!(bytes[0], OpCode::Book.to_byte());
    let decoded = Request::decode(&bytes).unwrap();
    assert_eq!(decoded, req);
  }

  #[test]
  fn request_round_trips_query_with_empty_days() {
    let req = Request::new(
      1,
      RequestPayload::Query {
        facility: "Conference Hall".to_string(),
        days: vec![],
      },
    );
    let bytes = req.encode();
    assert_eq!(Request::decode(&bytes).unwrap(), req);
  }

  #[test]
  fn reply_round_trips_query() {
    let reply = Reply::Query {
      intervals: vec![(t(0, 0, 0), t(0, 9, 0)), (t(0, 11, 0), t(1, 0, 0))],
    };
    let bytes = reply.encode();
    let decoded = ServerMessage::decode(&bytes).unwrap();
    assert_eq!(decoded, ServerMessage::Reply(reply));
  }

  #[test]
  fn reply_round_trips_book() {
    let reply = Reply::Book {
      confirmation_id: "17".to_string(),
    };
    let bytes = reply.encode();
    assert_eq!(ServerMessage::decode(&bytes).unwrap(), ServerMessage::Reply(reply));
  }

  #[test]
  fn empty_reply_variants_round_trip() {
    for reply in [Reply::Change, Reply::MonitorRegisterAck, Reply::Extend, Reply::Cancel] {
      let bytes = reply.encode();
      assert_eq!(bytes.len(), 1);
      assert_eq!(ServerMessage::decode(&bytes).unwrap(), ServerMessage::Reply(reply));
    }
  }

  #[test]
  fn error_round_trips() {
    let err = ErrorReply {
      code: crate::error::CONFLICT,
      detail: "slot taken".to_string(),
    };
    let bytes = err.encode();
    assert_eq!(
      ServerMessage::decode(&bytes).unwrap(),
      ServerMessage::Error {
        code: crate::error::CONFLICT,
        detail: "slot taken".to_string()
      }
    );
  }

  #[test]
  fn monitor_update_round_trips_and_is_never_expected_as_a_request() {
    let update = MonitorUpdate {
      facility: "Seminar Room B".to_string(),
      intervals: vec![(t(2, 8, 0), t(2, 18, 0))],
    };
    let bytes = update.encode();
    assert_eq!(
      ServerMessage::decode(&bytes).unwrap(),
      ServerMessage::MonitorUpdate(update)
    );
    assert!(Request::decode(&bytes).is_err());
  }

  #[test]
  fn cancel_request_matches_the_exact_wire_layout() {
    use hex_literal::hex;
    let req = Request::new(
      0x0000_0007,
      RequestPayload::Cancel {
        confirmation_id: "42".to_string(),
      },
    );
    // op=CANCEL(6), request-id=7, string len=2, "42"
    let expected = hex!("06 00000007 00000002 3432");
    assert_eq!(req.encode(), expected);
  }

  #[test]
  fn unknown_op_code_is_rejected() {
    let bytes = [0x09u8, 0, 0, 0, 0];
    assert_eq!(Request::decode(&bytes).unwrap_err(), WireError::InvalidOpCode(0x09));
  }

  #[test]
  fn truncated_request_is_malformed_not_a_panic() {
    let bytes = [OpCode::Book.to_byte()]; // missing request-id and payload
    assert!(Request::decode(&bytes).is_err());
  }

  #[test]
  fn trailing_bytes_after_a_complete_request_are_not_an_error() {
    let req = Request::new(
      1,
      RequestPayload::Cancel {
        confirmation_id: "42".to_string(),
      },
    );
    let mut bytes = req.encode();
    bytes.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
    let decoded = Request::decode(&bytes).unwrap();
    assert_eq!(decoded.payload, req.payload);
  }
}
