//! Error hierarchy shared by the codec, the booking store and the dispatcher.
//!
//! `WireError` and `DomainError` both carry the byte value they map to on
//! the wire (§6 of the protocol); `ServerError` composes the two so the
//! dispatcher can turn any failure into an `ERROR` datagram with one match.

use thiserror::Error;

/// Protocol-level error code, as carried after the `0xFF` ERROR op code.
pub type ErrorCode = u8;

pub const NOT_FOUND: ErrorCode = 1;
pub const INVALID_TIME: ErrorCode = 2;
pub const CONFLICT: ErrorCode = 3;
pub const CANCELLED: ErrorCode = 4;
pub const MALFORMED: ErrorCode = 5;
pub const UNKNOWN_OP: ErrorCode = 6;
pub const INTERNAL: ErrorCode = 7;

/// Failures while decoding a datagram into a [`crate::wire::message::Message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
  #[error("datagram truncated: expected {needed} more byte(s), got {available}")]
  Truncated { needed: usize, available: usize },

  #[error("invalid UTF-8 in string field")]
  InvalidUtf8,

  #[error("time field out of range: day={day} hour={hour} minute={minute}")]
  InvalidTimeField { day: u8, hour: u8, minute: u8 },

  #[error("unrecognised operation code 0x{0:02X}")]
  InvalidOpCode(u8),
}

impl WireError {
  /// The `§6` error code this failure is reported under.
  pub fn code(&self) -> ErrorCode {
    match self {
      WireError::InvalidOpCode(_) => UNKNOWN_OP,
      _ => MALFORMED,
    }
  }
}

/// Failures raised by the booking store while executing a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
  #[error("no such facility: {0}")]
  NotFound(String),

  #[error("invalid time range: {0}")]
  InvalidTime(String),

  #[error("booking conflicts with an existing reservation")]
  Conflict,

  #[error("booking already cancelled")]
  Cancelled,

  #[error("internal error: {0}")]
  Internal(String),
}

impl DomainError {
  pub fn code(&self) -> ErrorCode {
    match self {
      DomainError::NotFound(_) => NOT_FOUND,
      DomainError::InvalidTime(_) => INVALID_TIME,
      DomainError::Conflict => CONFLICT,
      DomainError::Cancelled => CANCELLED,
      DomainError::Internal(_) => INTERNAL,
    }
  }

  pub fn detail(&self) -> String {
    self.to_string()
  }
}

/// Everything that can go wrong while the dispatcher handles one datagram.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServerError {
  #[error(transparent)]
  Wire(#[from] WireError),

  #[error(transparent)]
  Domain(#[from] DomainError),
}

impl ServerError {
  pub fn code(&self) -> ErrorCode {
    match self {
      ServerError::Wire(e) => e.code(),
      ServerError::Domain(e) => e.code(),
    }
  }

  pub fn detail(&self) -> String {
    self.to_string()
  }
}

/// Client-local failure. Never encoded on the wire (§6). Undecodable
/// datagrams received while awaiting a reply are not reported here — the
/// engine treats them as noise from some other exchange and keeps waiting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
  #[error("timed out after {attempts} attempt(s)")]
  Timeout { attempts: u32 },

  #[error("server reported an error: {detail} (code {code})")]
  Remote { code: ErrorCode, detail: String },

  #[error("i/o error: {0}")]
  Io(String),
}

impl From<std::io::Error> for ClientError {
  fn from(e: std::io::Error) -> Self {
    ClientError::Io(e.to_string())
  }
}
