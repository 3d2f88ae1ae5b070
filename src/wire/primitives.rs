//! Primitive wire forms shared by every message: fixed-width integers, the
//! length-prefixed string, the 3-byte time triple and the length-prefixed
//! list. All integers are big-endian (§4.1).

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Buf;

use crate::booking::time::TimeTriple;
use crate::error::WireError;

/// Append-only wire writer. A thin wrapper over `Vec<u8>` so call sites read
/// as a sequence of field writes rather than raw byte pushes.
#[derive(Debug, Default)]
pub struct Writer {
  buf: Vec<u8>,
}

impl Writer {
  pub fn new() -> Self {
    Self { buf: Vec::new() }
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.buf
  }

  pub fn put_u8(&mut self, v: u8) {
    self.buf.push(v);
  }

  pub fn put_u32(&mut self, v: u32) {
    // Vec<u8> is an infallible Write target.
    self.buf.write_u32::<BigEndian>(v).expect("write to Vec never fails");
  }

  pub fn put_i32(&mut self, v: i32) {
    self.buf.write_i32::<BigEndian>(v).expect("write to Vec never fails");
  }

  pub fn put_string(&mut self, s: &str) {
    self.put_u32(s.len() as u32);
    self.buf.extend_from_slice(s.as_bytes());
  }

  pub fn put_time_triple(&mut self, t: TimeTriple) {
    self.put_u8(t.day);
    self.put_u8(t.hour);
    self.put_u8(t.minute);
  }

  pub fn put_list<T, F>(&mut self, items: &[T], mut put_one: F)
  where
    F: FnMut(&mut Writer, &T),
  {
    self.put_u32(items.len() as u32);
    for item in items {
      put_one(self, item);
    }
  }
}

/// Checked cursor over a received datagram. Every read verifies enough bytes
/// remain before advancing; a short buffer yields `WireError::Truncated`
/// instead of panicking (§4.1 "Decode discipline").
pub struct Reader<'a> {
  buf: &'a [u8],
}

impl<'a> Reader<'a> {
  pub fn new(buf: &'a [u8]) -> Self {
    Self { buf }
  }

  pub fn remaining(&self) -> usize {
    self.buf.remaining()
  }

  fn need(&self, n: usize) -> Result<(), WireError> {
    if self.buf.remaining() < n {
      Err(WireError::Truncated {
        needed: n,
        available: self.buf.remaining(),
      })
    } else {
      Ok(())
    }
  }

  pub fn get_u8(&mut self) -> Result<u8, WireError> {
    self.need(1)?;
    Ok(self.buf.get_u8())
  }

  pub fn get_u32(&mut self) -> Result<u32, WireError> {
    self.need(4)?;
    Ok(self.buf.get_u32())
  }

  pub fn get_i32(&mut self) -> Result<i32, WireError> {
    self.need(4)?;
    Ok(self.buf.get_i32())
  }

  pub fn get_string(&mut self) -> Result<String, WireError> {
    let len = self.get_u32()? as usize;
    self.need(len)?;
    let mut bytes = vec![0u8; len];
    self.buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
  }

  pub fn get_time_triple(&mut self) -> Result<TimeTriple, WireError> {
    let day = self.get_u8()?;
    let hour = self.get_u8()?;
    let minute = self.get_u8()?;
    TimeTriple::new(day, hour, minute).ok_or(WireError::InvalidTimeField { day, hour, minute })
  }

  pub fn get_list<T, F>(&mut self, mut get_one: F) -> Result<Vec<T>, WireError>
  where
    F: FnMut(&mut Reader<'a>) -> Result<T, WireError>,
  {
    let count = self.get_u32()? as usize;
    let mut out = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
      out.push(get_one(self)?);
    }
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_string() {
    let mut w = Writer::new();
    w.put_string("Meeting Room A");
    let bytes = w.into_bytes();
    let mut r = Reader::new(&bytes);
    assert_eq!(r.get_string().unwrap(), "Meeting Room A");
  }

  #[test]
  fn round_trips_time_triple() {
    let t = TimeTriple::new(3, 9, 30).unwrap();
    let mut w = Writer::new();
    w.put_time_triple(t);
    let bytes = w.into_bytes();
    assert_eq!(bytes.len(), 3);
    let mut r = Reader::new(&bytes);
    assert_eq!(r.get_time_triple().unwrap(), t);
  }

  #[test]
  fn truncated_read_is_reported_not_panicked() {
    let bytes = [0u8, 0, 0]; // too short for a u32
    let mut r = Reader::new(&bytes);
    let err = r.get_u32().unwrap_err();
    assert_eq!(
      err,
      WireError::Truncated {
        needed: 4,
        available: 3
      }
    );
  }

  #[test]
  fn invalid_utf8_is_rejected() {
    let mut w = Writer::new();
    w.put_u32(2);
    let mut bytes = w.into_bytes();
    bytes.extend_from_slice(&[0xFF, 0xFE]);
    let mut r = Reader::new(&bytes);
    assert_eq!(r.get_string().unwrap_err(), WireError::InvalidUtf8);
  }

  #[test]
  fn invalid_time_field_is_rejected() {
    let bytes = [7u8, 0, 0]; // day out of 0..=6
    let mut r = Reader::new(&bytes);
    assert!(r.get_time_triple().is_err());
  }

  #[test]
  fn list_round_trips() {
    let mut w = Writer::new();
    w.put_list(&[1u8, 2, 3], |w, v| w.put_u8(*v));
    let bytes = w.into_bytes();
    let mut r = Reader::new(&bytes);
    let items = r.get_list(|r| r.get_u8()).unwrap();
    assert_eq!(items, vec![1, 2, 3]);
  }
}
