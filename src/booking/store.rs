//! The booking state machine and availability index (§4.2).
//!
//! A single [`BookingStore`] owns every facility and every booking ever
//! made against them. Cancelled bookings are retained for history (§3) but
//! excluded from overlap checks and from [`BookingStore::query`].

use std::collections::{BTreeSet, HashMap};

use log::info;

use crate::booking::time::{in_week_window, TimeTriple, MINUTES_PER_DAY};
use crate::error::DomainError;

/// A single reservation. `original_end` is recorded once, at creation, and
/// never mutated afterwards — EXTEND's idempotent algebra is defined in
/// terms of it, not of the booking's current `end` (§4.2, §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
  pub confirmation_id: String,
  pub facility: String,
  pub start: u32,
  pub end: u32,
  pub original_end: u32,
  pub cancelled: bool,
}

/// The set of facilities whose free-interval view changed as a result of a
/// mutating request; drives monitor callback fan-out (§4.2, §4.5).
pub type NotificationSet = BTreeSet<String>;

fn overlaps(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
  a_start < b_end && b_start < a_end
}

pub struct BookingStore {
  facilities: BTreeSet<String>,
  bookings: HashMap<String, Booking>,
  next_confirmation_id: u64,
}

impl BookingStore {
  pub fn new(facilities: impl IntoIterator<Item = String>) -> Self {
    Self {
      facilities: facilities.into_iter().collect(),
      bookings: HashMap::new(),
      next_confirmation_id: 1,
    }
  }

  pub fn has_facility(&self, facility: &str) -> bool {
    self.facilities.contains(facility)
  }

  fn require_facility(&self, facility: &str) -> Result<(), DomainError> {
    if self.has_facility(facility) {
      Ok(())
    } else {
      Err(DomainError::NotFound(facility.to_string()))
    }
  }

  fn active_bookings(&self, facility: &str) -> impl Iterator<Item = &Booking> {
    self
      .bookings
      .values()
      .filter(move |b| b.facility == facility && !b.cancelled)
  }

  fn conflicts(&self, facility: &str, start: u32, end: u32, excluding: Option<&str>) -> bool {
    self
      .active_bookings(facility)
      .filter(|b| excluding != Some(b.confirmation_id.as_str()))
      .any(|b| overlaps(start, end, b.start, b.end))
  }

  fn next_id(&mut self) -> String {
    let id = self.next_confirmation_id;
    self.next_confirmation_id += 1;
    id.to_string()
  }

  /// Free intervals for `facility` restricted to the requested `days`. An
  /// empty `days` list is taken to mean the whole week — there is no sense
  /// in which "query no days" should return "fully booked" (Open Question,
  /// resolved in DESIGN.md).
  pub fn query(&self, facility: &str, days: &[u8]) -> Result<Vec<(TimeTriple, TimeTriple)>, DomainError> {
    self.require_facility(facility)?;

    let mut requested: Vec<u32> = if days.is_empty() {
      (0..7).collect()
    } else {
      days.iter().map(|&d| d as u32).collect()
    };
    requested.sort_unstable();
    requested.dedup();

    let mut blocks: Vec<(u32, u32)> = Vec::new();
    for day in requested {
      let day_start = day * MINUTES_PER_DAY;
      let day_end = day_start + MINUTES_PER_DAY;
      match blocks.last_mut() {
        Some((_, end)) if *end == day_start => *end = day_end,
        _ => blocks.push((day_start, day_end)),
      }
    }

    let mut active: Vec<(u32, u32)> = self.active_bookings(facility).map(|b| (b.start, b.end)).collect();
    active.sort_unstable();

    let mut free = Vec::new();
    for (block_start, block_end) in blocks {
      let mut cursor = block_start;
      for &(b_start, b_end) in &active {
        if b_end <= cursor || b_start >= block_end {
          continue;
        }
        let b_start = b_start.max(block_start);
        let b_end = b_end.min(block_end);
        if b_start > cursor {
          free.push((cursor, b_start));
        }
        cursor = cursor.max(b_end);
      }
      if cursor < block_end {
        free.push((cursor, block_end));
      }
    }

    // A run ending exactly at minute 10_080 wraps to the following Monday
    // 00:00 under `TimeTriple::from_minute`'s cyclic week model.
    Ok(
      free
        .into_iter()
        .map(|(s, e)| (TimeTriple::from_minute(s), TimeTriple::from_minute(e)))
        .collect(),
    )
  }

  pub fn book(
    &mut self,
    facility: &str,
    start: TimeTriple,
    end: TimeTriple,
  ) -> Result<(String, NotificationSet), DomainError> {
    self.require_facility(facility)?;
    let (start_min, end_min) = (start.to_minute(), end.to_minute());
    if start_min >= end_min {
      return Err(DomainError::InvalidTime(format!(
        "start {start_min} is not before end {end_min}"
      )));
    }
    if self.conflicts(facility, start_min, end_min, None) {
      return Err(DomainError::Conflict);
    }

    let confirmation_id = self.next_id();
    self.bookings.insert(
      confirmation_id.clone(),
      Booking {
        confirmation_id: confirmation_id.clone(),
        facility: facility.to_string(),
        start: start_min,
        end: end_min,
        original_end: end_min,
        cancelled: false,
      },
    );
    info!("booked {confirmation_id} on {facility} [{start_min}, {end_min})");

    let mut notify = NotificationSet::new();
    notify.insert(facility.to_string());
    Ok((confirmation_id, notify))
  }

  pub fn change(&mut self, confirmation_id: &str, offset_minutes: i32) -> Result<NotificationSet, DomainError> {
    let booking = self
      .bookings
      .get(confirmation_id)
      .ok_or_else(|| DomainError::NotFound(confirmation_id.to_string()))?;
    if booking.cancelled {
      return Err(DomainError::Cancelled);
    }

    let new_start = booking.start as i64 + offset_minutes as i64;
    let new_end = booking.end as i64 + offset_minutes as i64;
    if new_start < 0 || new_end < 0 || new_start >= new_end || !in_week_window(new_end as u32 - 1) {
      return Err(DomainError::InvalidTime(format!(
        "offset {offset_minutes} pushes booking out of range"
      )));
    }
    let (new_start, new_end) = (new_start as u32, new_end as u32);

    let facility = booking.facility.clone();
    if self.conflicts(&facility, new_start, new_end, Some(confirmation_id)) {
      return Err(DomainError::Conflict);
    }

    let booking = self.bookings.get_mut(confirmation_id).expect("checked above");
    booking.start = new_start;
    booking.end = new_end;
    info!("changed {confirmation_id} to [{new_start}, {new_end})");

    let mut notify = NotificationSet::new();
    notify.insert(facility);
    Ok(notify)
  }

  pub fn extend(&mut self, confirmation_id: &str, extra_minutes: u32) -> Result<NotificationSet, DomainError> {
    let booking = self
      .bookings
      .get(confirmation_id)
      .ok_or_else(|| DomainError::NotFound(confirmation_id.to_string()))?;
    if booking.cancelled {
      return Err(DomainError::Cancelled);
    }

    let new_end = booking.original_end as i64 + extra_minutes as i64;
    if new_end <= booking.start as i64 || !in_week_window(new_end as u32 - 1) {
      return Err(DomainError::InvalidTime(format!(
        "extra {extra_minutes} pushes booking out of range"
      )));
    }
    let new_end = new_end as u32;

    if new_end == booking.end {
      // Idempotent no-op: a retransmitted EXTEND that already landed.
      return Ok(NotificationSet::new());
    }

    let facility = booking.facility.clone();
    let start = booking.start;
    if self.conflicts(&facility, start, new_end, Some(confirmation_id)) {
      return Err(DomainError::Conflict);
    }

    let booking = self.bookings.get_mut(confirmation_id).expect("checked above");
    booking.end = new_end;
    info!("extended {confirmation_id} to end={new_end}");

    let mut notify = NotificationSet::new();
    notify.insert(facility);
    Ok(notify)
  }

  pub fn cancel(&mut self, confirmation_id: &str) -> Result<NotificationSet, DomainError> {
    let booking = self
      .bookings
      .get_mut(confirmation_id)
      .ok_or_else(|| DomainError::NotFound(confirmation_id.to_string()))?;
    if booking.cancelled {
      return Err(DomainError::Cancelled);
    }
    booking.cancelled = true;
    let facility = booking.facility.clone();
    info!("cancelled {confirmation_id} on {facility}");

    let mut notify = NotificationSet::new();
    notify.insert(facility);
    Ok(notify)
  }

  #[cfg(test)]
  pub fn booking(&self, confirmation_id: &str) -> Option<&Booking> {
    self.bookings.get(confirmation_id)
  }
}

/// The facilities the server is seeded with at process start (§3). Hosting
/// this list is a collaborator concern (§1); the store itself accepts any
/// facility set.
pub const DEFAULT_FACILITIES: &[&str] = &[
  "Meeting Room A",
  "Lecture Theatre 1",
  "Conference Hall",
  "Seminar Room B",
];
