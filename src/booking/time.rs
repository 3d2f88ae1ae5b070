//! The weekly time model: a `(day, hour, minute)` triple on the wire,
//! normalized internally to minutes-since-Monday-00:00 (§3).

use static_assertions::const_assert_eq;

pub const DAYS_PER_WEEK: u32 = 7;
pub const HOURS_PER_DAY: u32 = 24;
pub const MINUTES_PER_HOUR: u32 = 60;
pub const MINUTES_PER_DAY: u32 = HOURS_PER_DAY * MINUTES_PER_HOUR;
pub const MINUTES_PER_WEEK: u32 = DAYS_PER_WEEK * MINUTES_PER_DAY;

const_assert_eq!(MINUTES_PER_WEEK, 10_080);

/// A `(day, hour, minute)` field as it appears on the wire. `day` is
/// `0..=6` with 0 = Monday, `hour` is `0..=23`, `minute` is `0..=59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeTriple {
  pub day: u8,
  pub hour: u8,
  pub minute: u8,
}

impl TimeTriple {
  pub fn new(day: u8, hour: u8, minute: u8) -> Option<Self> {
    if (day as u32) < DAYS_PER_WEEK && (hour as u32) < HOURS_PER_DAY && (minute as u32) < MINUTES_PER_HOUR {
      Some(Self { day, hour, minute })
    } else {
      None
    }
  }

    /// Minutes elapsed since Monday 00:00, in `0..10_080`.
  pub fn to_minute(self) -> u32 {
    self.day as u32 * MINUTES_PER_DAY + self.hour as u32 * MINUTES_PER_HOUR + self.minute as u32
  }

  /// Inverse of [`Self::to_minute`]. `minute` must be `0..10_080`; this is an
  /// internal helper, callers are expected to keep values in range.
  pub fn from_minute(minute: u32) -> Self {
    let minute = minute % MINUTES_PER_WEEK;
    let day = (minute / MINUTES_PER_DAY) as u8;
    let rem = minute % MINUTES_PER_DAY;
    let hour = (rem / MINUTES_PER_HOUR) as u8;
    let min = (rem % MINUTES_PER_HOUR) as u8;
    Self {
      day,
      hour,
      minute: min,
    }
  }
}

/// True if `minute` falls within the valid week window `0..MINUTES_PER_WEEK`.
pub fn in_week_window(minute: u32) -> bool {
  minute < MINUTES_PER_WEEK
}

#[cfg(test)]
mod tests {
  use super::*;
  use test_case::test_case;

  #[test_case(0, 0, 0, 0; "monday midnight")]
  #[test_case(0, 9, 0, 540; "monday nine am")]
  #[test_case(1, 0, 0, 1440; "tuesday midnight")]
  #[test_case(6, 23, 59, 10_079; "sunday last minute")]
  fn converts_to_minute(day: u8, hour: u8, minute: u8, expected: u32) {
    let t = TimeTriple::new(day, hour, minute).unwrap();
    assert_eq!(t.to_minute(), expected);
  }

  #[test]
  fn round_trips_through_minute() {
    let t = TimeTriple::new(4, 17, 45).unwrap();
    let back = TimeTriple::from_minute(t.to_minute());
    assert_eq!(t, back);
  }

  #[test]
  fn rejects_out_of_range_fields() {
    assert!(TimeTriple::new(7, 0, 0).is_none());
    assert!(TimeTriple::new(0, 24, 0).is_none());
    assert!(TimeTriple::new(0, 0, 60).is_none());
  }
}
