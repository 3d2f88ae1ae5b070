//! The at-most-once request-history cache (§4.3): a duplicate filter keyed
//! by `(client-endpoint, request-id)` that memoizes the exact reply bytes
//! sent the first time a request completed.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::endpoint::Endpoint;

pub const HISTORY_TTL: Duration = Duration::from_secs(5 * 60);

pub type HistoryKey = (Endpoint, u32);

struct Entry {
  reply_bytes: Vec<u8>,
  inserted_at: Instant,
}

/// Disabled entirely under at-least-once (§4.3); the dispatcher simply
/// never constructs or consults one in that mode.
#[derive(Default)]
pub struct HistoryCache {
  entries: HashMap<HistoryKey, Entry>,
}

impl HistoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// The cached reply for `key`, if present and not yet expired. Does not
  /// itself evict — eviction only sweeps on insertion (§4.3).
  pub fn get(&self, key: &HistoryKey) -> Option<&[u8]> {
    self
      .entries
      .get(key)
      .filter(|e| e.inserted_at.elapsed() < HISTORY_TTL)
      .map(|e| e.reply_bytes.as_slice())
  }

  /// Record the reply for `key`, first sweeping any entries past their TTL.
  pub fn insert(&mut self, key: HistoryKey, reply_bytes: Vec<u8>) {
    self.sweep();
    self.entries.insert(
      key,
      Entry {
        reply_bytes,
        inserted_at: Instant::now(),
      },
    );
  }

  fn sweep(&mut self) {
    let before = self.entries.len();
    self.entries.retain(|_, e| e.inserted_at.elapsed() < HISTORY_TTL);
    let evicted = before - self.entries.len();
    if evicted > 0 {
      debug!("history cache swept {evicted} expired entrie(s)");
    }
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.entries.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::SocketAddr;

  fn key(port: u16, request_id: u32) -> HistoryKey {
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    (addr, request_id)
  }

  #[test]
  fn miss_then_hit() {
    let mut cache = HistoryCache::new();
    assert!(cache.get(&key(1000, 1)).is_none());
    cache.insert(key(1000, 1), vec![1, 2, 3]);
    assert_eq!(cache.get(&key(1000, 1)), Some(&[1, 2, 3][..]));
  }

  #[test]
  fn different_request_ids_are_distinct_keys() {
    let mut cache = HistoryCache::new();
    cache.insert(key(1000, 1), vec![1]);
    assert!(cache.get(&key(1000, 2)).is_none());
  }

  #[test]
  fn insert_sweeps_expired_entries() {
    let mut cache = HistoryCache::new();
    cache.entries.insert(
      key(1000, 1),
      Entry {
        reply_bytes: vec![9],
        inserted_at: Instant::now() - HISTORY_TTL - Duration::from_secs(1),
      },
    );
    assert_eq!(cache.len(), 1);
    cache.insert(key(1000, 2), vec![2]);
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&key(1000, 1)).is_none());
  }
}
