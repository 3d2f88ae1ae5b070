//! The monitor subscription registry (§4.5). This module only holds data —
//! `(facility, endpoint, expiry)` records — never a socket or handle (§9
//! "Callback back-references"); sending the actual MONITOR-UPDATE datagrams
//! is the dispatcher's job (§server::dispatcher).

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;

use crate::endpoint::Endpoint;

#[derive(Debug, Clone)]
pub struct Subscription {
  pub facility: String,
  pub endpoint: Endpoint,
  pub expires_at: DateTime<Utc>,
}

impl Subscription {
  pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
    now < self.expires_at
  }
}

#[derive(Default)]
pub struct MonitorRegistry {
  subscriptions: Vec<Subscription>,
}

impl MonitorRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register interest in `facility` from `endpoint` for `duration`.
  /// Multiple subscriptions from the same endpoint to the same facility
  /// coexist; no deduplication is attempted (§3).
  pub fn register(&mut self, facility: &str, endpoint: Endpoint, duration: Duration) {
    let expires_at = Utc::now()
      + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    debug!("monitor registered: {facility} <- {endpoint} until {expires_at}");
    self.subscriptions.push(Subscription {
      facility: facility.to_string(),
      endpoint,
      expires_at,
    });
  }

  /// Endpoints currently subscribed to `facility`, after pruning anything
  /// that has expired.
  pub fn active_endpoints(&mut self, facility: &str) -> Vec<Endpoint> {
    self.prune_expired();
    self
      .subscriptions
      .iter()
      .filter(|s| s.facility == facility)
      .map(|s| s.endpoint)
      .collect()
  }

  /// Drop a subscription after a transport-level send failure (§3, §4.5).
  pub fn remove(&mut self, facility: &str, endpoint: Endpoint) {
    self
      .subscriptions
      .retain(|s| !(s.facility == facility && s.endpoint == endpoint));
  }

  fn prune_expired(&mut self) {
    let now = Utc::now();
    let before = self.subscriptions.len();
    self.subscriptions.retain(|s| s.is_active_at(now));
    let expired = before - self.subscriptions.len();
    if expired > 0 {
      debug!("monitor registry pruned {expired} expired subscription(s)");
    }
  }

  #[cfg(test)]
  pub fn subscription_count(&self) -> usize {
    self.subscriptions.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ep(port: u16) -> Endpoint {
    format!("127.0.0.1:{port}").parse().unwrap()
  }

  #[test]
  fn registers_and_lists_active_endpoints() {
    let mut reg = MonitorRegistry::new();
    reg.register("Conference Hall", ep(1), Duration::from_secs(60));
    assert_eq!(reg.active_endpoints("Conference Hall"), vec![ep(1)]);
  }

  #[test]
  fn multiple_subscriptions_from_same_endpoint_coexist() {
    let mut reg = MonitorRegistry::new();
    reg.register("Conference Hall", ep(1), Duration::from_secs(60));
    reg.register("Conference Hall", ep(1), Duration::from_secs(60));
    assert_eq!(reg.subscription_count(), 2);
  }

  #[test]
  fn expired_subscriptions_are_pruned_on_access() {
    let mut reg = MonitorRegistry::new();
    reg.register("Conference Hall", ep(1), Duration::from_millis(0));
    std::thread::sleep(Duration::from_millis(5));
    assert!(reg.active_endpoints("Conference Hall").is_empty());
    assert_eq!(reg.subscription_count(), 0);
  }

  #[test]
  fn remove_drops_only_the_matching_endpoint() {
    let mut reg = MonitorRegistry::new();
    reg.register("Conference Hall", ep(1), Duration::from_secs(60));
    reg.register("Conference Hall", ep(2), Duration::from_secs(60));
    reg.remove("Conference Hall", ep(1));
    assert_eq!(reg.active_endpoints("Conference Hall"), vec![ep(2)]);
  }
}
