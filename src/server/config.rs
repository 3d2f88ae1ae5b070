//! Server-side configuration and CLI surface (§6, §4.9 ADDED).

use clap::{Parser, ValueEnum};

/// The invocation semantics a server process is fixed to for its lifetime
/// (§1, §4.4). Never changes once the process starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Semantics {
  #[value(name = "at-least-once")]
  AtLeastOnce,
  #[value(name = "at-most-once")]
  AtMostOnce,
}

impl Semantics {
  pub fn uses_history_cache(self) -> bool {
    matches!(self, Semantics::AtMostOnce)
  }
}

fn unit_probability(s: &str) -> Result<f64, String> {
  let value: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(format!("'{s}' is not a probability in [0, 1]"))
  }
}

/// `port semantics [loss] [p_rep_loss]` (§6, §9 Open Questions). With one
/// loss value given it applies to both directions; with two, they apply
/// independently. Missing entirely, both default to 0.
#[derive(Debug, Parser)]
#[command(name = "booking-server", about = "Facility-booking RPC server")]
pub struct ServerArgs {
  /// UDP port to bind.
  pub port: u16,

  /// Invocation semantics this server enforces for its whole lifetime.
  pub semantics: Semantics,

  /// Probability, in [0, 1], applied to incoming requests; applied to
  /// outgoing replies too unless `p_rep_loss` is also given.
  #[arg(value_parser = unit_probability)]
  p_req_loss: Option<f64>,

  /// Probability, in [0, 1], that an outgoing reply or callback is
  /// silently dropped. Independent of `p_req_loss` only if given.
  #[arg(value_parser = unit_probability)]
  p_rep_loss: Option<f64>,
}

impl ServerArgs {
  /// `(request-loss, reply-loss)`, a single given value having been applied
  /// to both directions (§9).
  pub fn loss_probabilities(&self) -> (f64, f64) {
    let req = self.p_req_loss.unwrap_or(0.0);
    let rep = self.p_rep_loss.unwrap_or(req);
    (req, rep)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_minimal_args() {
    let args = ServerArgs::parse_from(["booking-server", "9000", "at-most-once"]);
    assert_eq!(args.port, 9000);
    assert_eq!(args.semantics, Semantics::AtMostOnce);
    assert_eq!(args.loss_probabilities(), (0.0, 0.0));
  }

  #[test]
  fn a_single_loss_value_applies_to_both_directions() {
    let args = ServerArgs::parse_from(["booking-server", "9000", "at-least-once", "0.3"]);
    assert_eq!(args.loss_probabilities(), (0.3, 0.3));
  }

  #[test]
  fn parses_both_loss_probabilities_independently() {
    let args = ServerArgs::parse_from(["booking-server", "9000", "at-least-once", "0.3", "0.1"]);
    assert_eq!(args.loss_probabilities(), (0.3, 0.1));
  }

  #[test]
  fn rejects_out_of_range_probability() {
    let result = ServerArgs::try_parse_from(["booking-server", "9000", "at-most-once", "1.5"]);
    assert!(result.is_err());
  }

  #[test]
  fn rejects_invalid_semantics() {
    let result = ServerArgs::try_parse_from(["booking-server", "9000", "sometimes"]);
    assert!(result.is_err());
  }
}
