//! Client-side CLI surface (§6).

use clap::Parser;

use crate::server::config::Semantics;

/// `host port semantics` (§6). The client must be told which semantics the
/// server enforces since retry behaviour under duplication differs — it has
/// no way to discover this from the wire.
#[derive(Debug, Parser)]
#[command(name = "booking-client", about = "Facility-booking RPC client")]
pub struct ClientArgs {
  /// Server hostname or IP address.
  pub host: String,

  /// Server UDP port.
  pub port: u16,

  /// Semantics the target server is running under.
  pub semantics: Semantics,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_args() {
    let args = ClientArgs::parse_from(["booking-client", "127.0.0.1", "9000", "at-least-once"]);
    assert_eq!(args.host, "127.0.0.1");
    assert_eq!(args.port, 9000);
    assert_eq!(args.semantics, Semantics::AtLeastOnce);
  }

  #[test]
  fn rejects_invalid_semantics() {
    let result = ClientArgs::try_parse_from(["booking-client", "127.0.0.1", "9000", "sometimes"]);
    assert!(result.is_err());
  }
}
