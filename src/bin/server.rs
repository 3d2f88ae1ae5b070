//! The server binary: parse args, seed the store, bind the socket, run.

use std::net::UdpSocket;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use facility_booking::booking::store::DEFAULT_FACILITIES;
use facility_booking::server::config::ServerArgs;
use facility_booking::server::dispatcher::{self, ServerContext};

fn main() -> ExitCode {
  env_logger::init();
  let args = ServerArgs::parse();
  let (p_req_loss, p_rep_loss) = args.loss_probabilities();

  let socket = match UdpSocket::bind(("0.0.0.0", args.port)) {
    Ok(socket) => socket,
    Err(e) => {
      error!("failed to bind UDP port {}: {e}", args.port);
      return ExitCode::FAILURE;
    }
  };

  let ctx = ServerContext::new(
    args.semantics,
    DEFAULT_FACILITIES.iter().map(|s| s.to_string()),
    p_req_loss,
    p_rep_loss,
  );

  if let Err(e) = dispatcher::run(ctx, socket) {
    error!("server aborted: {e}");
    return ExitCode::FAILURE;
  }
  ExitCode::SUCCESS
}
