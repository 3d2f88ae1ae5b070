//! The client binary: an interactive menu driving the reliability engine
//! (§6, out of scope except for the translation into protocol calls).

use std::io::{self, Write};
use std::net::ToSocketAddrs;
use std::time::Duration;

use clap::Parser;
use log::{error, info};

use facility_booking::booking::time::TimeTriple;
use facility_booking::client::config::ClientArgs;
use facility_booking::client::engine::ClientEngine;
use facility_booking::wire::message::{Reply, RequestPayload};

fn prompt(label: &str) -> io::Result<String> {
  print!("{label}: ");
  io::stdout().flush()?;
  let mut line = String::new();
  io::stdin().read_line(&mut line)?;
  Ok(line.trim().to_string())
}

fn prompt_time(label: &str) -> io::Result<TimeTriple> {
  loop {
    let raw = prompt(&format!("{label} (day hour minute)"))?;
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if let [day, hour, minute] = parts[..] {
      if let (Ok(day), Ok(hour), Ok(minute)) = (day.parse(), hour.parse(), minute.parse()) {
        if let Some(t) = TimeTriple::new(day, hour, minute) {
          return Ok(t);
        }
      }
    }
    println!("invalid time triple, try again (day 0-6, hour 0-23, minute 0-59)");
  }
}

fn print_reply(reply: Reply) {
  match reply {
    Reply::Query { intervals } => {
      for (start, end) in intervals {
        println!("  free: {start:?} .. {end:?}");
      }
    }
    Reply::Book { confirmation_id } => println!("booked, confirmation-id = {confirmation_id}"),
    Reply::Change => println!("changed"),
    Reply::MonitorRegisterAck => println!("registered"),
    Reply::Extend => println!("extended"),
    Reply::Cancel => println!("cancelled"),
  }
}

fn run_menu(engine: &mut ClientEngine) -> io::Result<()> {
  loop {
    println!(
      "\n1) QUERY  2) BOOK  3) CHANGE  4) MONITOR-REGISTER  5) EXTEND  6) CANCEL  7) EXIT"
    );
    let choice = prompt("choice")?;
    let payload = match choice.as_str() {
      "1" => {
        let facility = prompt("facility")?;
        let days_raw = prompt("days (space-separated, blank = whole week)")?;
        let days: Vec<u8> = days_raw.split_whitespace().filter_map(|s| s.parse().ok()).collect();
        RequestPayload::Query { facility, days }
      }
      "2" => {
        let facility = prompt("facility")?;
        let start = prompt_time("start")?;
        let end = prompt_time("end")?;
        RequestPayload::Book { facility, start, end }
      }
      "3" => {
        let confirmation_id = prompt("confirmation-id")?;
        let offset_minutes = prompt("offset-minutes")?.parse().unwrap_or(0);
        RequestPayload::Change {
          confirmation_id,
          offset_minutes,
        }
      }
      "4" => {
        let facility = prompt("facility")?;
        let duration_seconds = prompt("duration-seconds")?.parse().unwrap_or(60);
        println!("registering and watching for {duration_seconds}s...");
        if let Err(e) = engine.register_and_monitor(&facility, duration_seconds, |update| {
          println!("monitor update for {}:", update.facility);
          for (start, end) in update.intervals {
            println!("  free: {start:?} .. {end:?}");
          }
        }) {
          println!("monitor failed: {e}");
        }
        continue;
      }
      "5" => {
        let confirmation_id = prompt("confirmation-id")?;
        let extra_minutes = prompt("extra-minutes")?.parse().unwrap_or(0);
        RequestPayload::Extend {
          confirmation_id,
          extra_minutes,
        }
      }
      "6" => {
        let confirmation_id = prompt("confirmation-id")?;
        RequestPayload::Cancel { confirmation_id }
      }
      "7" => return Ok(()),
      other => {
        println!("unrecognised choice: {other}");
        continue;
      }
    };

    match engine.call(payload) {
      Ok(reply) => print_reply(reply),
      Err(e) => println!("request failed: {e}"),
    }
  }
}

fn main() {
  env_logger::init();
  let args = ClientArgs::parse();

  let server = match (args.host.as_str(), args.port).to_socket_addrs().and_then(|mut it| {
    it.next()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host resolved to no address"))
  }) {
    Ok(addr) => addr,
    Err(e) => {
      error!("failed to resolve {}:{}: {e}", args.host, args.port);
      std::process::exit(1);
    }
  };

  info!("connecting to {server} (server semantics: {:?})", args.semantics);

  let mut engine = match ClientEngine::connect(server) {
    Ok(engine) => engine.with_timeout(Duration::from_secs(5)).with_max_attempts(3),
    Err(e) => {
      error!("failed to connect to {server}: {e}");
      std::process::exit(1);
    }
  };

  if let Err(e) = run_menu(&mut engine) {
    error!("client aborted: {e}");
    std::process::exit(1);
  }
}
