//! A connectionless request/reply facility-booking service comparing
//! at-least-once and at-most-once invocation semantics over UDP.

pub mod booking;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod history;
pub mod monitor;
pub mod server;
pub mod wire;
