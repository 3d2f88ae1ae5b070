//! Hand-rolled binary wire protocol: primitives, message schema (§4.1).

pub mod message;
pub mod primitives;
