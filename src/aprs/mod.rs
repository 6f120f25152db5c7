//! APRS-IS subsystem: the TNC2 wire decoder and the upstream TCP client.

pub mod client;
pub mod mic_e;
pub mod parser;
pub mod timestamp;
pub mod wx;

pub use client::{AprsClient, AprsClientConfig, ClientEvent};
pub use parser::parse_packet;
