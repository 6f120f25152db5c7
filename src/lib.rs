//! aprshub - APRS-IS ingestion, storage, and live packet distribution
//!
//! Connects to an APRS-IS relay, decodes the TNC2 packet stream into
//! structured records, suppresses relay duplicates, persists everything to
//! Postgres, and fans packets out to websocket subscribers by callsign or
//! geographic cell. A paginated query API reads the stored packets back.

pub mod actions;
pub mod aprs;
pub mod callsign;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod live_packets;
pub mod metrics;
pub mod packet;
pub mod packets_repo;
pub mod position;
pub mod schema;
pub mod weather;
pub mod web;

pub use aprs::client::{AprsClient, AprsClientConfig, ClientEvent};
pub use error::{AppError, AppResult};
pub use packet::{Packet, PacketType};
