//! Offline-resilient donation sync for kiosk displays.
//!
//! Donations are written to a NocoDB gateway; when that fails they land in a
//! durable SQLite-backed queue and are replayed in order once the gateway is
//! reachable again. Campaign progress is recomputed after every mutation and
//! published through [`controller::SyncController`].

pub mod api;
pub mod config;
pub mod connectivity;
pub mod controller;
pub mod db;
pub mod errors;
pub mod format;
pub mod gateway;
pub mod models;
pub mod nocodb;
pub mod queue;
pub mod stats;
pub mod storage;
