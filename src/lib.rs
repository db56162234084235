//! vm-mirror - live mirror of a Voicemeeter mixer over its companion app WebSocket
//!
//! Layers, leaves first: `protocol` (wire codec), `connection` (reconnecting
//! socket loop), `state` (reconciliation into immutable snapshots) and
//! `session` (the consumer-facing composition of the two).

pub mod cli;
pub mod config;
pub mod connection;
pub mod controls;
pub mod model;
pub mod protocol;
pub mod session;
pub mod state;

pub use config::AppConfig;
pub use session::{Session, SessionError};
