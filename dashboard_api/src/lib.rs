//! DeFi dashboard API
//!
//! Serves the transparency, bond and governance data behind the protocol
//! dashboard. Every endpoint reads through a shared key/value cache and
//! falls back to the last stored payload when an upstream (RPC node,
//! indexer, price feed) fails.

pub mod api;
pub mod bonds;
pub mod cache;
pub mod config;
pub mod governance;
pub mod interest_model;
pub mod revenue;
pub mod units;
pub mod upstream;

pub use config::{Config, NetworkId};
