//! # Raffle App
//!
//! Configuration, backend wiring and the [`RaffleApp`] facade exposing every
//! reservation operation: create, get, cancel, validate and list
//! reservations, the three payment signals, promotion codes and inventory
//! status.
//!
//! The `raffle-worker` binary connects Redis and `PostgreSQL`, runs the
//! expiry reaper and the reconciler, and exports Prometheus metrics until it
//! receives Ctrl-C.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// The operation facade
pub mod app;

/// Backend wiring and background tasks
pub mod bootstrap;

/// Environment configuration
pub mod config;

pub use app::RaffleApp;
pub use bootstrap::{BootstrapError, ProductionApp, Worker, connect};
pub use config::{Config, ConfigError};
