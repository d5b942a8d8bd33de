//! `bluemoon` - Condominium management backend
//!
//! This library provides the resident registry, the fee and invoice ledger,
//! parking and visitor logs, incident tracking, notices, donation campaigns
//! and the dashboard aggregates, stored in `SQLite` and served over HTTP.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod import;
pub mod logging;
pub mod model;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result, RowFailure};
pub use import::{ImportReport, MasterData};
pub use logging::init_logging;
pub use storage::{Rules, Storage, StorageStats};
