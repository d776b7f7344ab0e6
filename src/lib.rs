//! fintrack: a personal-finance ledger.
//!
//! The ledger is an in-memory list of transactions backed by a CSV file that is rewritten on every
//! change. Transactions can be imported from other CSV files, and a recommendation engine turns the
//! ledger into spending advice, asking a remote text-generation service first and falling back to
//! local rules.

pub mod advice;
mod app;
pub mod args;
pub mod commands;
mod config;
mod error;
mod fs;
mod import;
pub mod ledger;
pub mod model;
mod utils;


pub use app::App;
pub use config::{Config, RemoteSettings};
pub use error::{error_type, Error, ErrorType, Result};
pub use import::ImportDeduplicator;
