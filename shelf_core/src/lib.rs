#![forbid(unsafe_code)]

//! Core domain model and business logic for the Shelf library system.
//!
//! This crate provides:
//! - Domain types (books, loan records, accounts)
//! - The catalog store and the loan ledger
//! - Fine computation
//! - Persistence (locked JSON state, loan journal, CSV import/export)
//! - Admin reports

pub mod types;
pub mod error;
pub mod fine;
pub mod catalog;
pub mod ledger;
pub mod accounts;
pub mod config;
pub mod logging;
pub mod journal;
pub mod csv_io;
pub mod state;
pub mod reports;
pub mod store;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::Catalog;
pub use ledger::Ledger;
pub use accounts::Accounts;
pub use config::Config;
pub use fine::{FinePolicy, GRACE_DAYS, RATE_PER_DAY};
pub use journal::{EventSink, JsonlJournal, LoanEvent, LoanEventKind};
pub use reports::LibraryStats;
pub use state::LibraryState;
pub use store::LibraryStore;
