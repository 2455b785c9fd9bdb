// Balance Ledger - Core Library
// Per-card daily balance timelines reconciled from reported balances.
// Exposes all modules for use in the CLI, the API server, and tests.

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod grouping;
pub mod logging;
pub mod money;
pub mod observation;
pub mod reconciliation;
pub mod search;
pub mod service;
pub mod store;
pub mod timeline;

// Re-export commonly used types
pub use config::Config;
pub use db::{setup_database, Event, SqliteStore};
pub use entities::{CreditCard, User};
pub use error::{LedgerError, Result};
pub use grouping::{group_by_account, GroupedBatch};
pub use money::Amount;
pub use observation::{load_csv, parse_date, validate_batch, Observation, RawObservation};
pub use reconciliation::{
    Adjustment, AdjustmentKind, ReconciliationEngine, ReconciliationReport,
};
pub use search::first_not_before;
pub use service::{AccountLocks, LedgerService};
pub use store::{MemoryStore, SequenceStore};
pub use timeline::{Checkpoint, Timeline};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
