//! # apex-store
//!
//! Durable, transactional storage for the Apex constraint kernel.
//!
//! Every kernel collection (events, budgets, the cost ledger, quarantine
//! records, checkpoints, state transitions, conflict resolutions and
//! actuator actions) lives in one SQLite database. Components share a
//! single [`Store`] and perform each atomic unit of work inside
//! [`Store::write`], which holds SQLite's write lock for the whole closure.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use apex_store::{Store, StoreConfig};
//!
//! let store = Store::open("/tmp/apex.db", &StoreConfig::default()).unwrap();
//! let events: i64 = store
//!     .read(|conn| {
//!         conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
//!             .map_err(apex_store::StoreError::from)
//!     })
//!     .unwrap();
//! println!("{} events", events);
//! ```

pub mod column;
pub mod error;
pub mod schema;
pub mod store;

pub use error::StoreError;
pub use store::{Store, StoreConfig};
