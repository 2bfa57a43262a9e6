//! Tabular sources consumed by the statute rule engine.
//!
//! - [`Table`] -- the backend-agnostic contract (filter, project, rows,
//!   column access, append-merge)
//! - [`RowTable`] and [`ColumnTable`] -- two interchangeable in-memory
//!   backends
//! - [`SourceTables`] -- the shared, lock-protected store that evaluations
//!   read from and loaders append into
//! - [`conformance`] -- a reusable suite every backend must pass

mod column;
pub mod conformance;
mod error;
mod row;
mod store;
mod table;

pub use column::ColumnTable;
pub use error::StorageError;
pub use row::RowTable;
pub use store::SourceTables;
pub use table::{rows_from_json, FilterOp, Row, Table};
