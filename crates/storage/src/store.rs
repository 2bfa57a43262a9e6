use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::StorageError;
use crate::table::Table;

/// Named tables shared between concurrent evaluations.
///
/// Reads take a shared lock and hand out an `Arc` snapshot of the table, so
/// an evaluation keeps a stable view even while rows are appended. Writes
/// take the exclusive lock.
#[derive(Debug, Default)]
pub struct SourceTables {
    tables: RwLock<HashMap<String, Arc<dyn Table>>>,
}

impl SourceTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Result<Option<Arc<dyn Table>>, StorageError> {
        let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        Ok(tables.get(name).cloned())
    }

    /// Add rows to a table. An existing table of the same name is
    /// append-merged with the new one, never overwritten.
    pub fn insert(&self, name: &str, table: Box<dyn Table>) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        let merged: Arc<dyn Table> = match tables.get(name) {
            Some(existing) => Arc::from(existing.append(table.as_ref())),
            None => Arc::from(table),
        };
        debug!(table = name, rows = merged.len(), "source table updated");
        tables.insert(name.to_string(), merged);
        Ok(())
    }

    /// Replace a table wholesale.
    pub fn replace(&self, name: &str, table: Box<dyn Table>) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        tables.insert(name.to_string(), Arc::from(table));
        Ok(())
    }

    pub fn names(&self) -> Result<Vec<String>, StorageError> {
        let tables = self.tables.read().map_err(|_| StorageError::Poisoned)?;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Drop every table.
    pub fn reset(&self) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| StorageError::Poisoned)?;
        tables.clear();
        Ok(())
    }
}
