/// All errors that can be returned by a [`Table`](crate::Table) backend or
/// the shared [`SourceTables`](crate::SourceTables) store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The filter operator symbol is not one of `= != > < >= <= in`.
    #[error("unknown filter operator: {op}")]
    UnknownOperator { op: String },

    /// The operand does not fit the operator, e.g. `in` without a list.
    #[error("filter operator '{op}' cannot use a {got} operand")]
    InvalidOperand { op: String, got: String },

    /// Table data could not be read, e.g. JSON that is not a list of objects.
    #[error("invalid table data: {message}")]
    InvalidData { message: String },

    /// A writer panicked while holding the store lock.
    #[error("source table lock poisoned")]
    Poisoned,
}
