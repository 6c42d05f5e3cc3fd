use strata::StorageError;

#[derive(Debug)]
pub enum ExecutionError {
    /// The transaction was chosen as a deadlock victim or the pool could
    /// not make room without stealing; the coordinator must abort it.
    Aborted,
    /// A failure from the storage layer.
    Storage(StorageError),
    /// The cursor protocol was used before open or after close.
    NotOpen,
    /// `next` was called past the end of the stream.
    Exhausted,
    /// The aggregate operator is not defined for this field type.
    UnsupportedAggregate(String),
    /// An operator was wired to a child whose schema does not fit.
    SchemaMismatch(String),
}

impl From<StorageError> for ExecutionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::TransactionAborted => ExecutionError::Aborted,
            other => ExecutionError::Storage(other),
        }
    }
}
