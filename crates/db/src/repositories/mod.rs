use deskflow_core::ports::StorageError;

pub mod approval;
pub mod category;
pub mod directory;
pub mod ticket;

pub use approval::SqlApprovalRepository;
pub use category::SqlCategoryRepository;
pub use directory::SqlUserDirectory;
pub use ticket::SqlTicketRepository;

/// Fold sqlx failures into the storage port's error shape. Unique index
/// violations surface as constraint errors so callers can tell a broken
/// invariant from a broken connection.
pub(crate) fn storage_error(error: sqlx::Error) -> StorageError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Constraint(db.message().to_string())
        }
        _ => StorageError::Backend(error.to_string()),
    }
}

pub(crate) fn decode_error(error: sqlx::Error) -> StorageError {
    StorageError::Decode(error.to_string())
}
