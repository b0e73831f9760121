use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("{operation} failed")]
    Operation {
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    /// Unique-index violation surfaced as a storage conflict.
    #[error("duplicate key: {message}")]
    Duplicate { message: String },
    /// Conditional write found the row in an unexpected state.
    #[error("precondition failed: {message}")]
    Precondition { message: String },
    #[error("missing row: {message}")]
    Missing { message: String },
}

impl MongoDaoError {
    pub fn operation(operation: &'static str, source: MongoError) -> Self {
        if is_duplicate_key(&source) {
            return MongoDaoError::Duplicate {
                message: format!("{operation}: unique index violated"),
            };
        }
        MongoDaoError::Operation { operation, source }
    }
}

/// True for the server's E11000 duplicate-key error.
fn is_duplicate_key(err: &MongoError) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    match &*err.kind {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        // Bulk shapes vary between driver versions; fall back to the code tag.
        _ => err.to_string().contains("E11000"),
    }
}
