mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoQuizStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Duplicate { message } | MongoDaoError::Precondition { message } => {
                StorageError::Conflict { message }
            }
            MongoDaoError::Missing { message } => StorageError::NotFound { message },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
