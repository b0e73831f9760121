pub mod models;
pub mod quiz_store;
pub mod storage;
