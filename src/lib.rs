pub mod concurrency;
pub mod database;
pub mod error;
pub mod os;
pub mod query;
pub mod storage;
pub mod types;
pub mod utils;
