//! Table level locking.
//!
//! Every table has one [`Lock`] with shared and exclusive modes. Before a
//! transaction blocks on a lock it records who it waits for in the
//! [`WaitsForGraph`], a request that would close a cycle fails with
//! [`Error::Deadlock`] instead of blocking.

use std::fmt;

use thiserror::Error;

use crate::storage::TransactionId;

pub mod lock;
pub mod manager;
pub mod waits_for;

pub use lock::Lock;
pub use manager::LockManager;
pub use waits_for::WaitsForGraph;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transaction {txn} would deadlock waiting for {mode} lock on {resource}")]
    Deadlock {
        txn: TransactionId,
        mode: LockMode,
        resource: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shared => "shared",
            Self::Exclusive => "exclusive",
        })
    }
}
