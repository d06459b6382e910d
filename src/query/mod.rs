//! Pull based query operators.
//!
//! Every operator exposes its output [`Schema`], estimated [`TableStats`] and
//! a lazy record stream. Joins pull from two child operators and may nest.

use std::sync::Arc;

use thiserror::Error;

use crate::storage::{
    self, heap::Table, record::Record, schema::Schema, stats::TableStats,
};

pub mod bnlj;
pub mod grace_hash;
pub mod join;
pub mod pnlj;
pub mod scan;

pub use bnlj::BlockNestedLoopJoin;
pub use grace_hash::GraceHashJoin;
pub use join::JoinKind;
pub use pnlj::PageNestedLoopJoin;
pub use scan::SequentialScan;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("column {0} not found")]
    ColumnNotFound(String),
    #[error("cannot join column {left} of type {left_type} with column {right} of type {right_type}")]
    ColumnTypeMismatch {
        left: String,
        left_type: storage::schema::DataType,
        right: String,
        right_type: storage::schema::DataType,
    },
    #[error("{join} join needs at least {required} memory pages, transaction has {available}")]
    InsufficientMemory {
        join: JoinKind,
        required: usize,
        available: usize,
    },

    #[error(transparent)]
    Storage(#[from] storage::Error),
}

/// Lazy, finite stream of records.
pub type RecordStream<'a> = Box<dyn Iterator<Item = Record> + 'a>;

/// What operators need from the transaction that runs them.
pub trait Transaction {
    /// Number of pages the operator may keep in memory at once.
    fn num_memory_pages(&self) -> usize;

    /// Creates an empty table that lives until the transaction ends. The name
    /// starts with `prefix` and is unique within the transaction.
    fn create_temp_table(&self, schema: Schema, prefix: &str) -> storage::Result<Arc<Table>>;
}

pub trait QueryOperator {
    fn output_schema(&self) -> &Schema;

    fn stats(&self) -> TableStats;

    /// Estimated number of page reads and writes to produce the output.
    fn estimate_io_cost(&self) -> usize;

    /// True when the operator is a plain pass over [`Self::source_table`], so
    /// consumers may read that table page by page instead of the stream.
    fn is_sequential_scan(&self) -> bool {
        false
    }

    fn source_table(&self) -> Option<&Arc<Table>> {
        None
    }

    fn iter(&self) -> Result<RecordStream<'_>>;
}

/// Unwraps storage results, logging the first error and ending the stream
/// there.
pub(crate) fn until_error<'a, T: 'a>(
    context: &'a str,
    iter: impl Iterator<Item = storage::Result<T>> + 'a,
) -> impl Iterator<Item = T> + 'a {
    iter.map_while(move |item| {
        item.map_err(|err| log::error!("{context}: stopping after storage error: {err}"))
            .ok()
    })
}
