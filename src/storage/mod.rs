use thiserror::Error;

pub mod allocator;
pub mod btree;
pub mod file_system_manager;
pub mod heap;
pub mod page;
pub mod record;
pub mod schema;
pub mod stats;

pub type PageNumber = u32;
pub type TransactionId = u32;
pub type SlotNumber = u16;

pub const PAGE_SIZE: usize = 4096;
pub const PAGE_NUMBER_SIZE: usize = std::mem::size_of::<i32>();

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // page
    #[error("page {page} out of range, file has {page_count} pages")]
    PageOutOfRange { page: PageNumber, page_count: u32 },
    #[error("byte range {offset}..{end} outside of page {page}")]
    RangeOutOfBounds {
        page: PageNumber,
        offset: usize,
        end: usize,
    },

    // heap
    #[error("record does not match schema: {0}")]
    SchemaMismatch(String),
    #[error("invalid record id {0}")]
    InvalidRecordId(record::RecordId),
    #[error("record of {0} bytes does not fit 8 slots in a page")]
    RecordTooLarge(usize),
    #[error("corrupted header page: {0}")]
    CorruptHeader(String),

    // index
    #[error("page {page} is not a {expected} node")]
    CorruptIndexNode {
        page: PageNumber,
        expected: &'static str,
    },
    #[error("order {order} is invalid, must be between 1 and {max}")]
    InvalidOrder { order: usize, max: usize },
    #[error("key {key} does not match index key type {expected}")]
    KeyMismatch {
        key: crate::types::Value,
        expected: schema::DataType,
    },

    // utils
    #[error(transparent)]
    Utils(#[from] crate::utils::Error),

    // io
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for out of range page numbers or byte ranges.
    pub fn is_page_fault(&self) -> bool {
        matches!(
            self,
            Self::PageOutOfRange { .. } | Self::RangeOutOfBounds { .. }
        )
    }
}
