use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

use super::{Error, PAGE_SIZE, PageNumber, Result, page::Page};
use crate::{
    os::{Open, OpenOptions},
    utils::io::BlockIO,
};

/// Owns one paged file. The file is locked for exclusive access so only a
/// single allocator per file can exist at a time.
#[derive(Debug)]
pub struct PageAllocator {
    path: PathBuf,
    io: Arc<BlockIO<File>>,
    page_count: Mutex<u32>,
}

impl PageAllocator {
    /// Creates empty paged file at `path`, truncating any existing one.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::default()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .lock(true)
            .open(path)?;

        log::debug!("created paged file {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            io: Arc::new(BlockIO::new(file, PAGE_SIZE)),
            page_count: Mutex::new(0),
        })
    }

    /// Opens existing paged file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::default()
            .read(true)
            .write(true)
            .lock(true)
            .open(path)?;

        let io = BlockIO::new(file, PAGE_SIZE);
        let page_count = io.page_count()? as u32;

        log::debug!("opened paged file {} with {page_count} pages", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            io: Arc::new(io),
            page_count: Mutex::new(page_count),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends zero filled page and returns its number.
    pub fn allocate(&self) -> Result<PageNumber> {
        let mut count = self.page_count.lock();
        let number = *count;
        self.io.write(number, 0, &[0; PAGE_SIZE])?;
        *count += 1;

        log::trace!("allocated page {number} in {}", self.path.display());

        Ok(number)
    }

    pub fn fetch(&self, number: PageNumber) -> Result<Page> {
        let page_count = self.page_count();
        if number >= page_count {
            return Err(Error::PageOutOfRange {
                page: number,
                page_count,
            });
        }
        Ok(Page::new(number, Arc::clone(&self.io)))
    }

    pub fn page_count(&self) -> u32 {
        *self.page_count.lock()
    }

    pub fn sync(&self) -> Result<()> {
        self.io.sync()?;
        Ok(())
    }
}
