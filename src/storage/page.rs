use std::{fs::File, sync::Arc};

use super::{Error, PAGE_SIZE, PageNumber, Result};
use crate::utils::io::BlockIO;

/// Handle to one fixed size page of a file owned by a
/// [`PageAllocator`](super::allocator::PageAllocator).
///
/// Reads and writes go straight to the file with positional I/O, there is no
/// in memory copy of the page.
#[derive(Debug, Clone)]
pub struct Page {
    number: PageNumber,
    io: Arc<BlockIO<File>>,
}

impl Page {
    pub(super) fn new(number: PageNumber, io: Arc<BlockIO<File>>) -> Self {
        Self { number, io }
    }

    pub fn number(&self) -> PageNumber {
        self.number
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        let end = offset.saturating_add(len);
        if end > PAGE_SIZE {
            return Err(Error::RangeOutOfBounds {
                page: self.number,
                offset,
                end,
            });
        }
        Ok(())
    }

    pub fn read_into(&self, offset: usize, buffer: &mut [u8]) -> Result<()> {
        self.check_range(offset, buffer.len())?;
        self.io.read(self.number, offset, buffer)?;
        Ok(())
    }

    pub fn read(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0; len];
        self.read_into(offset, &mut buffer)?;
        Ok(buffer)
    }

    /// Reads the whole page.
    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.read(0, PAGE_SIZE)
    }

    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len())?;
        self.io.write(self.number, offset, bytes)?;
        Ok(())
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        let mut buf = [0; 1];
        self.read_into(offset, &mut buf)?;
        Ok(buf[0])
    }

    pub fn write_u8(&self, offset: usize, value: u8) -> Result<()> {
        self.write(offset, &[value])
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32> {
        let mut buf = [0; 4];
        self.read_into(offset, &mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    pub fn write_i32(&self, offset: usize, value: i32) -> Result<()> {
        self.write(offset, &value.to_be_bytes())
    }
}
