use std::{
    fs::{self, File},
    io,
    os::fd::AsRawFd,
    path::Path,
};

use libc::{c_void, pread, pwrite};

use crate::storage::PageNumber;

pub trait FileOps {
    /// Creates file in filesystem at the given path.
    ///
    /// If file already exists it is truncated and if parent
    /// directories are not present they will be created as well.
    fn create(path: impl AsRef<Path>) -> io::Result<Self>
    where
        Self: Sized;


    /// Length of file in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Attempts to persist data on disk
    fn sync(&self) -> io::Result<()>;
}

impl FileOps for File {
    fn create(path: impl AsRef<Path>) -> io::Result<Self>
    where
        Self: Sized,
    {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        File::options()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn sync(&self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Positional I/O. Does not move any shared cursor so it is safe to call
/// from many threads through a shared reference.
pub trait IO {
    fn pread(&self, offset: usize, buf: &mut [u8]) -> io::Result<usize>;
    fn pwrite(&self, offset: usize, buf: &[u8]) -> io::Result<usize>;
}

impl IO for File {
    fn pread(&self, offset: usize, buf: &mut [u8]) -> io::Result<usize> {
        let read = unsafe {
            pread(
                self.as_raw_fd(),
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                offset as i64,
            )
        };
        if read == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(read as usize)
        }
    }

    fn pwrite(&self, offset: usize, buf: &[u8]) -> io::Result<usize> {
        let written = unsafe {
            pwrite(
                self.as_raw_fd(),
                buf.as_ptr() as *const c_void,
                buf.len(),
                offset as i64,
            )
        };
        if written == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(written as usize)
        }
    }
}

/// Wrapper to simplify working with page like structures on disk
#[derive(Debug)]
pub struct BlockIO<I> {
    io: I,
    pub page_size: usize,
}

impl<I> BlockIO<I> {
    pub fn new(io: I, page_size: usize) -> Self {
        Self { io, page_size }
    }

    pub fn inner(&self) -> &I {
        &self.io
    }

    fn offset(&self, page_number: PageNumber, offset: usize) -> usize {
        page_number as usize * self.page_size + offset
    }
}

impl<I: IO> BlockIO<I> {
    /// Fills the whole buffer starting at `offset`. Bytes past the end of the
    /// file are read as zeros.
    pub fn raw_read(&self, mut offset: usize, mut buffer: &mut [u8]) -> io::Result<()> {
        while !buffer.is_empty() {
            match self.io.pread(offset, buffer)? {
                0 => {
                    buffer.fill(0);
                    break;
                }
                n => {
                    buffer = &mut buffer[n..];
                    offset += n;
                }
            }
        }
        Ok(())
    }

    /// Reads bytes of page `page_number` starting at `offset` within the page.
    pub fn read(
        &self,
        page_number: PageNumber,
        offset: usize,
        buffer: &mut [u8],
    ) -> io::Result<()> {
        self.raw_read(self.offset(page_number, offset), buffer)
    }

    pub fn raw_write(&self, mut offset: usize, mut buffer: &[u8]) -> io::Result<()> {
        while !buffer.is_empty() {
            match self.io.pwrite(offset, buffer)? {
                0 => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                n => {
                    buffer = &buffer[n..];
                    offset += n;
                }
            }
        }
        Ok(())
    }

    /// Writes bytes into page `page_number` starting at `offset` within the page.
    pub fn write(&self, page_number: PageNumber, offset: usize, buffer: &[u8]) -> io::Result<()> {
        self.raw_write(self.offset(page_number, offset), buffer)
    }
}

impl<I: FileOps> BlockIO<I> {
    /// See [`FileOps::sync`] for details.
    pub fn sync(&self) -> io::Result<()> {
        self.io.sync()
    }

    /// Number of whole pages currently in the file.
    pub fn page_count(&self) -> io::Result<usize> {
        Ok(self.io.len()? as usize / self.page_size)
    }
}
