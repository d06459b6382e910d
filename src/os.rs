use std::{
    fs::{self, File},
    io,
    path::Path,
};

pub trait Open {
    fn open(self, path: impl AsRef<Path>) -> io::Result<File>;
}

pub struct OpenOptions {
    inner: fs::OpenOptions,
    lock: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            inner: File::options(),
            lock: false,
        }
    }
}

impl OpenOptions {
    /// Create if doesn't exists
    pub fn create(mut self, create: bool) -> Self {
        self.inner.create(create);
        self
    }

    /// Open for reading
    pub fn read(mut self, read: bool) -> Self {
        self.inner.read(read);
        self
    }

    /// Open for writing
    pub fn write(mut self, write: bool) -> Self {
        self.inner.write(write);
        self
    }

    /// Locks the file with exclusive access for the calling process.
    ///
    /// File won't actually be locked until [`Open::open`] is called.
    pub fn lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    /// Set length of file to 0 bytes if exists
    pub fn truncate(mut self, truncate: bool) -> Self {
        self.inner.truncate(truncate);
        self
    }
}

#[cfg(unix)]
mod unix {
    use std::{fs::File, io, os::fd::AsRawFd, path::Path};

    use super::{Open, OpenOptions};

    impl Open for OpenOptions {
        fn open(self, path: impl AsRef<Path>) -> io::Result<File> {
            let file = self.inner.open(&path)?;

            if self.lock {
                let lock = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

                if lock != 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        format!("could not lock file {}", path.as_ref().display()),
                    ));
                }
            }

            Ok(file)
        }
    }
}
