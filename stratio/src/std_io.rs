// SPDX-License-Identifier: MIT

use std::fs::File;
use std::io::{Error, Read, Seek, SeekFrom};
use std::path::Path;

use crate::{IoError, IoResult, VolIO};

/// `VolIO` over any `Read + Seek`, typically a disk image file.
#[derive(Debug)]
pub struct StdVolIO<T: Read + Seek> {
    io: T,
    open: bool,
}

impl<T: Read + Seek> StdVolIO<T> {
    #[inline]
    pub fn new(io: T) -> Self {
        Self { io, open: true }
    }
}

impl StdVolIO<File> {
    /// Opens a file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> IoResult<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<T: Read + Seek> VolIO for StdVolIO<T> {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult {
        if !self.open {
            return Err(IoError::Closed);
        }
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.read_exact(buf)?;
        Ok(())
    }

    fn len(&mut self) -> IoResult<u64> {
        if !self.open {
            return Err(IoError::Closed);
        }
        let size = self.io.seek(SeekFrom::End(0))?;
        Ok(size)
    }

    #[inline]
    fn is_open(&self) -> bool {
        self.open
    }

    #[inline]
    fn close(&mut self) -> IoResult {
        self.open = false;
        Ok(())
    }
}

impl From<Error> for IoError {
    #[cold]
    #[inline(never)]
    fn from(e: Error) -> Self {
        // Leak the string to produce a 'static str. Acceptable for error mapping.
        let leaked_str: &'static str = Box::leak(e.to_string().into_boxed_str());
        IoError::Other(leaked_str)
    }
}
