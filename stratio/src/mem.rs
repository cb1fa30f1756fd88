// SPDX-License-Identifier: MIT

use crate::{IoError, IoResult, VolIO};

/// In-memory implementation of `VolIO`.
///
/// Owns its buffer so it can be boxed into a long-lived handle.
/// Useful for tests and synthetic disk images.
#[derive(Debug)]
pub struct MemVolIO {
    data: Vec<u8>,
    open: bool,
}

impl MemVolIO {
    #[inline]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, open: true }
    }

    #[inline]
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }

    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    fn check_bounds(&self, offset: u64, len: usize) -> IoResult {
        let end = offset.checked_add(len as u64).ok_or(IoError::OutOfBounds)?;
        if end > self.data.len() as u64 {
            return Err(IoError::OutOfBounds);
        }
        Ok(())
    }
}

impl VolIO for MemVolIO {
    #[inline(always)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult {
        if !self.open {
            return Err(IoError::Closed);
        }
        self.check_bounds(offset, buf.len())?;
        let src = &self.data[offset as usize..offset as usize + buf.len()];
        buf.copy_from_slice(src);
        Ok(())
    }

    #[inline]
    fn len(&mut self) -> IoResult<u64> {
        if !self.open {
            return Err(IoError::Closed);
        }
        Ok(self.data.len() as u64)
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn test_read() {
        let mut io = MemVolIO::new(vec![0u8; 256]);
        io.data[10..14].copy_from_slice(&[1, 2, 3, 4]);

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let mut io = MemVolIO::new(vec![0u8; 16]);
        let mut buf = [0u8; 8];
        assert_eq!(io.read_at(12, &mut buf), Err(IoError::OutOfBounds));
        assert_eq!(io.read_at(u64::MAX, &mut buf), Err(IoError::OutOfBounds));
    }

    #[test]
    fn test_len_and_close() {
        let mut io = MemVolIO::new(vec![0u8; 128]);
        assert_eq!(io.len().unwrap(), 128);
        assert!(io.is_open());

        io.close().unwrap();
        assert!(!io.is_open());
        let mut buf = [0u8; 1];
        assert_eq!(io.read_at(0, &mut buf), Err(IoError::Closed));
    }

    #[test]
    fn test_primitive_reads() {
        let mut data = vec![0u8; 32];
        data[0..2].copy_from_slice(&0xBEEFu16.to_le_bytes());
        data[8..16].copy_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        let mut io = MemVolIO::new(data);

        assert_eq!(io.read_u16_at(0).unwrap(), 0xBEEF);
        assert_eq!(io.read_u64_at(8).unwrap(), 0x1122_3344_5566_7788);
    }
}
