// SPDX-License-Identifier: MIT

//! Random-access byte-source abstraction for the strata ecosystem.
//!
//! A [`VolIO`] is anything that can serve exact positioned reads and
//! report its total size: a disk image file, a block device, a byte
//! buffer. Volume discovery code consumes the trait only; backends live
//! behind the `std` and `mem` features.

#[macro_use]
mod macros;

pub mod errors;

#[cfg(feature = "mem")]
mod mem;

#[cfg(feature = "std")]
mod std_io;

// Prelude re-exports (central entrypoint)
pub mod prelude {
    pub use super::VolIO;
    pub use super::VolIOExt;
    pub use super::VolIOStructExt;
    pub use super::errors::*;

    #[cfg(feature = "mem")]
    pub use super::mem::MemVolIO;

    #[cfg(feature = "std")]
    pub use super::std_io::StdVolIO;
}

use errors::*;

/// Maximum size of the internal scratch buffer used by struct reads.
/// 4 KiB covers every on-disk structure the partition engine decodes.
pub const BLOCK_BUF_SIZE: usize = 4096;

/// Positioned read abstraction over a disk image or block device.
///
/// Reads are exact: a short read is an error, never a partial fill.
/// Implementations are not required to be thread-safe; callers that
/// share a handle serialize access themselves.
pub trait VolIO {
    /// Reads `buf.len()` bytes into `buf` from `offset` (absolute).
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> IoResult;

    /// Returns the total size of the underlying source in bytes.
    fn len(&mut self) -> IoResult<u64>;

    /// Returns whether the source is open for reading.
    fn is_open(&self) -> bool;

    /// Closes the source. Further reads fail with [`IoError::Closed`].
    fn close(&mut self) -> IoResult;
}

/// Extension helpers for `VolIO`: little-endian primitive reads.
pub trait VolIOExt: VolIO {
    // Implements read helpers for primitive types (u16, u32, u64, u128)
    volio_impl_primitive_reads!(u16, u32, u64, u128);
}

impl<T: VolIO + ?Sized> VolIOExt for T {}

/// Extension trait for reading on-disk structs using zerocopy.
pub trait VolIOStructExt: VolIO {
    /// Reads a struct of type `T` from the given offset.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
    ) -> IoResult<T> {
        let size = core::mem::size_of::<T>();
        assert!(size <= BLOCK_BUF_SIZE, "read_struct: type too large");
        let mut buf = [0u8; BLOCK_BUF_SIZE];
        self.read_at(offset, &mut buf[..size])?;
        T::read_from_bytes(&buf[..size]).map_err(|_| IoError::Other("read_struct failed"))
    }
}

impl<T: VolIO + ?Sized> VolIOStructExt for T {}
