// SPDX-License-Identifier: MIT

//! GPT/MBR volume discovery and read-only partition access.
//!
//! [`Volume::open`] locates the GUID Partition Table of a disk image or
//! block device, probing sector sizes and falling back to the backup
//! header when the primary copy is corrupt, then walks the legacy
//! MBR/EBR chain. Each discovered partition is exposed as a seekable,
//! cached, bounded byte stream through [`Partition`].
//!
//! The crate never writes to the underlying source.

#[macro_use]
mod macros;

pub mod errors;
/// Master Boot Record / Extended Boot Record decoding.
pub mod boot_record;
/// Raw GPT partition entries and the normalized catalog record.
pub mod entry;
/// Common GPT partition type GUIDs.
pub mod guids;
/// GPT partition table header decoding and validation.
pub mod header;
/// Per-partition buffered stream reader.
pub mod partition;
mod sector_cache;
/// Volume discovery orchestration and the partition catalog.
pub mod volume;

pub use partition::Partition;
pub use volume::Volume;

/// Smallest sector size probed during discovery.
pub const DEFAULT_SECTOR_SIZE: u64 = 512;
