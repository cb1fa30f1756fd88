// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::*;

/// Minimum (and common) on-disk size of one GPT partition entry. The
/// header may declare a larger size; only the first 128 bytes carry
/// defined fields.
pub const ENTRY_DATA_SIZE: usize = 128;

/// On-disk layout of a GPT partition entry, little-endian.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
struct GptEntryRaw {
    type_identifier: [u8; 16],
    identifier: [u8; 16],
    start_block_number: u64,
    end_block_number: u64,
    attribute_flags: u64,
    name: [u16; 36],
}

/// One decoded GPT partition entry slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GptEntry {
    pub type_identifier: [u8; 16],
    pub identifier: [u8; 16],
    pub start_block_number: u64,
    pub end_block_number: u64,
    pub attribute_flags: u64,
    pub name: [u16; 36],
}

impl GptEntry {
    /// Decodes one entry slot. `data` must hold at least 128 bytes;
    /// trailing vendor bytes of oversized entries are ignored.
    pub fn read_data(data: &[u8]) -> VolResult<Self> {
        if data.len() < ENTRY_DATA_SIZE {
            return Err(VolError::Argument("GPT: entry data too small"));
        }
        let raw = GptEntryRaw::read_from_bytes(&data[..ENTRY_DATA_SIZE])
            .map_err(|_| VolError::Invalid("GPT: unable to decode partition entry"))?;

        let mut name = raw.name;
        for unit in name.iter_mut() {
            *unit = u16::from_le(*unit);
        }
        Ok(Self {
            type_identifier: raw.type_identifier,
            identifier: raw.identifier,
            start_block_number: u64::from_le(raw.start_block_number),
            end_block_number: u64::from_le(raw.end_block_number),
            attribute_flags: u64::from_le(raw.attribute_flags),
            name,
        })
    }

    /// An all-zero type identifier marks an unused slot.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.type_identifier.iter().all(|&b| b == 0)
    }
}

/// Decodes a GPT name (UTF-16LE, 36 units) into a `String`.
/// Stops at the first 0, replaces invalid code points.
pub fn decode_entry_name(name: &[u16; 36]) -> String {
    let end = name.iter().position(|&c| c == 0).unwrap_or(36);
    String::from_utf16_lossy(&name[..end])
}

/// Normalized, volume-relative catalog record for one discovered
/// partition, GPT or legacy MBR.
///
/// `entry_index` is the slot index in the table that produced the
/// record; `part_type` is 0 for GPT partitions and both GUIDs are zero
/// for legacy ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionValues {
    pub entry_index: u32,
    pub type_identifier: [u8; 16],
    pub identifier: [u8; 16],
    pub part_type: u8,
    pub name: String,
    /// Byte offset of the partition from the start of the volume.
    pub offset: u64,
    /// Size of the partition in bytes.
    pub size: u64,
}
