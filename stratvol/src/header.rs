// SPDX-License-Identifier: MIT

use stratio::prelude::*;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::*;

pub const HEADER_SIGNATURE: &[u8; 8] = b"EFI PART";
/// A header always occupies one full 512-byte read.
pub const HEADER_DATA_SIZE: usize = 512;
/// Size of the fixed portion of the header, revision 1.0.
pub const MINIMUM_HEADER_DATA_SIZE: usize = 92;

pub const FORMAT_MAJOR_VERSION: u16 = 1;
pub const FORMAT_MINOR_VERSION: u16 = 0;

/// On-disk layout of the fixed portion of a GPT header, little-endian.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
struct TableHeaderRaw {
    signature: [u8; 8],
    minor_format_version: u16,
    major_format_version: u16,
    header_data_size: u32,
    header_data_checksum: u32,
    reserved: u32,
    header_block_number: u64,
    backup_header_block_number: u64,
    area_start_block_number: u64,
    area_end_block_number: u64,
    disk_identifier: [u8; 16],
    entries_start_block_number: u64,
    number_of_entries: u32,
    entry_data_size: u32,
    entries_data_checksum: u32,
}

/// One decoded copy (primary or backup) of the GPT header.
///
/// A checksum or format version mismatch does not fail the decode; it
/// sets [`is_corrupt`](Self::is_corrupt) so the caller can fall back to
/// the other copy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TableHeader {
    pub major_format_version: u16,
    pub minor_format_version: u16,
    pub header_data_size: u32,
    pub header_data_checksum: u32,
    pub header_block_number: u64,
    pub backup_header_block_number: u64,
    pub area_start_block_number: u64,
    pub area_end_block_number: u64,
    pub disk_identifier: [u8; 16],
    pub entries_start_block_number: u64,
    pub number_of_entries: u32,
    pub entry_data_size: u32,
    pub entries_data_checksum: u32,
    pub is_corrupt: bool,
}

/// CRC-32 of the header with the checksum field taken as zero:
/// bytes `[0, 16)`, four zero bytes, then `[20, header_size)`.
fn compute_checksum(data: &[u8], header_size: usize) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data[..16]);
    hasher.update(&[0u8; 4]);
    hasher.update(&data[20..header_size]);
    hasher.finalize()
}

impl TableHeader {
    /// Decodes a header from one 512-byte sector.
    ///
    /// Returns `Ok(None)` if the signature does not match; callers use
    /// this to probe candidate sector sizes.
    pub fn read_data(data: &[u8]) -> VolResult<Option<Self>> {
        if data.len() < HEADER_DATA_SIZE {
            return Err(VolError::Argument("GPT: header data too small"));
        }
        if &data[..8] != HEADER_SIGNATURE {
            return Ok(None);
        }
        let raw = TableHeaderRaw::read_from_bytes(&data[..MINIMUM_HEADER_DATA_SIZE])
            .map_err(|_| VolError::Invalid("GPT: unable to decode header"))?;

        let header_data_size = u32::from_le(raw.header_data_size);
        if header_data_size < MINIMUM_HEADER_DATA_SIZE as u32
            || header_data_size > HEADER_DATA_SIZE as u32
        {
            return Err(VolError::Invalid("GPT: header size value out of bounds"));
        }
        let mut header = Self {
            major_format_version: u16::from_le(raw.major_format_version),
            minor_format_version: u16::from_le(raw.minor_format_version),
            header_data_size,
            header_data_checksum: u32::from_le(raw.header_data_checksum),
            header_block_number: u64::from_le(raw.header_block_number),
            backup_header_block_number: u64::from_le(raw.backup_header_block_number),
            area_start_block_number: u64::from_le(raw.area_start_block_number),
            area_end_block_number: u64::from_le(raw.area_end_block_number),
            disk_identifier: raw.disk_identifier,
            entries_start_block_number: u64::from_le(raw.entries_start_block_number),
            number_of_entries: u32::from_le(raw.number_of_entries),
            entry_data_size: u32::from_le(raw.entry_data_size),
            entries_data_checksum: u32::from_le(raw.entries_data_checksum),
            is_corrupt: false,
        };
        let computed = compute_checksum(data, header_data_size as usize);
        if header.header_data_checksum != 0 && header.header_data_checksum != computed {
            header.is_corrupt = true;
        }
        if header.major_format_version != FORMAT_MAJOR_VERSION
            || header.minor_format_version != FORMAT_MINOR_VERSION
        {
            header.is_corrupt = true;
        }
        Ok(Some(header))
    }

    /// Reads one 512-byte sector at `offset` and decodes it.
    pub fn read_at(io: &mut dyn VolIO, offset: u64) -> VolResult<Option<Self>> {
        let mut data = [0u8; HEADER_DATA_SIZE];
        io.read_at(offset, &mut data)
            .map_err(|e| VolError::io(e, offset))?;
        Self::read_data(&data)
    }

    #[inline]
    pub fn disk_identifier(&self) -> [u8; 16] {
        self.disk_identifier
    }

    /// Cross-checks a primary header against the backup copy. The two
    /// block number fields are mirrored between the copies; the other
    /// shared fields must match exactly.
    pub fn matches_backup(&self, backup: &TableHeader) -> bool {
        self.header_block_number == backup.backup_header_block_number
            && self.backup_header_block_number == backup.header_block_number
            && self.area_start_block_number == backup.area_start_block_number
            && self.area_end_block_number == backup.area_end_block_number
            && self.disk_identifier == backup.disk_identifier
            && self.number_of_entries == backup.number_of_entries
            && self.entry_data_size == backup.entry_data_size
            && self.entries_data_checksum == backup.entries_data_checksum
    }

    /// Re-encodes the decoded fields into a 512-byte sector.
    ///
    /// The reserved field and the sector tail are written as zeros; the
    /// stored checksum is emitted as read, not recomputed.
    pub fn encode(&self) -> [u8; HEADER_DATA_SIZE] {
        let raw = TableHeaderRaw {
            signature: *HEADER_SIGNATURE,
            minor_format_version: self.minor_format_version.to_le(),
            major_format_version: self.major_format_version.to_le(),
            header_data_size: self.header_data_size.to_le(),
            header_data_checksum: self.header_data_checksum.to_le(),
            reserved: 0,
            header_block_number: self.header_block_number.to_le(),
            backup_header_block_number: self.backup_header_block_number.to_le(),
            area_start_block_number: self.area_start_block_number.to_le(),
            area_end_block_number: self.area_end_block_number.to_le(),
            disk_identifier: self.disk_identifier,
            entries_start_block_number: self.entries_start_block_number.to_le(),
            number_of_entries: self.number_of_entries.to_le(),
            entry_data_size: self.entry_data_size.to_le(),
            entries_data_checksum: self.entries_data_checksum.to_le(),
        };
        let mut data = [0u8; HEADER_DATA_SIZE];
        data[..MINIMUM_HEADER_DATA_SIZE].copy_from_slice(raw.as_bytes());
        data
    }
}
