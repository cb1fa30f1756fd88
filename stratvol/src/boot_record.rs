// SPDX-License-Identifier: MIT

use stratio::prelude::*;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::*;

/// An MBR or EBR always occupies one full 512-byte read.
pub const BOOT_RECORD_SIZE: usize = 512;
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

pub const MBR_TYPE_EMPTY: u8 = 0x00;
/// Extended partition, CHS addressing.
pub const MBR_TYPE_EXTENDED: u8 = 0x05;
/// Windows-style extended partition, LBA addressing. Only honored in
/// the top-level MBR.
pub const MBR_TYPE_EXTENDED_LBA: u8 = 0x0F;
/// Protective entry shielding a GPT.
pub const MBR_TYPE_PROTECTIVE_GPT: u8 = 0xEE;

/// On-disk layout of one 16-byte MBR partition entry.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
struct MbrEntryRaw {
    boot_flag: u8,
    start_chs: [u8; 3],
    part_type: u8,
    end_chs: [u8; 3],
    start_lba: u32,
    number_of_sectors: u32,
}

/// On-disk layout of a 512-byte boot record.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
struct BootRecordRaw {
    boot_code: [u8; 440],
    disk_signature: u32,
    unknown: [u8; 2],
    entries: [MbrEntryRaw; 4],
    signature: [u8; 2],
}

/// A cylinder/head/sector triple unpacked from its 3-byte on-disk form.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChsAddress {
    /// 10-bit cylinder number (0-1023).
    pub cylinder: u16,
    pub head: u8,
    /// 6-bit sector number, 1-based on real addresses.
    pub sector: u8,
}

impl ChsAddress {
    /// Layout: head, sector in the low 6 bits of the second byte with
    /// the cylinder high bits in the top 2, cylinder low byte last.
    pub fn from_packed(data: [u8; 3]) -> Self {
        Self {
            head: data[0],
            sector: data[1] & 0x3F,
            cylinder: (u16::from(data[1] & 0xC0) << 2) | u16::from(data[2]),
        }
    }
}

/// One decoded legacy partition slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MbrEntry {
    pub boot_flag: u8,
    pub start_chs: ChsAddress,
    pub part_type: u8,
    pub end_chs: ChsAddress,
    pub start_lba: u32,
    pub number_of_sectors: u32,
}

impl MbrEntry {
    fn from_raw(raw: &MbrEntryRaw) -> Self {
        Self {
            boot_flag: raw.boot_flag,
            start_chs: ChsAddress::from_packed(raw.start_chs),
            part_type: raw.part_type,
            end_chs: ChsAddress::from_packed(raw.end_chs),
            start_lba: u32::from_le(raw.start_lba),
            number_of_sectors: u32::from_le(raw.number_of_sectors),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.part_type == MBR_TYPE_EMPTY
    }

    #[inline]
    pub fn is_protective(&self) -> bool {
        self.part_type == MBR_TYPE_PROTECTIVE_GPT
    }

    /// `0x05` links from any table; `0x0F` only from the master record.
    #[inline]
    pub fn is_extended(&self, is_master_boot_record: bool) -> bool {
        self.part_type == MBR_TYPE_EXTENDED
            || (is_master_boot_record && self.part_type == MBR_TYPE_EXTENDED_LBA)
    }

    #[inline]
    pub fn is_boot_flag_valid(&self) -> bool {
        self.boot_flag == 0x00 || self.boot_flag == 0x80
    }
}

/// One decoded 512-byte MBR or EBR.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BootRecord {
    pub disk_signature: u32,
    pub entries: [MbrEntry; 4],
}

impl BootRecord {
    fn from_raw(raw: &BootRecordRaw) -> Option<Self> {
        if raw.signature != BOOT_SIGNATURE {
            return None;
        }
        let raw_entries = raw.entries;
        Some(Self {
            disk_signature: u32::from_le(raw.disk_signature),
            entries: raw_entries.map(|e| MbrEntry::from_raw(&e)),
        })
    }

    /// Decodes one 512-byte sector. Returns `Ok(None)` if the `0x55AA`
    /// signature is missing; callers use this to probe sector sizes
    /// around EBR links.
    pub fn read_data(data: &[u8]) -> VolResult<Option<Self>> {
        if data.len() < BOOT_RECORD_SIZE {
            return Err(VolError::Argument("MBR: boot record data too small"));
        }
        let raw = BootRecordRaw::read_from_bytes(&data[..BOOT_RECORD_SIZE])
            .map_err(|_| VolError::Invalid("MBR: unable to decode boot record"))?;
        Ok(Self::from_raw(&raw))
    }

    /// Reads one 512-byte sector at `offset` and decodes it.
    pub fn read_at(io: &mut dyn VolIO, offset: u64) -> VolResult<Option<Self>> {
        let raw: BootRecordRaw = io
            .read_struct(offset)
            .map_err(|e| VolError::io(e, offset))?;
        Ok(Self::from_raw(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn record_sector(entries: &[(u8, u8, u32, u32)]) -> [u8; BOOT_RECORD_SIZE] {
        let mut data = [0u8; BOOT_RECORD_SIZE];
        data[440..444].copy_from_slice(&0x5AB0_97C4u32.to_le_bytes());
        for (slot, &(boot_flag, part_type, start_lba, sectors)) in entries.iter().enumerate() {
            let off = 446 + slot * 16;
            data[off] = boot_flag;
            data[off + 1..off + 4].copy_from_slice(&[0xFE, 0xFF, 0xFF]);
            data[off + 4] = part_type;
            data[off + 5..off + 8].copy_from_slice(&[0xFE, 0xFF, 0xFF]);
            data[off + 8..off + 12].copy_from_slice(&start_lba.to_le_bytes());
            data[off + 12..off + 16].copy_from_slice(&sectors.to_le_bytes());
        }
        data[510] = 0x55;
        data[511] = 0xAA;
        data
    }

    #[test]
    fn decode_master_boot_record() {
        let data = record_sector(&[(0x80, 0x83, 2048, 4096), (0x00, 0x05, 8192, 1024)]);
        let record = BootRecord::read_data(&data).unwrap().unwrap();

        assert_eq!(record.disk_signature, 0x5AB0_97C4);
        assert_eq!(record.entries[0].part_type, 0x83);
        assert_eq!(record.entries[0].boot_flag, 0x80);
        assert!(record.entries[0].is_boot_flag_valid());
        assert_eq!(record.entries[0].start_lba, 2048);
        assert_eq!(record.entries[0].number_of_sectors, 4096);
        assert!(record.entries[1].is_extended(false));
        assert!(record.entries[2].is_empty());
    }

    #[test]
    fn missing_signature_is_no_match() {
        let mut data = record_sector(&[(0x00, 0x83, 2048, 4096)]);
        data[510] = 0;
        assert!(BootRecord::read_data(&data).unwrap().is_none());
    }

    #[test]
    fn extended_lba_only_links_from_master() {
        let data = record_sector(&[(0x00, 0x0F, 2048, 4096)]);
        let record = BootRecord::read_data(&data).unwrap().unwrap();
        assert!(record.entries[0].is_extended(true));
        assert!(!record.entries[0].is_extended(false));
    }

    #[test]
    fn chs_unpacking() {
        // head 254, sector 63, cylinder 1023
        let chs = ChsAddress::from_packed([0xFE, 0xFF, 0xFF]);
        assert_eq!(chs.head, 254);
        assert_eq!(chs.sector, 63);
        assert_eq!(chs.cylinder, 1023);

        // head 1, sector 1, cylinder 0
        let chs = ChsAddress::from_packed([0x01, 0x01, 0x00]);
        assert_eq!(chs.head, 1);
        assert_eq!(chs.sector, 1);
        assert_eq!(chs.cylinder, 0);
    }

    #[test]
    fn read_at_through_io() {
        let mut image = vec![0u8; 1024];
        image[..512].copy_from_slice(&record_sector(&[(0x00, 0xEE, 1, 0xFFFF)]));
        let mut io = MemVolIO::new(image);

        let record = BootRecord::read_at(&mut io, 0).unwrap().unwrap();
        assert!(record.entries[0].is_protective());
        assert!(BootRecord::read_at(&mut io, 512).unwrap().is_none());
    }
}
