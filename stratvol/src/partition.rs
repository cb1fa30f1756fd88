// SPDX-License-Identifier: MIT

//! Stream-style read access to a single partition's byte extent.

use std::io::SeekFrom;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use crate::entry::PartitionValues;
use crate::errors::*;
use crate::sector_cache::{CACHE_ELEMENT_SIZE, SECTOR_CACHE_SIZE, SectorCache, SectorData};
use crate::volume::SharedHandle;

struct PartitionState {
    current_offset: u64,
    cache: SectorCache,
}

/// A handle onto one partition of an opened [`Volume`](crate::Volume).
///
/// Each handle carries its own stream position and sector cache, so
/// separate handles can read concurrently without interfering. Reads
/// past the partition end return 0 bytes.
pub struct Partition {
    values: Arc<PartitionValues>,
    io: SharedHandle,
    state: RwLock<PartitionState>,
}

fn write_state(lock: &RwLock<PartitionState>) -> RwLockWriteGuard<'_, PartitionState> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Partition {
    pub(crate) fn new(values: Arc<PartitionValues>, io: SharedHandle) -> Self {
        Self {
            values,
            io,
            state: RwLock::new(PartitionState {
                current_offset: 0,
                cache: SectorCache::new(SECTOR_CACHE_SIZE),
            }),
        }
    }

    /// Index of the catalog entry this handle was created from.
    pub fn entry_index(&self) -> u32 {
        self.values.entry_index
    }

    /// Partition GUID, all zeros for legacy MBR partitions.
    pub fn identifier(&self) -> [u8; 16] {
        self.values.identifier
    }

    /// Partition type GUID, all zeros for legacy MBR partitions.
    pub fn type_identifier(&self) -> [u8; 16] {
        self.values.type_identifier
    }

    /// Legacy MBR partition type byte, 0 for GPT partitions.
    pub fn part_type(&self) -> u8 {
        self.values.part_type
    }

    /// Decoded UTF-16 entry name, empty for legacy MBR partitions.
    pub fn name(&self) -> &str {
        &self.values.name
    }

    /// Byte offset of the partition within the volume.
    pub fn volume_offset(&self) -> u64 {
        self.values.offset
    }

    /// Size of the partition in bytes.
    pub fn size(&self) -> u64 {
        self.values.size
    }

    fn read_locked(&self, state: &mut PartitionState, buf: &mut [u8]) -> VolResult<usize> {
        let size = self.values.size;
        if state.current_offset >= size {
            return Ok(0);
        }
        let remaining = size - state.current_offset;
        let count = (buf.len() as u64).min(remaining) as usize;

        let mut copied = 0usize;
        while copied < count {
            let offset = state.current_offset;
            let element = CACHE_ELEMENT_SIZE as u64;
            let sector_index = offset / element;
            let sector_start = sector_index * element;
            let in_sector = (offset - sector_start) as usize;

            let io = &self.io;
            let values = &self.values;
            let sector = state.cache.get_or_insert_with(sector_index, || {
                let length = element.min(size - sector_start) as usize;
                let mut data = vec![0u8; length];
                let volume_offset = values.offset + sector_start;
                let mut guard = match io.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard
                    .read_at(volume_offset, &mut data)
                    .map_err(|e| VolError::io(e, volume_offset))?;
                Ok(SectorData { data })
            })?;

            let available = sector.data.len() - in_sector;
            let chunk = available.min(count - copied);
            buf[copied..copied + chunk].copy_from_slice(&sector.data[in_sector..in_sector + chunk]);
            copied += chunk;
            state.current_offset += chunk as u64;
        }
        Ok(copied)
    }

    /// Reads from the current stream position, advancing it by the
    /// number of bytes read. Reads are clipped at the partition end.
    pub fn read_buffer(&self, buf: &mut [u8]) -> VolResult<usize> {
        let mut state = write_state(&self.state);
        self.read_locked(&mut state, buf)
    }

    /// Seeks to `offset` then reads, as one atomic operation.
    pub fn read_buffer_at_offset(&self, buf: &mut [u8], offset: u64) -> VolResult<usize> {
        let mut state = write_state(&self.state);
        state.current_offset = offset;
        self.read_locked(&mut state, buf)
    }

    /// Moves the stream position. Seeking beyond the partition end is
    /// allowed; a resolved position before byte 0 is an error.
    pub fn seek_offset(&self, pos: SeekFrom) -> VolResult<u64> {
        let mut state = write_state(&self.state);
        let base = match pos {
            SeekFrom::Start(offset) => return Ok(set_offset(&mut state, offset)),
            SeekFrom::Current(delta) => (state.current_offset, delta),
            SeekFrom::End(delta) => (self.values.size, delta),
        };
        let (origin, delta) = base;
        let resolved = if delta < 0 {
            origin.checked_sub(delta.unsigned_abs())
        } else {
            origin.checked_add(delta as u64)
        };
        match resolved {
            Some(offset) => Ok(set_offset(&mut state, offset)),
            None => Err(VolError::Argument("partition: seek before start")),
        }
    }

    /// Current stream position.
    pub fn tell(&self) -> VolResult<u64> {
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(state.current_offset)
    }
}

fn set_offset(state: &mut PartitionState, offset: u64) -> u64 {
    state.current_offset = offset;
    offset
}
