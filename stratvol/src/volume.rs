// SPDX-License-Identifier: MIT

//! Volume discovery: sector-size probing, GPT header validation with
//! backup fallback, partition entry ingestion and the MBR/EBR walk.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use stratio::prelude::*;

use crate::DEFAULT_SECTOR_SIZE;
use crate::boot_record::BootRecord;
use crate::entry::{ENTRY_DATA_SIZE, GptEntry, PartitionValues, decode_entry_name};
use crate::errors::*;
use crate::header::TableHeader;
use crate::partition::Partition;

/// Largest sector size the probe loop will try.
const MAXIMUM_SECTOR_SIZE: u64 = 4096;
/// Partition entry tables are capped at 32 sectors of data.
const MAXIMUM_ENTRIES_SECTORS: u64 = 32;
/// Bound on EBR chain length.
const MAXIMUM_RECURSION_DEPTH: usize = 256;

pub(crate) type SharedHandle = Arc<Mutex<Box<dyn VolIO + Send>>>;

struct VolumeInner {
    bytes_per_sector: u64,
    size: u64,
    header: Option<TableHeader>,
    partitions: Vec<Arc<PartitionValues>>,
    is_corrupt: bool,
    io: Option<SharedHandle>,
}

impl VolumeInner {
    fn empty() -> Self {
        Self {
            bytes_per_sector: DEFAULT_SECTOR_SIZE,
            size: 0,
            header: None,
            partitions: Vec::new(),
            is_corrupt: false,
            io: None,
        }
    }
}

/// A GPT/MBR volume opened over a backing store.
///
/// Opening discovers the partition catalog up front. Afterwards the
/// volume hands out [`Partition`] handles for byte-level access, any
/// number of which may be used from separate threads.
pub struct Volume {
    inner: RwLock<VolumeInner>,
    abort: AtomicBool,
}

impl Default for Volume {
    fn default() -> Self {
        Self::new()
    }
}

fn read_inner(lock: &RwLock<VolumeInner>) -> RwLockReadGuard<'_, VolumeInner> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_inner(lock: &RwLock<VolumeInner>) -> RwLockWriteGuard<'_, VolumeInner> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn lock_io(handle: &SharedHandle) -> MutexGuard<'_, Box<dyn VolIO + Send>> {
    match handle.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Volume {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(VolumeInner::empty()),
            abort: AtomicBool::new(false),
        }
    }

    /// Opens a volume image file and discovers its partitions.
    pub fn open<P: AsRef<Path>>(path: P) -> VolResult<Self> {
        let io = StdVolIO::open(path.as_ref()).map_err(|e| VolError::io(e, 0))?;
        Self::open_with_handle(Box::new(io))
    }

    /// Opens a volume over an arbitrary I/O handle and discovers its
    /// partitions.
    pub fn open_with_handle(io: Box<dyn VolIO + Send>) -> VolResult<Self> {
        let volume = Self::new();
        volume.open_handle(io)?;
        Ok(volume)
    }

    /// Attaches an I/O handle to a new or closed volume and discovers
    /// its partitions.
    ///
    /// The volume's write lock is held for the whole operation, so a
    /// concurrent second open fails with `Argument` and readers only
    /// ever observe a closed or fully discovered volume.
    pub fn open_handle(&self, io: Box<dyn VolIO + Send>) -> VolResult {
        let mut inner = write_inner(&self.inner);
        if inner.io.is_some() {
            return Err(VolError::Argument("volume: already open"));
        }
        let handle: SharedHandle = Arc::new(Mutex::new(io));
        let mut discovered = VolumeInner::empty();
        discovered.io = Some(Arc::clone(&handle));
        {
            let mut io = lock_io(&handle);
            self.open_read(&mut discovered, io.as_mut())?;
        }
        *inner = discovered;
        Ok(())
    }

    /// Releases the I/O handle and resets the volume to its initial
    /// state. Safe to call more than once.
    pub fn close(&self) -> VolResult {
        let io = {
            let mut inner = write_inner(&self.inner);
            let io = inner.io.take();
            *inner = VolumeInner::empty();
            io
        };
        self.abort.store(false, Ordering::Release);
        if let Some(handle) = io {
            let mut guard = lock_io(&handle);
            if guard.is_open() {
                guard.close().map_err(|e| VolError::io(e, 0))?;
            }
        }
        Ok(())
    }

    /// Requests an in-progress open to stop at the next check point.
    pub fn signal_abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    fn check_abort(&self) -> VolResult {
        if self.abort.load(Ordering::Acquire) {
            return Err(VolError::Aborted);
        }
        Ok(())
    }

    fn open_read(&self, inner: &mut VolumeInner, io: &mut dyn VolIO) -> VolResult {
        inner.size = io.len().map_err(|e| VolError::io(e, 0))?;

        self.read_partition_table_headers(inner, io)?;
        if inner.header.is_some() {
            self.read_partition_entries(inner, io)?;
        }

        let master = BootRecord::read_at(io, 0)?
            .ok_or(VolError::Invalid("MBR: missing boot record signature"))?;
        self.read_mbr_partition_entries(inner, io, &master, 0, true, &mut Vec::new(), 0)?;
        Ok(())
    }

    /// Probes sector sizes until a valid primary GPT header is found,
    /// then locates the backup copy and reconciles the two.
    fn read_partition_table_headers(
        &self,
        inner: &mut VolumeInner,
        io: &mut dyn VolIO,
    ) -> VolResult {
        let mut bytes_per_sector = DEFAULT_SECTOR_SIZE;
        let primary = loop {
            self.check_abort()?;
            match TableHeader::read_at(io, bytes_per_sector)? {
                Some(header) => break Some(header),
                None if bytes_per_sector < MAXIMUM_SECTOR_SIZE => bytes_per_sector *= 2,
                None => break None,
            }
        };

        let Some(primary) = primary else {
            // No GPT, the volume is plain MBR.
            inner.bytes_per_sector = DEFAULT_SECTOR_SIZE;
            return Ok(());
        };
        inner.bytes_per_sector = bytes_per_sector;

        if primary.header_block_number != 1 {
            return Err(VolError::Invalid("GPT: primary header not at block 1"));
        }

        let last_sector = inner.size.saturating_sub(bytes_per_sector);
        let backup_offset = if primary.backup_header_block_number != 0 {
            primary
                .backup_header_block_number
                .checked_mul(bytes_per_sector)
                .ok_or(VolError::Invalid("GPT: backup header block out of range"))?
        } else {
            last_sector
        };
        let mut backup = TableHeader::read_at(io, backup_offset)?;
        if backup.is_none() && backup_offset != last_sector {
            backup = TableHeader::read_at(io, last_sector)?;
        }
        // An unreadable backup fails the open; corruption is only
        // recoverable when the other copy is present to fall back on.
        let Some(backup) = backup else {
            return Err(VolError::Invalid("GPT: backup header not found"));
        };

        inner.header = match (primary.is_corrupt, backup.is_corrupt) {
            (true, true) => {
                return Err(VolError::Invalid(
                    "GPT: both primary and backup headers are corrupt",
                ));
            }
            (true, false) => {
                inner.is_corrupt = true;
                Some(backup)
            }
            (false, true) => {
                inner.is_corrupt = true;
                Some(primary)
            }
            (false, false) => {
                if !primary.matches_backup(&backup) {
                    inner.is_corrupt = true;
                }
                Some(primary)
            }
        };
        Ok(())
    }

    /// Reads the partition entry table the selected header points at
    /// and catalogs every non-empty in-range entry.
    fn read_partition_entries(&self, inner: &mut VolumeInner, io: &mut dyn VolIO) -> VolResult {
        let header = inner.header.as_ref().ok_or(VolError::NotFound)?;
        let bytes_per_sector = inner.bytes_per_sector;
        let total_sectors = inner.size / bytes_per_sector;

        let entry_size = header.entry_data_size as u64;
        if entry_size < ENTRY_DATA_SIZE as u64 {
            return Err(VolError::Unsupported("GPT: partition entry size too small"));
        }
        // The entry table cannot exceed its 32-sector reservation.
        let maximum_entries = (MAXIMUM_ENTRIES_SECTORS * bytes_per_sector) / entry_size;
        let number_of_entries = u64::from(header.number_of_entries);
        if number_of_entries > maximum_entries {
            return Err(VolError::Invalid("GPT: number of entries out of bounds"));
        }

        let table_offset = header
            .entries_start_block_number
            .checked_mul(bytes_per_sector)
            .filter(|&offset| offset < inner.size)
            .ok_or(VolError::Invalid("GPT: entries start block out of range"))?;
        let table_size = (number_of_entries * entry_size) as usize;
        let mut table = vec![0u8; table_size];
        io.read_at(table_offset, &mut table)
            .map_err(|e| VolError::io(e, table_offset))?;

        for index in 0..number_of_entries {
            self.check_abort()?;
            let start = (index * entry_size) as usize;
            let entry = GptEntry::read_data(&table[start..start + entry_size as usize])?;
            if entry.is_empty() {
                continue;
            }
            if entry.start_block_number < header.area_start_block_number
                || entry.start_block_number >= total_sectors
            {
                return Err(VolError::Invalid("GPT: partition start block out of range"));
            }
            if entry.end_block_number < entry.start_block_number
                || entry.end_block_number >= total_sectors
            {
                return Err(VolError::Invalid("GPT: partition end block out of range"));
            }

            inner.partitions.push(Arc::new(PartitionValues {
                entry_index: index as u32,
                type_identifier: entry.type_identifier,
                identifier: entry.identifier,
                part_type: 0,
                name: decode_entry_name(&entry.name),
                offset: entry.start_block_number * bytes_per_sector,
                size: (entry.end_block_number - entry.start_block_number + 1) * bytes_per_sector,
            }));
        }
        Ok(())
    }

    /// Walks one boot record, following at most one extended link per
    /// table and cataloging legacy entries when no GPT was found.
    #[allow(clippy::too_many_arguments)]
    fn read_mbr_partition_entries(
        &self,
        inner: &mut VolumeInner,
        io: &mut dyn VolIO,
        record: &BootRecord,
        file_offset: u64,
        is_master: bool,
        visited: &mut Vec<u64>,
        depth: usize,
    ) -> VolResult {
        if depth > MAXIMUM_RECURSION_DEPTH {
            return Err(VolError::Unsupported("MBR: extended record chain too deep"));
        }
        // Extended record links are relative to the first EBR, which
        // sits at the front of the visited list.
        let link_base = if is_master {
            0
        } else {
            visited.first().copied().unwrap_or(0)
        };
        let total_sectors = inner.size / inner.bytes_per_sector;

        let mut link_offset: Option<u64> = None;
        for (slot, entry) in record.entries.iter().enumerate() {
            self.check_abort()?;
            if entry.is_empty() {
                continue;
            }
            if entry.is_extended(is_master) {
                if link_offset.is_some() {
                    return Err(VolError::Unsupported(
                        "MBR: more than one extended partition entry",
                    ));
                }
                link_offset = Some(link_base + u64::from(entry.start_lba) * inner.bytes_per_sector);
                continue;
            }
            if inner.header.is_some() || entry.is_protective() {
                continue;
            }

            // Data entries in an EBR are addressed relative to the
            // record's own sector.
            let record_block = file_offset / inner.bytes_per_sector;
            let start = record_block + u64::from(entry.start_lba);
            let sectors = u64::from(entry.number_of_sectors);
            if start >= total_sectors || sectors == 0 || start + sectors > total_sectors {
                return Err(VolError::Invalid("MBR: partition extent out of range"));
            }
            inner.partitions.push(Arc::new(PartitionValues {
                entry_index: slot as u32,
                type_identifier: [0u8; 16],
                identifier: [0u8; 16],
                part_type: entry.part_type,
                name: String::new(),
                offset: start * inner.bytes_per_sector,
                size: sectors * inner.bytes_per_sector,
            }));
        }

        let Some(next_offset) = link_offset else {
            return Ok(());
        };
        if next_offset == 0 || next_offset == file_offset || visited.contains(&next_offset) {
            return Err(VolError::Unsupported("MBR: invalid extended record link"));
        }

        let Some((record, next_offset)) =
            self.read_boot_record_with_reprobe(inner, io, next_offset, is_master)?
        else {
            return Err(VolError::Invalid("MBR: missing extended boot record"));
        };
        visited.push(next_offset);
        self.read_mbr_partition_entries(inner, io, &record, next_offset, false, visited, depth + 1)
    }

    /// Reads an EBR sector, returning the record and the offset it was
    /// found at. On a miss at the master level the sector size may have
    /// been misjudged, so larger sizes are retried with the link offset
    /// rescaled.
    fn read_boot_record_with_reprobe(
        &self,
        inner: &mut VolumeInner,
        io: &mut dyn VolIO,
        mut offset: u64,
        is_master: bool,
    ) -> VolResult<Option<(BootRecord, u64)>> {
        loop {
            self.check_abort()?;
            let found = match BootRecord::read_at(io, offset) {
                Ok(found) => found,
                Err(VolError::Io { .. }) => None,
                Err(e) => return Err(e),
            };
            if let Some(record) = found {
                return Ok(Some((record, offset)));
            }
            if !is_master || inner.bytes_per_sector >= MAXIMUM_SECTOR_SIZE {
                return Ok(None);
            }
            let lba = offset / inner.bytes_per_sector;
            inner.bytes_per_sector *= 2;
            offset = lba * inner.bytes_per_sector;
        }
    }

    /// Sector size in bytes, as probed during open.
    pub fn bytes_per_sector(&self) -> VolResult<u64> {
        let inner = read_inner(&self.inner);
        require_open(&inner)?;
        Ok(inner.bytes_per_sector)
    }

    /// Size of the volume in bytes.
    pub fn size(&self) -> VolResult<u64> {
        let inner = read_inner(&self.inner);
        require_open(&inner)?;
        Ok(inner.size)
    }

    /// Disk GUID from the GPT header, `None` on plain MBR volumes.
    pub fn disk_identifier(&self) -> VolResult<Option<[u8; 16]>> {
        let inner = read_inner(&self.inner);
        require_open(&inner)?;
        Ok(inner.header.as_ref().map(|h| h.disk_identifier))
    }

    /// Whether recoverable corruption was observed during open.
    pub fn is_corrupt(&self) -> VolResult<bool> {
        let inner = read_inner(&self.inner);
        require_open(&inner)?;
        Ok(inner.is_corrupt)
    }

    pub fn number_of_partitions(&self) -> VolResult<usize> {
        let inner = read_inner(&self.inner);
        require_open(&inner)?;
        Ok(inner.partitions.len())
    }

    /// Partition handle by catalog position.
    pub fn get_partition_by_index(&self, index: usize) -> VolResult<Partition> {
        let inner = read_inner(&self.inner);
        require_open(&inner)?;
        let values = inner.partitions.get(index).ok_or(VolError::NotFound)?;
        let io = inner.io.as_ref().ok_or(VolError::NotFound)?;
        Ok(Partition::new(Arc::clone(values), Arc::clone(io)))
    }

    /// Partition handle by original entry index, `None` when no entry
    /// carries that index.
    pub fn get_partition_by_identifier(&self, entry_index: u32) -> VolResult<Option<Partition>> {
        let inner = read_inner(&self.inner);
        require_open(&inner)?;
        let Some(values) = inner
            .partitions
            .iter()
            .find(|v| v.entry_index == entry_index)
        else {
            return Ok(None);
        };
        let io = inner.io.as_ref().ok_or(VolError::NotFound)?;
        Ok(Some(Partition::new(Arc::clone(values), Arc::clone(io))))
    }

    pub fn has_partition_with_identifier(&self, entry_index: u32) -> VolResult<bool> {
        let inner = read_inner(&self.inner);
        require_open(&inner)?;
        Ok(inner.partitions.iter().any(|v| v.entry_index == entry_index))
    }
}

fn require_open(inner: &VolumeInner) -> VolResult {
    if inner.io.is_none() {
        return Err(VolError::Argument("volume: not open"));
    }
    Ok(())
}
