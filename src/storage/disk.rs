use anyhow::{Context, Result, anyhow};
use geo_types::Geometry;
use geozero::wkb::Wkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};
use memmap2::MmapMut;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::GeometryIndex;
use crate::model::Tier;

// 24 bytes per slot: id (i64), heap offset (u64), heap length (u32), state (u32)
const SLOT_SIZE: usize = 24;
const STATE_EMPTY: u32 = 0;
const STATE_WANTED: u32 = 1;
const STATE_RESOLVED: u32 = 2;

const INITIAL_SLOTS: usize = 1 << 12;
const INITIAL_HEAP_BYTES: usize = 1 << 16;
// Grow the slot table before it is more than 70% occupied
const MAX_LOAD_NUMERATOR: usize = 7;
const MAX_LOAD_DENOMINATOR: usize = 10;

/// Disk-backed index: an open-addressing slot table and an append-only WKB
/// heap, each in a memory-mapped temp file. Both files grow by doubling and
/// are deleted when the index is dropped. Nothing is ever evicted; an
/// overwritten geometry leaves its old bytes unreachable in the heap until
/// `clear`.
pub struct DiskIndex {
    tier: Tier,
    tmp_dir: Option<PathBuf>,
    slots: MappedFile,
    capacity: usize,
    len: usize,
    heap: MappedFile,
    heap_used: usize,
}

/// A temp file and its writable mapping.
struct MappedFile {
    mmap: MmapMut,
    /// Deleted on drop
    file: NamedTempFile,
}

impl MappedFile {
    fn create(tier: Tier, kind: &str, tmp_dir: Option<&Path>, size: usize) -> Result<Self> {
        let prefix = format!("osmsift-{tier}-{kind}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let file = match tmp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .with_context(|| format!("Index: Failed to create {tier} {kind} file"))?;

        file.as_file()
            .set_len(size as u64)
            .with_context(|| format!("Index: Failed to size {tier} {kind} file"))?;

        // SAFETY: The file handle is exclusively owned by this struct.
        // The mmap remains valid as long as the file exists (guaranteed by NamedTempFile).
        // No other process accesses this file and the index is only mutated
        // from the thread driving the current pass.
        let mmap = unsafe {
            MmapMut::map_mut(file.as_file())
                .with_context(|| format!("Index: Failed to map {tier} {kind} file"))?
        };
        Ok(Self { mmap, file })
    }

    fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Extend the file to `size` bytes and remap it, keeping the contents.
    fn grow(&mut self, size: usize) -> Result<()> {
        self.mmap
            .flush_async()
            .context("Index: Failed to flush mapping before growing")?;
        self.file
            .as_file()
            .set_len(size as u64)
            .context("Index: Failed to extend index file")?;
        // SAFETY: see `create`; the previous mapping is replaced and dropped here.
        self.mmap = unsafe {
            MmapMut::map_mut(self.file.as_file()).context("Index: Failed to remap index file")?
        };
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    id: i64,
    offset: u64,
    len: u32,
    state: u32,
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn decode_slot(data: &[u8]) -> Slot {
    Slot {
        id: read_u64(data, 0) as i64,
        offset: read_u64(data, 8),
        len: read_u32(data, 16),
        state: read_u32(data, 20),
    }
}

fn encode_slot(data: &mut [u8], slot: Slot) {
    data[0..8].copy_from_slice(&slot.id.to_le_bytes());
    data[8..16].copy_from_slice(&slot.offset.to_le_bytes());
    data[16..20].copy_from_slice(&slot.len.to_le_bytes());
    data[20..24].copy_from_slice(&slot.state.to_le_bytes());
}

/// Fibonacci hashing of the id onto a power-of-two table.
fn home_slot(id: i64, capacity: usize) -> usize {
    let hashed = (id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    ((hashed ^ (hashed >> 32)) as usize) & (capacity - 1)
}

impl DiskIndex {
    pub fn create(tier: Tier, tmp_dir: Option<PathBuf>) -> Result<Self> {
        let slots = MappedFile::create(tier, "slots", tmp_dir.as_deref(), INITIAL_SLOTS * SLOT_SIZE)?;
        let heap = MappedFile::create(tier, "heap", tmp_dir.as_deref(), INITIAL_HEAP_BYTES)?;
        Ok(Self {
            tier,
            tmp_dir,
            slots,
            capacity: INITIAL_SLOTS,
            len: 0,
            heap,
            heap_used: 0,
        })
    }

    fn slot(&self, index: usize) -> Slot {
        let at = index * SLOT_SIZE;
        decode_slot(&self.slots.mmap[at..at + SLOT_SIZE])
    }

    fn write_slot(&mut self, index: usize, slot: Slot) {
        let at = index * SLOT_SIZE;
        encode_slot(&mut self.slots.mmap[at..at + SLOT_SIZE], slot);
    }

    /// Probe for `id`. Returns the slot index and whether it holds `id`; when
    /// it does not, the index is the empty slot where `id` would go.
    fn probe(&self, id: i64) -> (usize, bool) {
        let mask = self.capacity - 1;
        let mut index = home_slot(id, self.capacity);
        loop {
            let slot = self.slot(index);
            if slot.state == STATE_EMPTY {
                return (index, false);
            }
            if slot.id == id {
                return (index, true);
            }
            index = (index + 1) & mask;
        }
    }

    /// Double the slot table and reinsert every occupied slot.
    fn grow_slots(&mut self) -> Result<()> {
        let new_capacity = self.capacity * 2;
        let mut table = MappedFile::create(
            self.tier,
            "slots",
            self.tmp_dir.as_deref(),
            new_capacity * SLOT_SIZE,
        )?;
        let mask = new_capacity - 1;
        for index in 0..self.capacity {
            let slot = self.slot(index);
            if slot.state == STATE_EMPTY {
                continue;
            }
            let mut target = home_slot(slot.id, new_capacity);
            loop {
                let at = target * SLOT_SIZE;
                if read_u32(&table.mmap[at..at + SLOT_SIZE], 20) == STATE_EMPTY {
                    encode_slot(&mut table.mmap[at..at + SLOT_SIZE], slot);
                    break;
                }
                target = (target + 1) & mask;
            }
        }
        self.slots = table;
        self.capacity = new_capacity;
        Ok(())
    }

    /// Append bytes to the heap, growing it as needed. Returns their offset.
    fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let needed = self
            .heap_used
            .checked_add(bytes.len())
            .ok_or_else(|| anyhow!("Index: {} heap size overflow", self.tier))?;
        if needed > self.heap.len() {
            let mut size = self.heap.len().max(1);
            while size < needed {
                size *= 2;
            }
            self.heap.grow(size)?;
        }
        let offset = self.heap_used;
        self.heap.mmap[offset..needed].copy_from_slice(bytes);
        self.heap_used = needed;
        Ok(offset as u64)
    }
}

impl GeometryIndex for DiskIndex {
    fn contains_key(&self, id: i64) -> bool {
        self.probe(id).1
    }

    fn get(&self, id: i64) -> Result<Option<Geometry<f64>>> {
        let (index, found) = self.probe(id);
        if !found {
            return Ok(None);
        }
        let slot = self.slot(index);
        if slot.state != STATE_RESOLVED {
            return Ok(None);
        }
        let start = slot.offset as usize;
        let end = start + slot.len as usize;
        let bytes = self
            .heap
            .mmap
            .get(start..end)
            .ok_or_else(|| anyhow!("Index: {} {id} points outside the heap", self.tier))?;
        let geometry = Wkb(bytes.to_vec())
            .to_geo()
            .with_context(|| format!("Index: Failed to decode {} {id}", self.tier))?;
        Ok(Some(geometry))
    }

    fn put(&mut self, id: i64, geometry: Option<&Geometry<f64>>) -> Result<()> {
        if (self.len + 1) * MAX_LOAD_DENOMINATOR > self.capacity * MAX_LOAD_NUMERATOR {
            self.grow_slots()?;
        }

        let slot = match geometry {
            None => Slot {
                id,
                offset: 0,
                len: 0,
                state: STATE_WANTED,
            },
            Some(geometry) => {
                let wkb = geometry
                    .to_wkb(CoordDimensions::xy())
                    .with_context(|| format!("Index: Failed to encode {} {id}", self.tier))?;
                let len = u32::try_from(wkb.len())
                    .with_context(|| format!("Index: {} {id} geometry too large", self.tier))?;
                let offset = self.append(&wkb)?;
                Slot {
                    id,
                    offset,
                    len,
                    state: STATE_RESOLVED,
                }
            }
        };

        let (index, found) = self.probe(id);
        if !found {
            self.len += 1;
        }
        self.write_slot(index, slot);
        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) -> Result<()> {
        *self = DiskIndex::create(self.tier, self.tmp_dir.clone())?;
        Ok(())
    }
}
