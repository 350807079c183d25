//! Shared DDR memory behind the platform's AXI4 master port.
//!
//! Bitstream images and audio sample buffers live here. The DFX controller
//! fetches headers and payloads with AXI4 read bursts; the audio subsystem
//! streams sample buffers through the same port.
//!
//! Storage is sparse: 4KB pages appear on first write and anything never
//! written reads as zero. Named regions are optional. They only matter for
//! per-region traffic counters and for strict decoding in
//! [`AxiMemory`](super::axi_memory::AxiMemory).
//!
//! # Usage
//!
//! ```
//! use ensemble_emu::device::HostMemory;
//!
//! let mut mem = HostMemory::new();
//! mem.map_region("bitstreams", 0x1000_0000, 0x10_0000).unwrap();
//! mem.write_words(0x1000_0000, &[0x4446_5800, 1]);
//! assert_eq!(mem.read_u32(0x1000_0000), 0x4446_5800);
//! ```

use std::collections::BTreeMap;

use byteorder::{ByteOrder, LittleEndian};

const PAGE_SIZE: usize = 4096;
const PAGE_MASK: u64 = !(PAGE_SIZE as u64 - 1);

type Page = Box<[u8; PAGE_SIZE]>;

/// A named address window with traffic counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub name: String,
    pub base: u64,
    /// Size in bytes
    pub size: u64,
    /// Bytes written by the host side (image installs)
    pub bytes_written: u64,
    pub read_bursts: u64,
    pub write_bursts: u64,
}

impl MemoryRegion {
    fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    /// True if `[addr, addr + len)` lies entirely inside the region.
    pub fn covers(&self, addr: u64, len: u64) -> bool {
        addr >= self.base && addr.saturating_add(len) <= self.end()
    }

    /// True if `[addr, addr + len)` touches the region.
    pub fn overlaps(&self, addr: u64, len: u64) -> bool {
        addr < self.end() && addr.saturating_add(len) > self.base
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostMemoryError {
    #[error("region '{name}' at 0x{base:x} overlaps '{existing}'")]
    Overlap { name: String, base: u64, existing: String },
}

/// Sparse byte-addressable memory.
#[derive(Default)]
pub struct HostMemory {
    pages: BTreeMap<u64, Page>,
    regions: Vec<MemoryRegion>,
    bytes_written: u64,
}

impl HostMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name an address window. Windows may not overlap.
    pub fn map_region(&mut self, name: impl Into<String>, base: u64, size: u64) -> Result<(), HostMemoryError> {
        let name = name.into();
        if let Some(existing) = self.regions.iter().find(|r| r.overlaps(base, size)) {
            return Err(HostMemoryError::Overlap { name, base, existing: existing.name.clone() });
        }
        log::debug!("memory: region '{}' 0x{:x}+0x{:x}", name, base, size);
        self.regions.push(MemoryRegion {
            name,
            base,
            size,
            bytes_written: 0,
            read_bursts: 0,
            write_bursts: 0,
        });
        Ok(())
    }

    pub fn region(&self, name: &str) -> Option<&MemoryRegion> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }

    /// True if `len` bytes at `addr` fall inside one region.
    pub fn is_mapped(&self, addr: u64, len: usize) -> bool {
        self.regions.iter().any(|r| r.covers(addr, len as u64))
    }

    fn region_mut(&mut self, addr: u64, len: u64) -> Option<&mut MemoryRegion> {
        self.regions.iter_mut().find(|r| r.overlaps(addr, len))
    }

    #[inline]
    pub fn write_u32(&mut self, addr: u64, value: u32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write_bytes(addr, &buf);
    }

    #[inline]
    pub fn read_u32(&self, addr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_bytes(addr, &mut buf);
        LittleEndian::read_u32(&buf)
    }

    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) {
        let mut at = addr;
        for chunk in split_at_pages(addr, data.len()) {
            let page = self
                .pages
                .entry(at & PAGE_MASK)
                .or_insert_with(|| Box::new([0u8; PAGE_SIZE]));
            let offset = (at & !PAGE_MASK) as usize;
            page[offset..offset + chunk.len].copy_from_slice(&data[chunk.start..chunk.start + chunk.len]);
            at += chunk.len as u64;
        }

        self.bytes_written += data.len() as u64;
        if let Some(region) = self.region_mut(addr, data.len() as u64) {
            region.bytes_written += data.len() as u64;
        }
    }

    /// Fill `buf` from memory; untouched pages read as zero.
    pub fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
        let mut at = addr;
        for chunk in split_at_pages(addr, buf.len()) {
            let dst = &mut buf[chunk.start..chunk.start + chunk.len];
            match self.pages.get(&(at & PAGE_MASK)) {
                Some(page) => {
                    let offset = (at & !PAGE_MASK) as usize;
                    dst.copy_from_slice(&page[offset..offset + chunk.len]);
                }
                None => dst.fill(0),
            }
            at += chunk.len as u64;
        }
    }

    pub fn write_words(&mut self, addr: u64, words: &[u32]) {
        let mut bytes = vec![0u8; words.len() * 4];
        LittleEndian::write_u32_into(words, &mut bytes);
        self.write_bytes(addr, &bytes);
    }

    pub fn read_words(&self, addr: u64, count: usize) -> Vec<u32> {
        let mut bytes = vec![0u8; count * 4];
        self.read_bytes(addr, &mut bytes);
        let mut words = vec![0u32; count];
        LittleEndian::read_u32_into(&bytes, &mut words);
        words
    }

    /// Count a read burst against its region.
    pub fn record_burst_read(&mut self, addr: u64, len: usize) {
        if let Some(region) = self.region_mut(addr, len as u64) {
            region.read_bursts += 1;
        }
    }

    /// Count a write burst against its region.
    pub fn record_burst_write(&mut self, addr: u64, len: usize) {
        if let Some(region) = self.region_mut(addr, len as u64) {
            region.write_bursts += 1;
        }
    }

    pub fn total_bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn allocated_pages(&self) -> usize {
        self.pages.len()
    }
}

impl std::fmt::Debug for HostMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMemory")
            .field("pages", &self.pages.len())
            .field("regions", &self.regions)
            .field("bytes_written", &self.bytes_written)
            .finish()
    }
}

/// Byte range of an access that stays within one page.
struct PageChunk {
    /// Offset into the caller's buffer
    start: usize,
    len: usize,
}

fn split_at_pages(addr: u64, len: usize) -> impl Iterator<Item = PageChunk> {
    let mut start = 0;
    std::iter::from_fn(move || {
        if start >= len {
            return None;
        }
        let offset = ((addr + start as u64) & !PAGE_MASK) as usize;
        let chunk = PageChunk { start, len: (len - start).min(PAGE_SIZE - offset) };
        start += chunk.len;
        Some(chunk)
    })
}
