//! Simulated glibc-style heap.
//!
//! Chunks are carved from a top pointer and recycled through per-size LIFO
//! bins, the way tcache recycles small chunks. Freed chunks keep their bytes
//! apart from the two words tcache writes over, so a stale reader still sees
//! most of the old record. Everything is plain owned memory; a "use after
//! free" here is just a read of bytes the allocator no longer considers live.

pub mod layout;

pub use layout::RecordLayout;

use std::collections::BTreeMap;

use common::{AllocationData, Fault};
use log::{debug, warn};

/// User address of the first chunk carved from a fresh heap
pub const HEAP_BASE: u64 = 0x4052a0;

/// Per-process tcache key written into freed chunks
pub const TCACHE_KEY: u64 = 0x2f8a_61c3_d5e0_4b17;

const MIN_CHUNK: u64 = 32;
const SIZE_WORD: u64 = 8;
const ALIGN_MASK: u64 = 15;

/// Chunk size glibc picks for a request of `request` bytes
pub fn chunk_size(request: usize) -> u64 {
    ((request as u64 + SIZE_WORD + ALIGN_MASK) & !ALIGN_MASK).max(MIN_CHUNK)
}

#[derive(Debug, Clone)]
struct Chunk {
    size: u64,
    bytes: Vec<u8>,
    freed: bool,
}

#[derive(Debug)]
pub struct Heap {
    chunks: BTreeMap<u64, Chunk>,
    /// Freed chunk addresses by chunk size, most recent last
    bins: BTreeMap<u64, Vec<u64>>,
    top: u64,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            chunks: BTreeMap::new(),
            bins: BTreeMap::new(),
            top: HEAP_BASE,
        }
    }

    /// Allocate `request` bytes and return the user address
    pub fn malloc(&mut self, request: usize) -> u64 {
        let size = chunk_size(request);

        if let Some(address) = self.bins.get_mut(&size).and_then(Vec::pop) {
            if let Some(chunk) = self.chunks.get_mut(&address) {
                chunk.freed = false;
                // tcache_get clears the key, the next pointer stays behind
                chunk.bytes[8..16].fill(0);
                debug!("malloc({}) = {:#x} (reused)", request, address);
                return address;
            }
        }

        let address = self.top;
        self.top += size;
        self.chunks.insert(address, Chunk {
            size,
            bytes: vec![0; (size - SIZE_WORD) as usize],
            freed: false,
        });
        debug!("malloc({}) = {:#x}", request, address);
        address
    }

    /// Release the chunk at `address`
    pub fn free(&mut self, address: u64) -> Result<(), Fault> {
        let chunk = self
            .chunks
            .get_mut(&address)
            .ok_or(Fault::InvalidPointer { address })?;
        if chunk.freed {
            warn!("double free of {:#x}", address);
            return Err(Fault::DoubleFree { address });
        }

        let bin = self.bins.entry(chunk.size).or_default();
        let next = bin.last().copied().unwrap_or(0);
        // Safe-linking mangles the next pointer with the chunk position
        let mangled = (address >> 12) ^ next;
        chunk.bytes[0..8].copy_from_slice(&mangled.to_le_bytes());
        chunk.bytes[8..16].copy_from_slice(&TCACHE_KEY.to_le_bytes());
        chunk.freed = true;
        bin.push(address);

        debug!("free({:#x})", address);
        Ok(())
    }

    /// Copy `data` into the chunk at `address`, starting `offset` bytes in.
    ///
    /// Like a real unchecked copy, a write that runs off the end of the chunk
    /// keeps going through the size word of the chunk that follows and into
    /// its payload. Chunk headers are not modelled, so bytes landing on a size
    /// word are lost, as is anything past the last chunk. Returns the number of
    /// bytes that landed in some chunk.
    pub fn write(&mut self, address: u64, offset: usize, data: &[u8]) -> usize {
        let mut cursor = address.saturating_add(offset as u64);
        let mut current = address;
        let mut rest = data;
        let mut written = 0;

        while !rest.is_empty() {
            let Some(chunk) = self.chunks.get_mut(&current) else {
                break;
            };
            let end = current + chunk.bytes.len() as u64;
            if cursor < end {
                let start = (cursor - current) as usize;
                let n = rest.len().min(chunk.bytes.len() - start);
                chunk.bytes[start..start + n].copy_from_slice(&rest[..n]);
                written += n;
                rest = &rest[n..];
                cursor += n as u64;
            }

            let next = current + chunk.size;
            if cursor < next {
                let n = rest.len().min((next - cursor) as usize);
                rest = &rest[n..];
                cursor += n as u64;
            }
            if !rest.is_empty() && current == address {
                warn!("write of {} bytes at {:#x}+{} runs into chunk {:#x}", data.len(), address, offset, next);
            }
            current = next;
        }

        if !rest.is_empty() {
            warn!("write at {:#x}+{} ran off the heap, {} bytes dropped", address, offset, rest.len());
        }
        written
    }

    /// Copy a NUL terminated string the way `scanf("%s")` does
    pub fn write_cstr(&mut self, address: u64, offset: usize, text: &[u8]) -> usize {
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text);
        data.push(0);
        self.write(address, offset, &data)
    }

    pub fn read(&self, address: u64, offset: usize, len: usize) -> Option<&[u8]> {
        let chunk = self.chunks.get(&address)?;
        chunk.bytes.get(offset..offset.checked_add(len)?)
    }

    pub fn read_u64(&self, address: u64, offset: usize) -> Option<u64> {
        let bytes = self.read(address, offset, 8)?;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    pub fn read_i32(&self, address: u64, offset: usize) -> Option<i32> {
        let bytes = self.read(address, offset, 4)?;
        Some(i32::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Bytes up to the first NUL, or to the end of the chunk
    pub fn read_cstr(&self, address: u64, offset: usize) -> Option<Vec<u8>> {
        let chunk = self.chunks.get(&address)?;
        let tail = chunk.bytes.get(offset..)?;
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Some(tail[..end].to_vec())
    }

    /// Whether the chunk at `address` is currently released
    pub fn is_freed(&self, address: u64) -> Option<bool> {
        self.chunks.get(&address).map(|chunk| chunk.freed)
    }

    pub fn usable_size(&self, address: u64) -> Option<usize> {
        self.chunks.get(&address).map(|chunk| chunk.bytes.len())
    }

    pub fn allocations(&self) -> Vec<AllocationData> {
        self.chunks
            .iter()
            .map(|(&address, chunk)| AllocationData {
                address,
                size: chunk.size as u32,
                is_freed: chunk.freed,
            })
            .collect()
    }
}
