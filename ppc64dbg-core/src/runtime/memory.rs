//! Target Memory
//!
//! This module provides the memory side of the collaborator interface: the
//! [`TargetMemory`] trait consumed by the emulator and the ABI engine, and
//! [`MemoryManager`], a region-based in-memory implementation.
//!
//! # Memory Map
//! A `MemoryManager` starts empty. Callers map regions (code sections of an ELF image,
//! a scratch stack) with [`MemoryManager::map_region`]; any access that is not fully
//! inside one mapped region fails with [`DebugCoreError::MemoryAccess`].
//!
//! # API Reference
//!
//! ```rust,no_run
//! use ppc64dbg_core::runtime::memory::{MemoryManager, TargetMemory};
//! use ppc64dbg_core::target::ByteOrder;
//!
//! let mut memory = MemoryManager::new(ByteOrder::Little);
//! memory.map_region(0x7FFF_0000, 0x1_0000, true);
//! memory.write_unsigned(0x7FFF_0000, 0x1234_5678, 8)?;
//! let value = memory.read_unsigned(0x7FFF_0000, 8)?;
//! # Ok::<(), ppc64dbg_core::error::DebugCoreError>(())
//! ```

use crate::error::{DebugCoreError, Result};
use crate::target::ByteOrder;

/// Access to the memory of a halted process.
pub trait TargetMemory {
    /// Byte order used to interpret multi-byte values.
    fn byte_order(&self) -> ByteOrder;

    /// Fill `buf` with the bytes at `address`.
    fn read_memory(&self, address: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at `address`.
    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<()>;

    /// Read an unsigned integer of `size` (1..=8) bytes in target byte order.
    fn read_unsigned(&self, address: u64, size: usize) -> Result<u64> {
        if size == 0 || size > 8 {
            return Err(DebugCoreError::memory(address, size, "unsupported integer size"));
        }
        let mut buf = [0u8; 8];
        self.read_memory(address, &mut buf[..size])?;
        Ok(self.byte_order().read_uint(&buf[..size]))
    }

    /// Write the low `size` (1..=8) bytes of `value` in target byte order.
    fn write_unsigned(&mut self, address: u64, value: u64, size: usize) -> Result<()> {
        if size == 0 || size > 8 {
            return Err(DebugCoreError::memory(address, size, "unsupported integer size"));
        }
        let bytes = self.byte_order().uint_bytes(value, size);
        self.write_memory(address, &bytes)
    }

    /// Write a 64-bit pointer.
    fn write_pointer(&mut self, address: u64, value: u64) -> Result<()> {
        self.write_unsigned(address, value, 8)
    }
}

/// One mapped range of target memory.
#[derive(Debug, Clone)]
struct Region {
    base: u64,
    data: Vec<u8>,
    writable: bool,
}

impl Region {
    #[inline(always)]
    fn translate(&self, address: u64, len: usize) -> Option<usize> {
        let offset = address.checked_sub(self.base)? as usize;
        let end = offset.checked_add(len)?;
        (end <= self.data.len()).then_some(offset)
    }
}

/// Region-based memory manager.
///
/// # Memory Layout
/// - `regions`: non-overlapping mapped ranges, each with its own backing buffer
/// - `byte_order`: order used by [`TargetMemory::read_unsigned`] and friends
#[derive(Debug, Clone)]
pub struct MemoryManager {
    regions: Vec<Region>,
    byte_order: ByteOrder,
}

impl MemoryManager {
    /// Create an empty memory manager.
    pub fn new(byte_order: ByteOrder) -> Self {
        Self {
            regions: Vec::new(),
            byte_order,
        }
    }

    /// Map a zero-filled region.
    ///
    /// # Arguments
    /// * `base` - First address of the region
    /// * `size` - Region size in bytes
    /// * `writable` - Whether writes into the region are allowed
    pub fn map_region(&mut self, base: u64, size: usize, writable: bool) {
        self.regions.push(Region {
            base,
            data: vec![0u8; size],
            writable,
        });
    }

    /// Map a region initialised with `data` (a code section, for example).
    pub fn load_section(&mut self, base: u64, data: &[u8], writable: bool) {
        self.regions.push(Region {
            base,
            data: data.to_vec(),
            writable,
        });
    }

    /// Read `len` bytes into a new buffer.
    ///
    /// # Errors
    /// Returns error if any byte of the range is unmapped
    pub fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_memory(address, &mut buf)?;
        Ok(buf)
    }

    #[inline(always)]
    fn find(&self, address: u64, len: usize) -> Option<(usize, usize)> {
        self.regions
            .iter()
            .enumerate()
            .find_map(|(index, region)| region.translate(address, len).map(|off| (index, off)))
    }
}

impl TargetMemory for MemoryManager {
    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn read_memory(&self, address: u64, buf: &mut [u8]) -> Result<()> {
        let (index, offset) = self
            .find(address, buf.len())
            .ok_or_else(|| DebugCoreError::memory(address, buf.len(), "address is not mapped"))?;
        buf.copy_from_slice(&self.regions[index].data[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<()> {
        let (index, offset) = self
            .find(address, data.len())
            .ok_or_else(|| DebugCoreError::memory(address, data.len(), "address is not mapped"))?;
        let region = &mut self.regions[index];
        if !region.writable {
            return Err(DebugCoreError::memory(address, data.len(), "region is read-only"));
        }
        region.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}
