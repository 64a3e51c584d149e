//! Global/Local Entry Points
//!
//! ELFv2 functions have two entry points. The global entry sets up the TOC pointer in
//! r2 and falls through into the local entry, which callers sharing the same TOC
//! branch to directly. The distance between the two is encoded in the top three bits
//! of the symbol's `st_other` byte.
//!
//! # Encoding
//! | `st_other >> 5` | local entry offset |
//! |---|---|
//! | 0, 1 | 0 (single entry point) |
//! | 2 | 4 |
//! | 3 | 8 |
//! | 4 | 16 |
//! | 5 | 32 |
//! | 6 | 64 |
//!
//! Symbols carry `st_other` shifted left by 8 in their `flags`, see [`elf`].

pub mod elf;

use serde::Serialize;

use crate::target::{ObjectFormat, TargetArch, TargetSpec};

const STO_PPC64_LOCAL_BIT: u32 = 5;
const STO_PPC64_LOCAL_MASK: u32 = 0xe0;

/// A symbol as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub name: String,
    /// Load address of the global entry point.
    pub address: u64,
    pub size: u64,
    /// `st_other << 8`.
    pub flags: u32,
    pub prologue_byte_size: u64,
}

impl Symbol {
    pub fn local_entry_offset(&self) -> u64 {
        local_entry_offset(self.flags)
    }

    pub fn local_entry(&self) -> u64 {
        self.address.wrapping_add(self.local_entry_offset())
    }
}

/// Debug-info view of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Function {
    pub name: String,
    pub entry: u64,
    pub prologue_byte_size: u64,
}

/// What is known about the code at the current address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolContext {
    pub function: Option<Function>,
    pub symbol: Option<Symbol>,
}

impl SymbolContext {
    pub fn from_symbol(symbol: Symbol) -> Self {
        Self {
            function: None,
            symbol: Some(symbol),
        }
    }
}

/// Result of [`Architecture::get_bytes_to_skip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BytesToSkip {
    pub bytes_to_skip: u64,
    pub global_entry: u64,
}

/// Decode the local entry offset from symbol `flags`.
#[inline]
pub fn local_entry_offset(flags: u32) -> u64 {
    let other = (flags >> 8) & 0xff;
    let field = (other & STO_PPC64_LOCAL_MASK) >> STO_PPC64_LOCAL_BIT;
    ((1u64 << field) >> 2) << 2
}

/// Architecture-specific address policies used by the stepping and breakpoint logic.
pub trait Architecture {
    fn plugin_name(&self) -> &'static str;

    /// Bytes to skip when stopped at `curr_addr`, plus the function's global entry.
    ///
    /// `None` means the question does not apply to this target or context.
    fn get_bytes_to_skip(
        &self,
        target: &TargetSpec,
        sc: &SymbolContext,
        curr_addr: u64,
    ) -> Option<BytesToSkip>;

    /// Move a function breakpoint to where execution will actually arrive.
    fn adjust_breakpoint_address(&self, symbol: &Symbol, addr: u64) -> u64;
}

/// Entry-point policy for 64-bit PowerPC ELF.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchitecturePpc64;

impl ArchitecturePpc64 {
    pub fn create(target: &TargetSpec) -> Option<Self> {
        matches!(target.arch, TargetArch::Ppc64 | TargetArch::Ppc64le).then_some(Self)
    }
}

impl Architecture for ArchitecturePpc64 {
    fn plugin_name(&self) -> &'static str {
        "ppc64"
    }

    fn get_bytes_to_skip(
        &self,
        target: &TargetSpec,
        sc: &SymbolContext,
        curr_addr: u64,
    ) -> Option<BytesToSkip> {
        if target.object_format != ObjectFormat::Elf {
            return None;
        }

        let (global_entry, prologue_byte_size) = match (&sc.function, &sc.symbol) {
            (Some(function), _) => (function.entry, function.prologue_byte_size),
            (None, Some(symbol)) => (symbol.address, symbol.prologue_byte_size),
            (None, None) => return None,
        };
        let local_offset = sc.symbol.as_ref().map_or(0, Symbol::local_entry_offset);
        let local_entry = global_entry.wrapping_add(local_offset);

        let bytes_to_skip = if curr_addr == global_entry || curr_addr == local_entry {
            prologue_byte_size
        } else {
            0
        };
        log::debug!(
            "Bytes to skip at 0x{:x}: {} (global entry 0x{:x}, local entry 0x{:x})",
            curr_addr,
            bytes_to_skip,
            global_entry,
            local_entry
        );
        Some(BytesToSkip {
            bytes_to_skip,
            global_entry,
        })
    }

    fn adjust_breakpoint_address(&self, symbol: &Symbol, addr: u64) -> u64 {
        match symbol.local_entry_offset() {
            0 => addr,
            offset => addr.wrapping_add(offset),
        }
    }
}
