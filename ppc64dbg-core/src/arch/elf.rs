//! ELF Symbol Loading
//!
//! This module reads function symbols and code sections from a 64-bit PowerPC ELF
//! image with `goblin`, and derives each function's prologue size by emulating the
//! instructions after its local entry point.
//!
//! # Prologue Size
//! Emulation starts at the local entry with a scratch stack and stops at the first
//! instruction the emulator does not understand. The recorded size is measured from
//! the global entry, so it covers the TOC set-up as well:
//! `prologue_byte_size = local_entry_offset + emulated bytes`.

use std::path::Path;

use anyhow::{Context, Result};
use goblin::elf::header::EM_PPC64;
use goblin::elf::section_header::{SHF_EXECINSTR, SHT_PROGBITS};
use goblin::elf::Elf;

use super::Symbol;
use crate::error::DebugCoreError;
use crate::registers::{LR, R0, R1};
use crate::runtime::{CpuContext, MemoryManager, RegisterContext};
use crate::target::{validate_target, ObjectFormat, TargetArch, TargetSpec};
use crate::unwind::trace::{emulate_prologue, PrologueAnalysis};

/// Base of the scratch stack used for prologue emulation.
pub const SCRATCH_STACK_BASE: u64 = 0x7FFF_0000;
/// Size of the scratch stack.
pub const SCRATCH_STACK_SIZE: usize = 0x1_0000;
/// Initial r1 inside the scratch stack.
pub const SCRATCH_STACK_POINTER: u64 = 0x7FFF_8000;
/// Initial LR. Must differ from r0 so a `std r0` without `mflr r0` is not taken for
/// an LR save.
pub const SCRATCH_LINK_REGISTER: u64 = 0x4C52_4C52_4C52_4C52;

/// Scan limit for symbols without a size.
const DEFAULT_SCAN_LIMIT: u64 = 64;

/// Executable section copied out of the image.
#[derive(Debug, Clone)]
pub struct CodeSection {
    pub name: String,
    pub address: u64,
    pub data: Vec<u8>,
}

/// A parsed ppc64 ELF image.
#[derive(Debug, Clone)]
pub struct ElfImage {
    pub target: TargetSpec,
    pub entry: u64,
    pub sections: Vec<CodeSection>,
    /// Function symbols sorted by address, prologue sizes filled in.
    pub symbols: Vec<Symbol>,
}

impl ElfImage {
    /// Read and parse an ELF file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a 64-bit PowerPC ELF
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read ELF file: {}", path.display()))?;
        Self::parse(&bytes).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// Parse an in-memory ELF image.
    ///
    /// # Algorithm
    /// 1. Parse headers with goblin and check `e_machine` / class
    /// 2. Copy out executable `PROGBITS` sections
    /// 3. Collect named function symbols from `.symtab` and `.dynsym`
    /// 4. Emulate each function's prologue to fill in `prologue_byte_size`
    ///
    /// # Errors
    /// Returns error if the image is malformed or not ppc64
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let elf = Elf::parse(bytes).context("Failed to parse ELF headers")?;

        if elf.header.e_machine != EM_PPC64 {
            return Err(DebugCoreError::Elf(format!(
                "e_machine {} is not EM_PPC64",
                elf.header.e_machine
            ))
            .into());
        }
        if !elf.is_64 {
            return Err(DebugCoreError::Elf("32-bit ELF class".to_string()).into());
        }

        let target = TargetSpec {
            arch: if elf.little_endian {
                TargetArch::Ppc64le
            } else {
                TargetArch::Ppc64
            },
            object_format: ObjectFormat::Elf,
            os: None,
        };

        let mut sections = Vec::new();
        for header in &elf.section_headers {
            if header.sh_type != SHT_PROGBITS || header.sh_flags & SHF_EXECINSTR as u64 == 0 {
                continue;
            }
            let name = elf.shdr_strtab.get_at(header.sh_name).unwrap_or("").to_string();
            let Some(range) = header.file_range() else {
                continue;
            };
            let data = bytes
                .get(range)
                .with_context(|| format!("Section {} extends past end of file", name))?;
            sections.push(CodeSection {
                name,
                address: header.sh_addr,
                data: data.to_vec(),
            });
        }

        let mut symbols = Vec::new();
        let tables = [(&elf.syms, &elf.strtab), (&elf.dynsyms, &elf.dynstrtab)];
        for (syms, strtab) in tables {
            for sym in syms.iter() {
                if !sym.is_function() || sym.st_value == 0 {
                    continue;
                }
                let Some(name) = strtab.get_at(sym.st_name).filter(|n| !n.is_empty()) else {
                    continue;
                };
                if symbols.iter().any(|s: &Symbol| s.address == sym.st_value && s.name == name) {
                    continue;
                }
                symbols.push(Symbol {
                    name: name.to_string(),
                    address: sym.st_value,
                    size: sym.st_size,
                    flags: (sym.st_other as u32) << 8,
                    prologue_byte_size: 0,
                });
            }
        }
        symbols.sort_by_key(|s| s.address);

        let mut image = Self {
            target,
            entry: elf.entry,
            sections,
            symbols,
        };

        image.compute_prologue_sizes();

        log::info!(
            "Loaded {} function symbol(s) from {} code section(s)",
            image.symbols.len(),
            image.sections.len()
        );
        Ok(image)
    }

    /// Reinterpret the image for `target`, e.g. a byte order given on the command line.
    ///
    /// Prologue sizes are derived again since instruction words depend on byte order.
    ///
    /// # Errors
    /// Returns error if `target` is not a 64-bit PowerPC
    pub fn with_target(mut self, target: TargetSpec) -> Result<Self> {
        validate_target(&target)?;
        if target != self.target {
            log::info!("Overriding ELF target {:?} with {:?}", self.target.arch, target.arch);
            self.target = target;
            self.compute_prologue_sizes();
        }
        Ok(self)
    }

    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Symbol whose range contains `address`.
    pub fn symbol_for_address(&self, address: u64) -> Option<&Symbol> {
        self.symbols
            .iter()
            .rev()
            .find(|s| s.address <= address && address < s.address.saturating_add(s.size.max(1)))
    }

    /// Memory holding the code sections (read-only) and a writable scratch stack.
    pub fn memory(&self) -> MemoryManager {
        let mut memory = MemoryManager::new(self.target.byte_order());
        for section in &self.sections {
            memory.load_section(section.address, &section.data, false);
        }
        memory.map_region(SCRATCH_STACK_BASE, SCRATCH_STACK_SIZE, true);
        memory
    }

    /// Emulate the prologue of `symbol` starting at `start`.
    ///
    /// # Errors
    /// Register or memory failures during emulation
    pub fn analyze(&self, symbol: &Symbol, start: u64) -> Result<PrologueAnalysis> {
        self.analyze_in(&mut self.memory(), symbol, start)
    }

    /// Prologue size of `symbol` measured from its global entry.
    pub fn prologue_byte_size(&self, symbol: &Symbol) -> Result<u64> {
        self.prologue_byte_size_in(&mut self.memory(), symbol)
    }

    fn compute_prologue_sizes(&mut self) {
        let mut memory = self.memory();
        let mut sizes = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            let size = match self.prologue_byte_size_in(&mut memory, symbol) {
                Ok(size) => size,
                Err(e) => {
                    log::warn!("Prologue analysis failed for {}: {}", symbol.name, e);
                    0
                }
            };
            sizes.push(size);
        }
        for (symbol, size) in self.symbols.iter_mut().zip(sizes) {
            symbol.prologue_byte_size = size;
        }
    }

    fn prologue_byte_size_in(&self, memory: &mut MemoryManager, symbol: &Symbol) -> Result<u64> {
        let analysis = self.analyze_in(memory, symbol, symbol.local_entry())?;
        Ok(symbol.local_entry_offset() + analysis.byte_size)
    }

    fn analyze_in(
        &self,
        memory: &mut MemoryManager,
        symbol: &Symbol,
        start: u64,
    ) -> Result<PrologueAnalysis> {
        let mut regs = CpuContext::new();
        regs.write_register_unsigned(R1, SCRATCH_STACK_POINTER)?;
        regs.write_register_unsigned(R0, 0)?;
        regs.write_register_unsigned(LR, SCRATCH_LINK_REGISTER)?;

        let end = symbol.address.wrapping_add(symbol.size);
        let limit = if symbol.size == 0 {
            DEFAULT_SCAN_LIMIT
        } else {
            end.saturating_sub(start)
        };
        let analysis = emulate_prologue(&mut regs, memory, start, limit)
            .with_context(|| format!("Prologue emulation failed at 0x{:x}", start))?;
        Ok(analysis)
    }
}

/// Load function symbols from an ELF image.
///
/// # Errors
/// Returns error if the image is malformed or not ppc64
pub fn load_symbols(bytes: &[u8]) -> Result<Vec<Symbol>> {
    Ok(ElfImage::parse(bytes)?.symbols)
}
