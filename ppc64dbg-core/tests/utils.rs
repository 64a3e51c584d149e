//! Test Utilities
//!
//! This module provides mock register contexts and memory, assertion helpers, a
//! canonical prologue and a tiny ELF image builder shared by the integration tests.

#![allow(dead_code)]

use ppc64dbg_core::registers::{RegisterId, LR, NUM_REGISTERS, PC, R1};
use ppc64dbg_core::runtime::{CpuContext, MemoryManager, RegisterContext, TargetMemory};
use ppc64dbg_core::target::ByteOrder;

/// Low scratch region, large enough for small absolute stack pointers like 0x1000.
pub const LOW_BASE: u64 = 0x0;
pub const LOW_SIZE: usize = 0x2000;
/// High stack region, covers 0x7FFE_0000..0x8000_0000.
pub const STACK_BASE: u64 = 0x7FFE_0000;
pub const STACK_SIZE: usize = 0x2_0000;
/// Where test code is loaded.
pub const CODE_BASE: u64 = 0x1000_0000;

pub const MFLR_R0: u32 = 0x7c08_02a6;
pub const STD_R0_16_R1: u32 = 0xf801_0010;
pub const STD_R31_M8_R1: u32 = 0xfbe1_fff8;
pub const STDU_R1_M32_R1: u32 = 0xf821_ffe1;
pub const STDU_R1_M48_R1: u32 = 0xf821_ffd1;
pub const MR_R31_R1: u32 = 0x7c3f_0b78;
pub const MR_R30_R1: u32 = 0x7c3e_0b78;
pub const ADDI_R1_R1_M48: u32 = 0x3821_ffd0;
pub const LD_R1_0_R1: u32 = 0xe821_0000;
pub const NOP: u32 = 0x6000_0000;
pub const BLR: u32 = 0x4e80_0020;

/// `mflr r0; std r31,-8(r1); std r0,16(r1); stdu r1,-48(r1); mr r31,r1; nop; blr`
pub const CANONICAL_PROLOGUE: [u32; 7] = [
    MFLR_R0,
    STD_R31_M8_R1,
    STD_R0_16_R1,
    STDU_R1_M48_R1,
    MR_R31_R1,
    NOP,
    BLR,
];

/// Create a mock CPU context for testing.
pub fn mock_cpu_context() -> CpuContext {
    let mut ctx = CpuContext::new();
    // Set some default values
    ctx.pc = CODE_BASE;
    ctx.lr = 0x1000_0F00;
    ctx.gpr[1] = 0x7FFF_0000;
    ctx
}

/// Create a mock CPU context with specific register values.
pub fn mock_cpu_context_with_registers(registers: &[(RegisterId, u64)]) -> CpuContext {
    let mut ctx = mock_cpu_context();
    for (reg, value) in registers {
        ctx.write_register_unsigned(*reg, *value)
            .expect("mock register write");
    }
    ctx
}

/// Create a little-endian memory manager with the low and high stack regions mapped.
pub fn mock_memory_manager() -> MemoryManager {
    mock_memory_manager_with_order(ByteOrder::Little)
}

pub fn mock_memory_manager_with_order(byte_order: ByteOrder) -> MemoryManager {
    let mut memory = MemoryManager::new(byte_order);
    memory.map_region(LOW_BASE, LOW_SIZE, true);
    memory.map_region(STACK_BASE, STACK_SIZE, true);
    memory
}

/// Create a mock memory manager with `code` loaded read-only at `base`.
pub fn mock_memory_manager_with_code(base: u64, code: &[u32]) -> MemoryManager {
    let mut memory = mock_memory_manager();
    memory.load_section(base, &encode_words(code, ByteOrder::Little), false);
    memory
}

/// Encode instruction words in `byte_order`.
pub fn encode_words(code: &[u32], byte_order: ByteOrder) -> Vec<u8> {
    code.iter()
        .flat_map(|word| match byte_order {
            ByteOrder::Little => word.to_le_bytes(),
            ByteOrder::Big => word.to_be_bytes(),
        })
        .collect()
}

/// Read every register of the native table; unreadable registers are skipped.
pub fn register_snapshot(ctx: &CpuContext) -> Vec<(RegisterId, u64)> {
    (0..NUM_REGISTERS as u32)
        .map(RegisterId)
        .filter_map(|reg| ctx.read_register_unsigned(reg).ok().map(|value| (reg, value)))
        .collect()
}

/// Assert that two CPU contexts have the same register values.
pub fn assert_context_equal(expected: &CpuContext, actual: &CpuContext, message: &str) {
    let expected = register_snapshot(expected);
    let actual = register_snapshot(actual);
    for ((reg, expected_val), (_, actual_val)) in expected.iter().zip(actual.iter()) {
        assert_eq!(
            expected_val, actual_val,
            "{}: Register {} differs: expected 0x{:016X}, got 0x{:016X}",
            message, reg, expected_val, actual_val
        );
    }
}

/// Assert that memory regions are equal.
pub fn assert_memory_equal(
    expected: &MemoryManager,
    actual: &MemoryManager,
    address: u64,
    size: usize,
    message: &str,
) {
    let expected_data = expected.read_bytes(address, size).unwrap();
    let actual_data = actual.read_bytes(address, size).unwrap();
    assert_eq!(
        expected_data, actual_data,
        "{}: Memory at 0x{:016X} differs",
        message, address
    );
}

/// Assert a 64-bit value in memory.
pub fn assert_u64_at(memory: &MemoryManager, address: u64, expected: u64, message: &str) {
    let actual = memory.read_unsigned(address, 8).unwrap();
    assert_eq!(
        expected, actual,
        "{}: 0x{:016X} holds 0x{:016X}, expected 0x{:016X}",
        message, address, actual, expected
    );
}

/// Context with PC at `CODE_BASE`, r1 at `sp` and LR set.
pub fn prologue_context(sp: u64) -> CpuContext {
    mock_cpu_context_with_registers(&[(PC, CODE_BASE), (R1, sp), (LR, 0x1000_0F00)])
}

/// A function symbol for [`build_ppc64_elf`].
pub struct ElfFunction {
    pub name: &'static str,
    pub st_other: u8,
    pub code: Vec<u32>,
}

/// Build a minimal little-endian ELF64 ppc64 executable.
///
/// Functions are laid out back to back in `.text` starting at `CODE_BASE`; each gets a
/// global `STT_FUNC` symbol in `.symtab`.
pub fn build_ppc64_elf(functions: &[ElfFunction]) -> Vec<u8> {
    const EHDR_SIZE: usize = 64;
    const SHDR_SIZE: usize = 64;
    const SYM_SIZE: usize = 24;

    let mut text = Vec::new();
    let mut strtab = vec![0u8];
    let mut symtab = vec![0u8; SYM_SIZE];
    for function in functions {
        let address = CODE_BASE + text.len() as u64;
        let size = (function.code.len() * 4) as u64;
        text.extend(encode_words(&function.code, ByteOrder::Little));

        let name_offset = strtab.len() as u32;
        strtab.extend_from_slice(function.name.as_bytes());
        strtab.push(0);

        symtab.extend_from_slice(&name_offset.to_le_bytes());
        symtab.push(0x12); // STB_GLOBAL | STT_FUNC
        symtab.push(function.st_other);
        symtab.extend_from_slice(&1u16.to_le_bytes()); // .text
        symtab.extend_from_slice(&address.to_le_bytes());
        symtab.extend_from_slice(&size.to_le_bytes());
    }

    let shstrtab = b"\0.text\0.symtab\0.strtab\0.shstrtab\0".to_vec();
    let align8 = |n: usize| (n + 7) & !7;

    let text_off = EHDR_SIZE;
    let symtab_off = align8(text_off + text.len());
    let strtab_off = symtab_off + symtab.len();
    let shstrtab_off = strtab_off + strtab.len();
    let shdr_off = align8(shstrtab_off + shstrtab.len());

    let mut out = vec![0u8; shdr_off];
    out[..4].copy_from_slice(b"\x7fELF");
    out[4] = 2; // ELFCLASS64
    out[5] = 1; // ELFDATA2LSB
    out[6] = 1; // EV_CURRENT
    let mut put = |offset: usize, bytes: &[u8]| out[offset..offset + bytes.len()].copy_from_slice(bytes);
    put(16, &2u16.to_le_bytes()); // ET_EXEC
    put(18, &21u16.to_le_bytes()); // EM_PPC64
    put(20, &1u32.to_le_bytes());
    put(24, &CODE_BASE.to_le_bytes());
    put(32, &0u64.to_le_bytes());
    put(40, &(shdr_off as u64).to_le_bytes());
    put(48, &2u32.to_le_bytes()); // ELFv2
    put(52, &(EHDR_SIZE as u16).to_le_bytes());
    put(54, &56u16.to_le_bytes());
    put(56, &0u16.to_le_bytes());
    put(58, &(SHDR_SIZE as u16).to_le_bytes());
    put(60, &5u16.to_le_bytes());
    put(62, &4u16.to_le_bytes());
    put(text_off, &text);
    put(symtab_off, &symtab);
    put(strtab_off, &strtab);
    put(shstrtab_off, &shstrtab);

    #[allow(clippy::too_many_arguments)]
    fn shdr(
        name: u32,
        kind: u32,
        flags: u64,
        addr: u64,
        offset: usize,
        size: usize,
        link: u32,
        info: u32,
        align: u64,
        entsize: u64,
    ) -> Vec<u8> {
        let mut h = Vec::with_capacity(64);
        h.extend_from_slice(&name.to_le_bytes());
        h.extend_from_slice(&kind.to_le_bytes());
        h.extend_from_slice(&flags.to_le_bytes());
        h.extend_from_slice(&addr.to_le_bytes());
        h.extend_from_slice(&(offset as u64).to_le_bytes());
        h.extend_from_slice(&(size as u64).to_le_bytes());
        h.extend_from_slice(&link.to_le_bytes());
        h.extend_from_slice(&info.to_le_bytes());
        h.extend_from_slice(&align.to_le_bytes());
        h.extend_from_slice(&entsize.to_le_bytes());
        h
    }

    // name offsets into shstrtab: .text=1, .symtab=7, .strtab=15, .shstrtab=23
    out.extend(vec![0u8; SHDR_SIZE]);
    out.extend(shdr(1, 1, 0x6, CODE_BASE, text_off, text.len(), 0, 0, 4, 0));
    out.extend(shdr(7, 2, 0, 0, symtab_off, symtab.len(), 3, 1, 8, SYM_SIZE as u64));
    out.extend(shdr(15, 3, 0, 0, strtab_off, strtab.len(), 0, 0, 1, 0));
    out.extend(shdr(23, 3, 0, 0, shstrtab_off, shstrtab.len(), 0, 0, 1, 0));
    out
}

/// A two-entry function (local offset 8) followed by a leaf.
pub fn sample_elf() -> Vec<u8> {
    let mut two_entry = vec![0x3c4c_0000, 0x3842_0000]; // addis r2,r12,0; addi r2,r2,0
    two_entry.extend_from_slice(&CANONICAL_PROLOGUE);
    build_ppc64_elf(&[
        ElfFunction {
            name: "two_entry",
            st_other: 3 << 5,
            code: two_entry,
        },
        ElfFunction {
            name: "leaf",
            st_other: 0,
            code: vec![0x3863_0001, BLR], // addi r3,r3,1; blr
        },
    ])
}
