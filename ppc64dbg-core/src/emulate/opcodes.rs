//! Opcode Table and Instruction Fields
//!
//! This module holds the static table of instruction patterns the emulator
//! understands and the field extractors for the instruction forms they use.
//!
//! # Matching
//! A raw word matches an entry iff `(word & mask) == value`. Entries are scanned in
//! table order and the first match wins, so the order below is significant.
//!
//! # Instruction Forms (MSB-first)
//! - **XFX** (`mfspr`): `op:6, rt:5, spr:10, xo:10, last:1`
//! - **DS** (`std`, `stdu`, `ld`): `op:6, rs/rt:5, ra:5, ds:14, xo:2`
//! - **X** (`or`): `op:6, rs:5, ra:5, rb:5, xo:10, rc:1`
//! - **D** (`addi`): `op:6, rt:5, ra:5, si:16`

/// Handler selector for a table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpcodeId {
    Mfspr = 0,
    Std = 1,
    Or = 2,
    Addi = 3,
    Ld = 4,
}

/// One recognized instruction pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeEntry {
    pub mask: u32,
    pub value: u32,
    pub handler: OpcodeId,
    pub name: &'static str,
}

impl OpcodeEntry {
    #[inline]
    pub fn matches(&self, word: u32) -> bool {
        (word & self.mask) == self.value
    }
}

/// Prologue/epilogue opcode table, in match order.
pub static OPCODES: [OpcodeEntry; 6] = [
    OpcodeEntry {
        mask: 0xfc00_07ff,
        value: 0x7c00_02a6,
        handler: OpcodeId::Mfspr,
        name: "mfspr RT, SPR",
    },
    OpcodeEntry {
        mask: 0xfc00_0003,
        value: 0xf800_0000,
        handler: OpcodeId::Std,
        name: "std RS, DS(RA)",
    },
    OpcodeEntry {
        mask: 0xfc00_0003,
        value: 0xf800_0001,
        handler: OpcodeId::Std,
        name: "stdu RS, DS(RA)",
    },
    OpcodeEntry {
        mask: 0xfc00_07fe,
        value: 0x7c00_0378,
        handler: OpcodeId::Or,
        name: "or RA, RS, RB",
    },
    OpcodeEntry {
        mask: 0xfc00_0000,
        value: 0x3800_0000,
        handler: OpcodeId::Addi,
        name: "addi RT, RA, SI",
    },
    OpcodeEntry {
        mask: 0xfc00_0003,
        value: 0xe800_0000,
        handler: OpcodeId::Ld,
        name: "ld RT, DS(RA)",
    },
];

/// Find the first table entry matching `word`.
#[inline]
pub fn opcode_for_instruction(word: u32) -> Option<&'static OpcodeEntry> {
    OPCODES.iter().find(|entry| entry.matches(word))
}

#[inline(always)]
fn reg_field(word: u32, shift: u32) -> u8 {
    ((word >> shift) & 0x1F) as u8
}

/// `mfspr` fields. `spr` is the raw 10-bit field, halves not swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XfxForm {
    pub rt: u8,
    pub spr: u16,
}

impl XfxForm {
    /// Raw encoding of LR in the `spr` field (SPR 8 with its 5-bit halves swapped).
    pub const SPR_LR: u16 = 0x100;

    pub fn decode(word: u32) -> Self {
        Self {
            rt: reg_field(word, 21),
            spr: ((word >> 11) & 0x3FF) as u16,
        }
    }
}

/// DS-form fields; `ds` is already scaled to bytes and sign-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsForm {
    pub rs: u8,
    pub ra: u8,
    pub ds: i32,
    pub xo: u8,
}

impl DsForm {
    pub fn decode(word: u32) -> Self {
        Self {
            rs: reg_field(word, 21),
            ra: reg_field(word, 16),
            // ds:14 shifted left by 2 is the low half-word with the xo bits cleared
            ds: (word & 0xFFFC) as u16 as i16 as i32,
            xo: (word & 0x3) as u8,
        }
    }

    /// `stdu`: also write the effective address back into RA.
    pub fn update(&self) -> bool {
        self.xo == 1
    }
}

/// X-form fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XForm {
    pub rs: u8,
    pub ra: u8,
    pub rb: u8,
    pub xo: u16,
    pub rc: bool,
}

impl XForm {
    pub fn decode(word: u32) -> Self {
        Self {
            rs: reg_field(word, 21),
            ra: reg_field(word, 16),
            rb: reg_field(word, 11),
            xo: ((word >> 1) & 0x3FF) as u16,
            rc: word & 1 != 0,
        }
    }
}

/// D-form fields with a sign-extended immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DForm {
    pub rt: u8,
    pub ra: u8,
    pub si: i32,
}

impl DForm {
    pub fn decode(word: u32) -> Self {
        Self {
            rt: reg_field(word, 21),
            ra: reg_field(word, 16),
            si: (word & 0xFFFF) as u16 as i16 as i32,
        }
    }
}
