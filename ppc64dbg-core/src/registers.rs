//! Register Table and Role Map
//!
//! This module owns the static description of the ppc64 register file and the mapping
//! from architecture-generic roles (program counter, stack pointer, return address,
//! flags, argument N) to concrete registers.
//!
//! # Numbering Schemes
//! - **Native** (`RegisterKind::Lldb`): index into [`REGISTER_INFOS`]. GPRs first,
//!   then `pc, lr, msr, orig_r3, ctr, xer, cr, trap`, then FPRs, `fpscr` and VMX.
//! - **DWARF** (`RegisterKind::Dwarf`): numbers from the 64-bit PowerPC ELF ABI
//!   (r0-r31 = 0-31, f0-f31 = 32-63, lr = 65, ctr = 66, cr = 68, xer = 76, v0 = 77).
//! - **Generic** (`RegisterKind::Generic`): role numbers, see [`GenericRegister`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Register numbering scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterKind {
    /// Architecture-generic roles
    Generic,
    /// Native register table order
    Lldb,
    /// DWARF / eh_frame register numbers
    Dwarf,
}

/// Architecture-generic register roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenericRegister {
    Pc,
    Sp,
    Fp,
    Ra,
    Flags,
    /// Integer argument register, 1-based.
    Arg(u8),
}

impl GenericRegister {
    /// Role number used when generic registers travel as plain integers.
    pub fn number(self) -> u32 {
        match self {
            GenericRegister::Pc => 0,
            GenericRegister::Sp => 1,
            GenericRegister::Fp => 2,
            GenericRegister::Ra => 3,
            GenericRegister::Flags => 4,
            GenericRegister::Arg(n) => 4 + n as u32,
        }
    }

    pub fn from_number(number: u32) -> Option<Self> {
        Some(match number {
            0 => GenericRegister::Pc,
            1 => GenericRegister::Sp,
            2 => GenericRegister::Fp,
            3 => GenericRegister::Ra,
            4 => GenericRegister::Flags,
            n @ 5..=12 => GenericRegister::Arg((n - 4) as u8),
            _ => return None,
        })
    }
}

/// Register set a register belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegisterSet {
    General,
    FloatingPoint,
    Vector,
}

/// Value encoding of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    Uint,
    Ieee754,
    Vector,
}

/// Static description of one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterInfo {
    pub name: &'static str,
    pub alt_name: Option<&'static str>,
    pub byte_size: usize,
    pub encoding: Encoding,
    pub set: RegisterSet,
    pub dwarf: u32,
    pub generic: Option<GenericRegister>,
}

/// Concrete register identifier (native numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegisterId(pub u32);

pub const R0: RegisterId = RegisterId(0);
pub const R1: RegisterId = RegisterId(1);
pub const R2: RegisterId = RegisterId(2);
pub const R3: RegisterId = RegisterId(3);
pub const R10: RegisterId = RegisterId(10);
pub const R13: RegisterId = RegisterId(13);
pub const R30: RegisterId = RegisterId(30);
pub const R31: RegisterId = RegisterId(31);
pub const PC: RegisterId = RegisterId(32);
pub const LR: RegisterId = RegisterId(33);
pub const MSR: RegisterId = RegisterId(34);
pub const ORIG_R3: RegisterId = RegisterId(35);
pub const CTR: RegisterId = RegisterId(36);
pub const XER: RegisterId = RegisterId(37);
pub const CR: RegisterId = RegisterId(38);
pub const TRAP: RegisterId = RegisterId(39);
pub const F0: RegisterId = RegisterId(40);
pub const F1: RegisterId = RegisterId(41);
pub const FPSCR: RegisterId = RegisterId(72);
pub const V0: RegisterId = RegisterId(73);
pub const V2: RegisterId = RegisterId(75);

/// Number of registers in [`REGISTER_INFOS`].
pub const NUM_REGISTERS: usize = 105;

/// Stack pointer alias used by the ABI.
pub const SP: RegisterId = R1;

impl RegisterId {
    /// General-purpose register `rN`.
    pub const fn gpr(n: u8) -> RegisterId {
        RegisterId((n & 0x1F) as u32)
    }

    /// Floating-point register `fN`.
    pub const fn fpr(n: u8) -> RegisterId {
        RegisterId(F0.0 + (n & 0x1F) as u32)
    }

    /// Vector register `vN`.
    pub const fn vr(n: u8) -> RegisterId {
        RegisterId(V0.0 + (n & 0x1F) as u32)
    }

    pub fn info(self) -> Option<&'static RegisterInfo> {
        REGISTER_INFOS.get(self.0 as usize)
    }

    pub fn name(self) -> &'static str {
        self.info().map(|info| info.name).unwrap_or("<invalid>")
    }

    pub fn is_gpr(self) -> bool {
        self.0 < 32
    }

    /// Translate a register number in `kind` to a native identifier.
    pub fn from_kind(kind: RegisterKind, number: u32) -> Option<RegisterId> {
        match kind {
            RegisterKind::Lldb => ((number as usize) < NUM_REGISTERS).then_some(RegisterId(number)),
            RegisterKind::Dwarf => REGISTER_INFOS
                .iter()
                .position(|info| info.dwarf == number)
                .map(|index| RegisterId(index as u32)),
            RegisterKind::Generic => GenericRegister::from_number(number).and_then(generic_register),
        }
    }

    /// Translate this register into the numbering of `kind`.
    pub fn to_kind(self, kind: RegisterKind) -> Option<u32> {
        let info = self.info()?;
        match kind {
            RegisterKind::Lldb => Some(self.0),
            RegisterKind::Dwarf => Some(info.dwarf),
            RegisterKind::Generic => info.generic.map(GenericRegister::number),
        }
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve a generic role to a concrete register.
///
/// `Fp` has no fixed register on this architecture (r31 is only a convention) and
/// resolves to `None`, as do argument numbers outside 1..=8.
pub fn generic_register(role: GenericRegister) -> Option<RegisterId> {
    match role {
        GenericRegister::Pc => Some(PC),
        GenericRegister::Sp => Some(R1),
        GenericRegister::Ra => Some(LR),
        GenericRegister::Flags => Some(CR),
        GenericRegister::Arg(n @ 1..=8) => Some(RegisterId::gpr(2 + n)),
        GenericRegister::Arg(_) | GenericRegister::Fp => None,
    }
}

/// Look a register up by its name or alternate name (`"r3"`, `"sp"`, `"f1"`, `"v2"`).
pub fn register_by_name(name: &str) -> Option<RegisterId> {
    REGISTER_INFOS
        .iter()
        .position(|info| info.name == name || info.alt_name == Some(name))
        .map(|index| RegisterId(index as u32))
}

/// Whether the 64-bit PowerPC ELF ABI requires a callee to preserve `reg`.
///
/// Preserved: r1, r2, r13-r31, f14-f31 and the program counter. Condition register
/// fields cr2-cr4 and v20-v31 are only partially tracked and count as volatile here.
pub fn register_is_callee_saved(reg: RegisterId) -> bool {
    match reg.0 {
        1 | 2 => true,
        13..=31 => true,
        n if n == PC.0 => true,
        n if (F0.0 + 14..=F0.0 + 31).contains(&n) => true,
        _ => false,
    }
}

pub fn register_is_volatile(reg: RegisterId) -> bool {
    !register_is_callee_saved(reg)
}

macro_rules! gpr {
    ($name:literal, $alt:expr, $dwarf:expr, $generic:expr) => {
        RegisterInfo {
            name: $name,
            alt_name: $alt,
            byte_size: 8,
            encoding: Encoding::Uint,
            set: RegisterSet::General,
            dwarf: $dwarf,
            generic: $generic,
        }
    };
}

macro_rules! fpr {
    ($name:literal, $dwarf:expr) => {
        RegisterInfo {
            name: $name,
            alt_name: None,
            byte_size: 8,
            encoding: Encoding::Ieee754,
            set: RegisterSet::FloatingPoint,
            dwarf: $dwarf,
            generic: None,
        }
    };
}

macro_rules! vmx {
    ($name:literal, $dwarf:expr) => {
        RegisterInfo {
            name: $name,
            alt_name: None,
            byte_size: 16,
            encoding: Encoding::Vector,
            set: RegisterSet::Vector,
            dwarf: $dwarf,
            generic: None,
        }
    };
}

use GenericRegister::{Arg, Flags, Pc, Ra, Sp};

/// The ppc64 register file in native order.
pub static REGISTER_INFOS: [RegisterInfo; NUM_REGISTERS] = [
    gpr!("r0", None, 0, None),
    gpr!("r1", Some("sp"), 1, Some(Sp)),
    gpr!("r2", None, 2, None),
    gpr!("r3", Some("arg1"), 3, Some(Arg(1))),
    gpr!("r4", Some("arg2"), 4, Some(Arg(2))),
    gpr!("r5", Some("arg3"), 5, Some(Arg(3))),
    gpr!("r6", Some("arg4"), 6, Some(Arg(4))),
    gpr!("r7", Some("arg5"), 7, Some(Arg(5))),
    gpr!("r8", Some("arg6"), 8, Some(Arg(6))),
    gpr!("r9", Some("arg7"), 9, Some(Arg(7))),
    gpr!("r10", Some("arg8"), 10, Some(Arg(8))),
    gpr!("r11", None, 11, None),
    gpr!("r12", None, 12, None),
    gpr!("r13", None, 13, None),
    gpr!("r14", None, 14, None),
    gpr!("r15", None, 15, None),
    gpr!("r16", None, 16, None),
    gpr!("r17", None, 17, None),
    gpr!("r18", None, 18, None),
    gpr!("r19", None, 19, None),
    gpr!("r20", None, 20, None),
    gpr!("r21", None, 21, None),
    gpr!("r22", None, 22, None),
    gpr!("r23", None, 23, None),
    gpr!("r24", None, 24, None),
    gpr!("r25", None, 25, None),
    gpr!("r26", None, 26, None),
    gpr!("r27", None, 27, None),
    gpr!("r28", None, 28, None),
    gpr!("r29", None, 29, None),
    gpr!("r30", None, 30, None),
    gpr!("r31", None, 31, None),
    gpr!("pc", None, 357, Some(Pc)),
    gpr!("lr", None, 65, Some(Ra)),
    gpr!("msr", None, 361, None),
    gpr!("orig_r3", None, 359, None),
    gpr!("ctr", None, 66, None),
    gpr!("xer", None, 76, None),
    gpr!("cr", None, 68, Some(Flags)),
    gpr!("trap", None, 358, None),
    fpr!("f0", 32),
    fpr!("f1", 33),
    fpr!("f2", 34),
    fpr!("f3", 35),
    fpr!("f4", 36),
    fpr!("f5", 37),
    fpr!("f6", 38),
    fpr!("f7", 39),
    fpr!("f8", 40),
    fpr!("f9", 41),
    fpr!("f10", 42),
    fpr!("f11", 43),
    fpr!("f12", 44),
    fpr!("f13", 45),
    fpr!("f14", 46),
    fpr!("f15", 47),
    fpr!("f16", 48),
    fpr!("f17", 49),
    fpr!("f18", 50),
    fpr!("f19", 51),
    fpr!("f20", 52),
    fpr!("f21", 53),
    fpr!("f22", 54),
    fpr!("f23", 55),
    fpr!("f24", 56),
    fpr!("f25", 57),
    fpr!("f26", 58),
    fpr!("f27", 59),
    fpr!("f28", 60),
    fpr!("f29", 61),
    fpr!("f30", 62),
    fpr!("f31", 63),
    fpr!("fpscr", 360),
    vmx!("v0", 77),
    vmx!("v1", 78),
    vmx!("v2", 79),
    vmx!("v3", 80),
    vmx!("v4", 81),
    vmx!("v5", 82),
    vmx!("v6", 83),
    vmx!("v7", 84),
    vmx!("v8", 85),
    vmx!("v9", 86),
    vmx!("v10", 87),
    vmx!("v11", 88),
    vmx!("v12", 89),
    vmx!("v13", 90),
    vmx!("v14", 91),
    vmx!("v15", 92),
    vmx!("v16", 93),
    vmx!("v17", 94),
    vmx!("v18", 95),
    vmx!("v19", 96),
    vmx!("v20", 97),
    vmx!("v21", 98),
    vmx!("v22", 99),
    vmx!("v23", 100),
    vmx!("v24", 101),
    vmx!("v25", 102),
    vmx!("v26", 103),
    vmx!("v27", 104),
    vmx!("v28", 105),
    vmx!("v29", 106),
    vmx!("v30", 107),
    vmx!("v31", 108),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_layout() {
        assert_eq!(PC.name(), "pc");
        assert_eq!(LR.name(), "lr");
        assert_eq!(CR.name(), "cr");
        assert_eq!(F1.name(), "f1");
        assert_eq!(FPSCR.name(), "fpscr");
        assert_eq!(V2.name(), "v2");
        assert_eq!(RegisterId(NUM_REGISTERS as u32 - 1).name(), "v31");
    }

    #[test]
    fn test_dwarf_round_trip() {
        assert_eq!(LR.to_kind(RegisterKind::Dwarf), Some(65));
        assert_eq!(RegisterId::from_kind(RegisterKind::Dwarf, 68), Some(CR));
        assert_eq!(RegisterId::from_kind(RegisterKind::Dwarf, 33), Some(F1));
    }

    #[test]
    fn test_generic_roles() {
        assert_eq!(generic_register(GenericRegister::Sp), Some(R1));
        assert_eq!(generic_register(GenericRegister::Arg(1)), Some(R3));
        assert_eq!(generic_register(GenericRegister::Arg(8)), Some(R10));
        assert_eq!(generic_register(GenericRegister::Arg(9)), None);
        assert_eq!(generic_register(GenericRegister::Fp), None);
        assert_eq!(
            RegisterId::from_kind(RegisterKind::Generic, GenericRegister::Ra.number()),
            Some(LR)
        );
    }

    #[test]
    fn test_register_by_name() {
        assert_eq!(register_by_name("sp"), Some(R1));
        assert_eq!(register_by_name("arg3"), Some(RegisterId::gpr(5)));
        assert_eq!(register_by_name("r33"), None);
    }
}
