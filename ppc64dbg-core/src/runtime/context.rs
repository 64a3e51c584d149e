//! Register Context
//!
//! [`RegisterContext`] is the seam through which the core reads and writes the
//! registers of a halted thread. [`CpuContext`] is an in-memory implementation used
//! by tests, the CLI and prologue analysis.

use crate::error::{DebugCoreError, Result};
use crate::registers::{
    generic_register, register_by_name, GenericRegister, RegisterId, RegisterSet,
    CR, CTR, F0, FPSCR, LR, MSR, ORIG_R3, PC, TRAP, V0, XER,
};

/// Raw contents of one register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    /// 64-bit integer register, or the raw bits of a floating-point register.
    U64(u64),
    /// 128-bit vector register, in target memory byte order.
    Vector([u8; 16]),
}

impl RegisterValue {
    pub fn as_u64(&self) -> u64 {
        match *self {
            RegisterValue::U64(value) => value,
            RegisterValue::Vector(bytes) => {
                let mut low = [0u8; 8];
                low.copy_from_slice(&bytes[..8]);
                u64::from_le_bytes(low)
            }
        }
    }
}

/// Access to the registers of one halted thread.
pub trait RegisterContext {
    fn read_register(&self, reg: RegisterId) -> Result<RegisterValue>;

    fn write_register(&mut self, reg: RegisterId, value: RegisterValue) -> Result<()>;

    fn read_register_unsigned(&self, reg: RegisterId) -> Result<u64> {
        Ok(self.read_register(reg)?.as_u64())
    }

    fn write_register_unsigned(&mut self, reg: RegisterId, value: u64) -> Result<()> {
        self.write_register(reg, RegisterValue::U64(value))
    }

    fn resolve_generic(&self, role: GenericRegister) -> Result<RegisterId> {
        generic_register(role).ok_or_else(|| DebugCoreError::unmapped(format!("{:?}", role)))
    }

    fn resolve_name(&self, name: &str) -> Result<RegisterId> {
        register_by_name(name).ok_or_else(|| DebugCoreError::unmapped(name))
    }

    fn pc(&self) -> Result<u64> {
        self.read_register_unsigned(self.resolve_generic(GenericRegister::Pc)?)
    }

    fn sp(&self) -> Result<u64> {
        self.read_register_unsigned(self.resolve_generic(GenericRegister::Sp)?)
    }
}

/// CPU context
#[derive(Debug, Clone)]
pub struct CpuContext {
    pub gpr: [u64; 32],     // General Purpose Registers (r0-r31)
    pub pc: u64,            // Program Counter
    pub lr: u64,            // Link Register
    pub msr: u64,           // Machine State Register
    pub orig_r3: u64,       // r3 at syscall entry
    pub ctr: u64,           // Count Register
    pub xer: u64,           // Fixed-Point Exception Register
    pub cr: u64,            // Condition Register
    pub trap: u64,          // Trap number of the last exception
    pub fpr: [f64; 32],     // Floating-Point Registers
    pub fpscr: u64,         // Floating-Point Status and Control Register
    pub vr: [[u8; 16]; 32], // Vector Registers
    /// Registers that reads and writes should fail for.
    unavailable: Vec<RegisterId>,
}

impl CpuContext {
    pub fn new() -> Self {
        Self {
            gpr: [0; 32],
            pc: 0,
            lr: 0,
            msr: 0,
            orig_r3: 0,
            ctr: 0,
            xer: 0,
            cr: 0,
            trap: 0,
            fpr: [0.0; 32],
            fpscr: 0,
            vr: [[0; 16]; 32],
            unavailable: Vec::new(),
        }
    }

    /// Make every access to `reg` fail, as a partially populated thread context would.
    pub fn mark_unavailable(&mut self, reg: RegisterId) {
        self.unavailable.push(reg);
    }

    fn check_available(&self, reg: RegisterId) -> Result<()> {
        if self.unavailable.contains(&reg) {
            return Err(DebugCoreError::register(reg, "not available in this context"));
        }
        Ok(())
    }

    fn special(&mut self, reg: RegisterId) -> Option<&mut u64> {
        Some(match reg {
            PC => &mut self.pc,
            LR => &mut self.lr,
            MSR => &mut self.msr,
            ORIG_R3 => &mut self.orig_r3,
            CTR => &mut self.ctr,
            XER => &mut self.xer,
            CR => &mut self.cr,
            TRAP => &mut self.trap,
            FPSCR => &mut self.fpscr,
            _ => return None,
        })
    }
}

impl Default for CpuContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterContext for CpuContext {
    fn read_register(&self, reg: RegisterId) -> Result<RegisterValue> {
        self.check_available(reg)?;
        let info = reg
            .info()
            .ok_or_else(|| DebugCoreError::register(reg, "no such register"))?;
        let value = match info.set {
            RegisterSet::General if reg.is_gpr() => RegisterValue::U64(self.gpr[reg.0 as usize]),
            RegisterSet::FloatingPoint if reg != FPSCR => {
                RegisterValue::U64(self.fpr[(reg.0 - F0.0) as usize].to_bits())
            }
            RegisterSet::Vector => RegisterValue::Vector(self.vr[(reg.0 - V0.0) as usize]),
            _ => {
                RegisterValue::U64(match reg {
                    PC => self.pc,
                    LR => self.lr,
                    MSR => self.msr,
                    ORIG_R3 => self.orig_r3,
                    CTR => self.ctr,
                    XER => self.xer,
                    CR => self.cr,
                    TRAP => self.trap,
                    FPSCR => self.fpscr,
                    _ => return Err(DebugCoreError::register(reg, "no such register")),
                })
            }
        };
        Ok(value)
    }

    fn write_register(&mut self, reg: RegisterId, value: RegisterValue) -> Result<()> {
        self.check_available(reg)?;
        let info = reg
            .info()
            .ok_or_else(|| DebugCoreError::register(reg, "no such register"))?;
        match (info.set, value) {
            (RegisterSet::General, RegisterValue::U64(raw)) if reg.is_gpr() => {
                self.gpr[reg.0 as usize] = raw;
            }
            (RegisterSet::FloatingPoint, RegisterValue::U64(raw)) if reg != FPSCR => {
                self.fpr[(reg.0 - F0.0) as usize] = f64::from_bits(raw);
            }
            (RegisterSet::Vector, RegisterValue::Vector(bytes)) => {
                self.vr[(reg.0 - V0.0) as usize] = bytes;
            }
            (_, RegisterValue::U64(raw)) => match self.special(reg) {
                Some(slot) => *slot = raw,
                None => return Err(DebugCoreError::register(reg, "no such register")),
            },
            (_, RegisterValue::Vector(_)) => {
                return Err(DebugCoreError::register(reg, "vector value for scalar register"));
            }
        }
        Ok(())
    }
}
