//! Unwind Plans
//!
//! This module provides the call-frame data model consumed by stack walkers and the
//! fixed plans derived from the ppc64 linkage area.
//!
//! # Linkage Area
//! The ELF ABI places a fixed linkage area at the caller's stack pointer:
//! - `SP + 0`: back chain (caller's caller SP)
//! - `SP + 8`: saved condition register
//! - `SP + 16`: saved link register (return address)
//!
//! Rows produced from emulation live in [`trace`].

pub mod trace;

use std::fmt;

use serde::Serialize;
use smallvec::SmallVec;

use crate::registers::{RegisterId, RegisterKind, CR, LR, PC, R1};

/// Size of a saved pointer in the linkage area.
pub const POINTER_SIZE: i64 = 8;
/// Linkage-area offset of the back chain.
pub const BACK_CHAIN_OFFSET: i64 = 0;
/// Linkage-area offset of the saved condition register.
pub const CR_SAVE_OFFSET: i64 = POINTER_SIZE;
/// Linkage-area offset of the saved link register.
pub const LR_SAVE_OFFSET: i64 = POINTER_SIZE * 2;

/// How the canonical frame address is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CfaValue {
    RegisterPlusOffset { reg: u32, offset: i64 },
    RegisterDereferenced { reg: u32 },
}

/// Where the caller's value of a register can be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegisterLocation {
    Undefined,
    Same,
    AtCfaPlusOffset(i64),
    IsCfaPlusOffset(i64),
    InRegister(u32),
}

/// Tri-state flag for plan metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LazyBool {
    Yes,
    No,
    #[default]
    Calculate,
}

/// One unwind row, valid from `offset` bytes into the function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub offset: u64,
    pub cfa: CfaValue,
    pub registers: SmallVec<[(u32, RegisterLocation); 8]>,
}

impl Row {
    pub fn new(cfa: CfaValue) -> Self {
        Self {
            offset: 0,
            cfa,
            registers: SmallVec::new(),
        }
    }

    /// Set (or replace) the location rule for `reg`.
    pub fn set_register_location(&mut self, reg: u32, location: RegisterLocation) {
        match self.registers.iter_mut().find(|(r, _)| *r == reg) {
            Some(entry) => entry.1 = location,
            None => self.registers.push((reg, location)),
        }
    }

    pub fn register_location(&self, reg: u32) -> Option<RegisterLocation> {
        self.registers
            .iter()
            .find(|(r, _)| *r == reg)
            .map(|(_, location)| *location)
    }
}

/// Ordered unwind rows plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnwindPlan {
    pub register_kind: RegisterKind,
    pub rows: Vec<Row>,
    pub source_name: String,
    pub sourced_from_compiler: LazyBool,
    pub valid_at_all_instructions: LazyBool,
    pub return_address_register: Option<u32>,
}

impl UnwindPlan {
    pub fn new(register_kind: RegisterKind, source_name: impl Into<String>) -> Self {
        Self {
            register_kind,
            rows: Vec::new(),
            source_name: source_name.into(),
            sourced_from_compiler: LazyBool::Calculate,
            valid_at_all_instructions: LazyBool::Calculate,
            return_address_register: None,
        }
    }

    pub fn append_row(&mut self, row: Row) {
        // a row at the same offset supersedes the previous one
        if let Some(last) = self.rows.last_mut() {
            if last.offset == row.offset {
                *last = row;
                return;
            }
        }
        self.rows.push(row);
    }

    /// Row in effect `offset` bytes into the function.
    pub fn row_for_offset(&self, offset: u64) -> Option<&Row> {
        self.rows.iter().rev().find(|row| row.offset <= offset)
    }

    /// Number of `reg` in this plan's numbering scheme.
    pub fn number(&self, reg: RegisterId) -> u32 {
        reg.to_kind(self.register_kind).unwrap_or(u32::MAX)
    }

    fn name(&self, number: u32) -> String {
        RegisterId::from_kind(self.register_kind, number)
            .map(|reg| reg.name().to_string())
            .unwrap_or_else(|| format!("reg{}", number))
    }
}

impl fmt::Display for UnwindPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({:?} numbering, from compiler: {:?}, all instructions: {:?})",
            self.source_name,
            self.register_kind,
            self.sourced_from_compiler,
            self.valid_at_all_instructions
        )?;
        for row in &self.rows {
            let cfa = match row.cfa {
                CfaValue::RegisterPlusOffset { reg, offset } => {
                    format!("{}{:+}", self.name(reg), offset)
                }
                CfaValue::RegisterDereferenced { reg } => format!("[{}]", self.name(reg)),
            };
            write!(f, "  {:#06x}: CFA={}", row.offset, cfa)?;
            for (reg, location) in &row.registers {
                let rule = match *location {
                    RegisterLocation::Undefined => "<undefined>".to_string(),
                    RegisterLocation::Same => "<same>".to_string(),
                    RegisterLocation::AtCfaPlusOffset(off) => format!("[CFA{:+}]", off),
                    RegisterLocation::IsCfaPlusOffset(off) => format!("CFA{:+}", off),
                    RegisterLocation::InRegister(other) => self.name(other),
                };
                write!(f, " {}={}", self.name(*reg), rule)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Function-entry plan used by the instruction emulator (native numbering).
///
/// CFA is `r1 + 0` and the return address is still in LR.
pub fn function_entry_plan_native() -> UnwindPlan {
    let mut plan = UnwindPlan::new(RegisterKind::Lldb, "EmulateInstructionPPC64");
    let mut row = Row::new(CfaValue::RegisterPlusOffset {
        reg: plan.number(R1),
        offset: 0,
    });
    row.set_register_location(plan.number(PC), RegisterLocation::InRegister(plan.number(LR)));
    plan.append_row(row);
    plan.sourced_from_compiler = LazyBool::No;
    plan.valid_at_all_instructions = LazyBool::Yes;
    plan.return_address_register = Some(plan.number(LR));
    plan
}

/// Function-entry plan published by the ABI (DWARF numbering).
pub fn function_entry_plan() -> UnwindPlan {
    let mut plan = UnwindPlan::new(RegisterKind::Dwarf, "ppc64le at-func-entry default");
    let mut row = Row::new(CfaValue::RegisterPlusOffset {
        reg: plan.number(R1),
        offset: 0,
    });
    // previous PC is in LR; every other register is unchanged
    row.set_register_location(plan.number(PC), RegisterLocation::InRegister(plan.number(LR)));
    plan.append_row(row);
    plan.sourced_from_compiler = LazyBool::No;
    plan
}

/// Architecture default plan for frames without debug info (DWARF numbering).
///
/// CFA is the back chain stored at `*r1`; LR and CR come from the linkage area.
pub fn default_plan() -> UnwindPlan {
    let mut plan = UnwindPlan::new(RegisterKind::Dwarf, "ppc64le default unwind plan");
    let sp = plan.number(R1);
    let mut row = Row::new(CfaValue::RegisterDereferenced { reg: sp });
    row.set_register_location(plan.number(LR), RegisterLocation::AtCfaPlusOffset(LR_SAVE_OFFSET));
    row.set_register_location(sp, RegisterLocation::IsCfaPlusOffset(BACK_CHAIN_OFFSET));
    row.set_register_location(plan.number(CR), RegisterLocation::AtCfaPlusOffset(CR_SAVE_OFFSET));
    plan.append_row(row);
    plan.sourced_from_compiler = LazyBool::No;
    plan.valid_at_all_instructions = LazyBool::No;
    plan.return_address_register = Some(plan.number(LR));
    plan
}
