//! Dynamic Unwind Rows
//!
//! Turns the event trace of an emulation pass into unwind rows, one row per
//! instruction that changed the frame.
//!
//! # Frame Tracking
//! The builder keeps three quantities while walking the trace:
//! - `cfa_reg` / `cfa_offset`: the current CFA rule (`cfa_reg + cfa_offset`)
//! - `sp_delta`: how far r1 has moved below its value at function entry
//!
//! Since the CFA is r1 at entry, a store to `r1 + off` lands at
//! `CFA + off - sp_delta`. Once a frame register is set the CFA stays on it until
//! `ld r1, 0(r1)` pops the frame.

use serde::Serialize;

use super::{function_entry_plan_native, CfaValue, RegisterLocation, Row, UnwindPlan};
use crate::emulate::{
    opcode_for_instruction, Access, ContextInfo, ContextType, EmulateInstructionPpc64,
    EmulationEvent, EvaluateOptions,
};
use crate::error::Result;
use crate::registers::{GenericRegister, RegisterId, R1};
use crate::runtime::{RegisterContext, TargetMemory};

/// Incremental builder for an emulation-derived unwind plan.
#[derive(Debug, Clone)]
pub struct UnwindTraceBuilder {
    function_start: u64,
    plan: UnwindPlan,
    row: Row,
    cfa_reg: RegisterId,
    cfa_offset: i64,
    sp_delta: i64,
}

impl UnwindTraceBuilder {
    pub fn new(function_start: u64) -> Self {
        let plan = function_entry_plan_native();
        let mut row = plan.rows[0].clone();
        row.set_register_location(plan.number(R1), RegisterLocation::IsCfaPlusOffset(0));
        Self {
            function_start,
            plan,
            row,
            cfa_reg: R1,
            cfa_offset: 0,
            sp_delta: 0,
        }
    }

    /// Fold the events of the instruction at `address` into the plan.
    ///
    /// Returns whether a new row was appended.
    pub fn process_instruction(&mut self, address: u64, events: &[EmulationEvent]) -> bool {
        let mut changed = false;
        for event in events {
            changed |= self.apply(event);
        }
        if changed {
            let mut row = self.row.clone();
            row.offset = address.wrapping_sub(self.function_start).wrapping_add(4);
            row.cfa = CfaValue::RegisterPlusOffset {
                reg: self.plan.number(self.cfa_reg),
                offset: self.cfa_offset,
            };
            self.row = row.clone();
            self.plan.append_row(row);
        }
        changed
    }

    pub fn finish(self) -> UnwindPlan {
        self.plan
    }

    fn apply(&mut self, event: &EmulationEvent) -> bool {
        let written = match event.access {
            Access::WriteRegister { reg, .. } => Some(reg),
            _ => None,
        };

        match (event.context.kind, event.context.info) {
            (
                ContextType::PushRegisterOnStack,
                ContextInfo::RegisterToRegisterPlusOffset {
                    data_reg,
                    base_reg,
                    offset,
                },
            ) if base_reg == R1 && data_reg != R1 => {
                let number = self.plan.number(data_reg);
                if self.row.register_location(number).is_some() {
                    return false;
                }
                let location = RegisterLocation::AtCfaPlusOffset(offset - self.sp_delta);
                self.row.set_register_location(number, location);
                true
            }
            (ContextType::AdjustStackPointer, ContextInfo::RegisterPlusOffset { reg, offset })
            | (ContextType::RestoreStackPointer, ContextInfo::RegisterPlusOffset { reg, offset })
                if reg == R1 && written == Some(R1) =>
            {
                self.sp_delta -= offset;
                self.follow_sp()
            }
            (ContextType::RestoreStackPointer, ContextInfo::RegisterToRegisterPlusOffset { .. })
                if written == Some(R1) =>
            {
                // back chain popped: r1 holds the entry value again
                self.sp_delta = 0;
                self.cfa_reg = R1;
                self.cfa_offset = 0;
                true
            }
            (ContextType::SetFramePointer, ContextInfo::Register(fp)) if written == Some(fp) => {
                self.cfa_reg = fp;
                self.cfa_offset = self.sp_delta;
                true
            }
            _ => false,
        }
    }

    fn follow_sp(&mut self) -> bool {
        if self.cfa_reg == R1 {
            self.cfa_offset = self.sp_delta;
            true
        } else {
            false
        }
    }
}

/// One instruction accepted during prologue emulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmulatedInstruction {
    pub address: u64,
    pub word: u32,
    pub name: &'static str,
    pub events: Vec<EmulationEvent>,
}

/// Result of [`emulate_prologue`].
#[derive(Debug, Clone, Serialize)]
pub struct PrologueAnalysis {
    pub plan: UnwindPlan,
    pub instructions: Vec<EmulatedInstruction>,
    /// Bytes covered by the accepted instructions.
    pub byte_size: u64,
}

/// Emulate the frame set-up at `start` until the first instruction the emulator does
/// not understand, or `limit` bytes.
///
/// # Arguments
/// * `regs` - Register context; PC is overwritten with `start`
/// * `memory` - Memory holding the code and a writable stack around r1
/// * `start` - Address of the first instruction
/// * `limit` - Maximum number of bytes to scan
///
/// # Errors
/// Register or memory failures inside a handler. An unreadable or unknown
/// instruction only ends the scan.
pub fn emulate_prologue(
    regs: &mut dyn RegisterContext,
    memory: &mut dyn TargetMemory,
    start: u64,
    limit: u64,
) -> Result<PrologueAnalysis> {
    let pc_reg = regs.resolve_generic(GenericRegister::Pc)?;
    regs.write_register_unsigned(pc_reg, start)?;

    let mut builder = UnwindTraceBuilder::new(start);
    let mut instructions = Vec::new();
    let mut emulator = EmulateInstructionPpc64::new(regs, memory);

    loop {
        let pc = emulator.pc()?;
        if pc.wrapping_sub(start) >= limit {
            break;
        }
        let word = match emulator.read_instruction() {
            Ok(word) => word,
            Err(e) => {
                log::debug!("Prologue scan stopped at 0x{:016X}: {}", pc, e);
                break;
            }
        };
        match emulator.evaluate_instruction(EvaluateOptions::AUTO_ADVANCE_PC) {
            Ok(()) => {}
            Err(e) if e.is_decode_failure() => {
                log::debug!("Prologue ends at 0x{:016X}: {}", pc, e);
                break;
            }
            Err(e) => return Err(e),
        }

        let events = emulator.take_trace();
        builder.process_instruction(pc, &events);
        instructions.push(EmulatedInstruction {
            address: pc,
            word,
            name: opcode_for_instruction(word).map_or("?", |entry| entry.name),
            events,
        });
    }

    let byte_size = instructions.len() as u64 * 4;
    log::debug!(
        "Emulated {} prologue instruction(s) at 0x{:016X}",
        instructions.len(),
        start
    );
    Ok(PrologueAnalysis {
        plan: builder.finish(),
        instructions,
        byte_size,
    })
}
