//! Prologue/Epilogue Instruction Emulation
//!
//! This module emulates the handful of ppc64 instructions compilers use to build and
//! tear down stack frames. It is not a general-purpose emulator: anything outside
//! the opcode table, or inside it but with an unusual operand pattern, fails closed
//! and leaves registers and memory untouched.
//!
//! # Session Model
//! An [`EmulateInstructionPpc64`] borrows one thread's register context and the
//! process memory for the duration of a single analysis pass:
//! 1. [`read_instruction`](EmulateInstructionPpc64::read_instruction) fetches the word at PC
//! 2. [`evaluate_instruction`](EmulateInstructionPpc64::evaluate_instruction) dispatches it
//!    through [`opcodes::OPCODES`]
//! 3. every register or memory mutation is tagged with a [`ContextTag`] and recorded in
//!    the session trace, which [`crate::unwind::trace`] turns into unwind rows

pub mod handlers;
pub mod opcodes;

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::{DebugCoreError, Result};
use crate::registers::{GenericRegister, RegisterId};
use crate::runtime::{RegisterContext, TargetMemory};
use crate::unwind::UnwindPlan;

pub use opcodes::{opcode_for_instruction, OpcodeEntry, OpcodeId, OPCODES};

/// Structural role of a mutation performed by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContextType {
    ReadOpcode,
    AdvancePc,
    WriteRegisterRandomBits,
    PushRegisterOnStack,
    RestoreStackPointer,
    AdjustStackPointer,
    SetFramePointer,
}

/// Operands a context tag refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContextInfo {
    NoArgs,
    Register(RegisterId),
    RegisterPlusOffset {
        reg: RegisterId,
        offset: i64,
    },
    RegisterToRegisterPlusOffset {
        data_reg: RegisterId,
        base_reg: RegisterId,
        offset: i64,
    },
}

/// Context tag attached to every emulated access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextTag {
    pub kind: ContextType,
    pub info: ContextInfo,
}

impl ContextTag {
    pub fn new(kind: ContextType, info: ContextInfo) -> Self {
        Self { kind, info }
    }

    pub fn no_args(kind: ContextType) -> Self {
        Self::new(kind, ContextInfo::NoArgs)
    }
}

/// What an emulated access did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Access {
    ReadMemory { address: u64, len: usize },
    WriteMemory { address: u64, len: usize, value: u64 },
    WriteRegister { reg: RegisterId, value: u64 },
}

/// One entry of the emulation trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EmulationEvent {
    /// Address of the instruction being emulated.
    pub instruction: Option<u64>,
    pub context: ContextTag,
    pub access: Access,
}

/// Instruction classes an emulator may be asked to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionType {
    Any,
    PrologueEpilogue,
    PcModifying,
    All,
}

/// Options for [`EmulateInstructionPpc64::evaluate_instruction`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluateOptions {
    /// Advance PC by 4 after a successful handler that did not move it.
    pub auto_advance_pc: bool,
}

impl EvaluateOptions {
    pub const AUTO_ADVANCE_PC: EvaluateOptions = EvaluateOptions {
        auto_advance_pc: true,
    };
}

/// Prologue/epilogue emulator for one analysis session.
pub struct EmulateInstructionPpc64<'a> {
    regs: &'a mut dyn RegisterContext,
    memory: &'a mut dyn TargetMemory,
    opcode: Option<u32>,
    addr: Option<u64>,
    /// Frame pointer register latched by `mr r30/r31, r1`; set at most once.
    fp: Option<RegisterId>,
    trace: SmallVec<[EmulationEvent; 8]>,
}

impl<'a> EmulateInstructionPpc64<'a> {
    pub fn new(regs: &'a mut dyn RegisterContext, memory: &'a mut dyn TargetMemory) -> Self {
        Self {
            regs,
            memory,
            opcode: None,
            addr: None,
            fp: None,
            trace: SmallVec::new(),
        }
    }

    pub fn supports_instruction_type(kind: InstructionType) -> bool {
        matches!(kind, InstructionType::Any | InstructionType::PrologueEpilogue)
    }

    /// Fetch the 4-byte instruction at PC.
    ///
    /// # Errors
    /// Returns error if PC cannot be read or the word cannot be fetched; the current
    /// instruction address is invalidated in both cases.
    pub fn read_instruction(&mut self) -> Result<u32> {
        self.addr = None;
        self.opcode = None;

        let pc_reg = self.regs.resolve_generic(GenericRegister::Pc)?;
        let pc = self.regs.read_register_unsigned(pc_reg)?;

        let tag = ContextTag::no_args(ContextType::ReadOpcode);
        let word = self.read_memory_unsigned(tag, pc, 4)? as u32;
        self.addr = Some(pc);
        self.opcode = Some(word);
        Ok(word)
    }

    /// Use `word` as the current instruction without touching memory.
    pub fn set_instruction(&mut self, word: u32, address: u64) {
        self.opcode = Some(word);
        self.addr = Some(address);
    }

    pub fn opcode(&self) -> Option<u32> {
        self.opcode
    }

    pub fn address(&self) -> Option<u64> {
        self.addr
    }

    /// Frame pointer register latched during this session, if any.
    pub fn frame_pointer(&self) -> Option<RegisterId> {
        self.fp
    }

    pub fn trace(&self) -> &[EmulationEvent] {
        &self.trace
    }

    /// Drain the recorded events.
    pub fn take_trace(&mut self) -> Vec<EmulationEvent> {
        self.trace.drain(..).collect()
    }

    /// Current program counter.
    pub fn pc(&self) -> Result<u64> {
        self.regs.pc()
    }

    /// Execute the current instruction.
    ///
    /// # Algorithm
    /// 1. Look the word up in the opcode table (first match wins)
    /// 2. With `auto_advance_pc`, remember PC
    /// 3. Run the handler; a rejection is reported as-is, with no state change
    /// 4. With `auto_advance_pc`, write PC + 4 if the handler left PC unchanged
    ///
    /// # Errors
    /// `DecodeMismatch` if no entry matches, `OperandPattern` if the handler rejected the
    /// operands, register/memory errors if an access failed mid-way.
    pub fn evaluate_instruction(&mut self, options: EvaluateOptions) -> Result<()> {
        let word = self.opcode.ok_or(DebugCoreError::DecodeMismatch {
            word: 0,
            address: self.addr,
        })?;
        let entry = opcode_for_instruction(word).ok_or(DebugCoreError::DecodeMismatch {
            word,
            address: self.addr,
        })?;

        let pc_reg = self.regs.resolve_generic(GenericRegister::Pc)?;
        let orig_pc = if options.auto_advance_pc {
            Some(self.regs.read_register_unsigned(pc_reg)?)
        } else {
            None
        };

        match entry.handler {
            OpcodeId::Mfspr => self.emulate_mfspr(word)?,
            OpcodeId::Std => self.emulate_std(word)?,
            OpcodeId::Or => self.emulate_or(word)?,
            OpcodeId::Addi => self.emulate_addi(word)?,
            OpcodeId::Ld => self.emulate_ld(word)?,
        }

        if let Some(orig_pc) = orig_pc {
            let new_pc = self.regs.read_register_unsigned(pc_reg)?;
            if new_pc == orig_pc {
                let tag = ContextTag::no_args(ContextType::AdvancePc);
                self.write_register(tag, pc_reg, orig_pc.wrapping_add(4))?;
            }
        }
        Ok(())
    }

    /// Function-entry unwind plan in native register numbering.
    pub fn create_function_entry_unwind() -> UnwindPlan {
        crate::unwind::function_entry_plan_native()
    }

    pub(crate) fn read_register(&self, reg: RegisterId) -> Result<u64> {
        self.regs.read_register_unsigned(reg)
    }

    pub(crate) fn write_register(&mut self, tag: ContextTag, reg: RegisterId, value: u64) -> Result<()> {
        self.regs.write_register_unsigned(reg, value)?;
        self.trace.push(EmulationEvent {
            instruction: self.addr,
            context: tag,
            access: Access::WriteRegister { reg, value },
        });
        Ok(())
    }

    pub(crate) fn read_memory_unsigned(&mut self, tag: ContextTag, address: u64, len: usize) -> Result<u64> {
        let value = self.memory.read_unsigned(address, len)?;
        self.trace.push(EmulationEvent {
            instruction: self.addr,
            context: tag,
            access: Access::ReadMemory { address, len },
        });
        Ok(value)
    }

    pub(crate) fn write_memory_unsigned(
        &mut self,
        tag: ContextTag,
        address: u64,
        value: u64,
        len: usize,
    ) -> Result<()> {
        self.memory.write_unsigned(address, value, len)?;
        self.trace.push(EmulationEvent {
            instruction: self.addr,
            context: tag,
            access: Access::WriteMemory {
                address,
                len,
                value,
            },
        });
        Ok(())
    }
}
