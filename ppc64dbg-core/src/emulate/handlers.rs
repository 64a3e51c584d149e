//! Semantic handlers, one per opcode table entry.
//!
//! Each handler checks its operand pattern before touching any state; a rejected
//! pattern returns `OperandPattern` and the session is left exactly as it was.

use super::opcodes::{DForm, DsForm, XForm, XfxForm};
use super::{ContextInfo, ContextTag, ContextType, EmulateInstructionPpc64};
use crate::error::{DebugCoreError, Result};
use crate::registers::{RegisterId, LR, R0, R1, R30, R31};

impl<'a> EmulateInstructionPpc64<'a> {
    /// `mfspr r0, lr` (`mflr r0`).
    pub(super) fn emulate_mfspr(&mut self, word: u32) -> Result<()> {
        let inst = XfxForm::decode(word);
        if inst.rt != 0 || inst.spr != XfxForm::SPR_LR {
            return Err(DebugCoreError::operand_pattern(
                "mfspr",
                word,
                "only mfspr r0, lr is tracked",
            ));
        }
        log::debug!("{}: mfspr r0, lr", self.location());

        let lr = self.read_register(LR)?;
        let tag = ContextTag::new(ContextType::WriteRegisterRandomBits, ContextInfo::Register(LR));
        self.write_register(tag, R0, lr)
    }

    /// `std`/`stdu` of r1, r30, r31 or LR (through r0) relative to r1.
    pub(super) fn emulate_std(&mut self, word: u32) -> Result<()> {
        let inst = DsForm::decode(word);
        let mnemonic = if inst.update() { "stdu" } else { "std" };

        if inst.ra != 1 {
            return Err(DebugCoreError::operand_pattern(mnemonic, word, "base register is not r1"));
        }
        if !matches!(inst.rs, 0 | 1 | 30 | 31) {
            return Err(DebugCoreError::operand_pattern(
                mnemonic,
                word,
                "only r1, r30, r31 and saved LR stores are tracked",
            ));
        }

        let rs = RegisterId::gpr(inst.rs);
        let value = self.read_register(rs)?;

        // r0 only counts when it still holds the LR value copied by mflr
        let mut data_reg = rs;
        if rs == R0 {
            let lr = self.read_register(LR)?;
            if lr != value {
                return Err(DebugCoreError::operand_pattern(
                    mnemonic,
                    word,
                    "r0 does not hold the link register",
                ));
            }
            data_reg = LR;
        }

        log::debug!(
            "{}: {} r{}, {}(r{})",
            self.location(),
            mnemonic,
            inst.rs,
            inst.ds,
            inst.ra
        );

        let base = self.read_register(R1)?;
        let addr = base.wrapping_add(inst.ds as i64 as u64);
        let tag = ContextTag::new(
            ContextType::PushRegisterOnStack,
            ContextInfo::RegisterToRegisterPlusOffset {
                data_reg,
                base_reg: R1,
                offset: inst.ds as i64,
            },
        );
        self.write_memory_unsigned(tag, addr, value, 8)?;

        if inst.update() {
            let tag = ContextTag::new(
                ContextType::AdjustStackPointer,
                ContextInfo::RegisterPlusOffset {
                    reg: R1,
                    offset: inst.ds as i64,
                },
            );
            self.write_register(tag, R1, addr)?;
        }
        Ok(())
    }

    /// `mr r30, r1` / `mr r31, r1`, the frame pointer set-up.
    pub(super) fn emulate_or(&mut self, word: u32) -> Result<()> {
        let inst = XForm::decode(word);
        if let Some(fp) = self.fp {
            log::debug!("{}: frame pointer already latched in {}", self.location(), fp);
            return Err(DebugCoreError::operand_pattern(
                "or",
                word,
                "frame pointer already set in this session",
            ));
        }
        if inst.rs != inst.rb || inst.rb != 1 || !matches!(inst.ra, 30 | 31) {
            return Err(DebugCoreError::operand_pattern(
                "or",
                word,
                "only mr r30, r1 and mr r31, r1 are tracked",
            ));
        }
        log::debug!("{}: mr r{}, r{}", self.location(), inst.ra, inst.rb);

        let fp = if inst.ra == 30 { R30 } else { R31 };
        let sp = self.read_register(R1)?;
        let tag = ContextTag::new(ContextType::SetFramePointer, ContextInfo::Register(fp));
        self.write_register(tag, fp, sp)?;
        self.fp = Some(fp);
        Ok(())
    }

    /// `ld r1, 0(r1)`, restoring SP from the back chain.
    pub(super) fn emulate_ld(&mut self, word: u32) -> Result<()> {
        let inst = DsForm::decode(word);
        if inst.ra != 1 || inst.rs != 1 || inst.ds != 0 {
            return Err(DebugCoreError::operand_pattern(
                "ld",
                word,
                "only ld r1, 0(r1) is tracked",
            ));
        }
        log::debug!("{}: ld r1, 0(r1)", self.location());

        let sp = self.read_register(R1)?;
        let tag = ContextTag::new(
            ContextType::RestoreStackPointer,
            ContextInfo::RegisterToRegisterPlusOffset {
                data_reg: R1,
                base_reg: R1,
                offset: 0,
            },
        );
        let back_chain = self.read_memory_unsigned(tag, sp, 8)?;
        self.write_register(tag, R1, back_chain)
    }

    /// `addi r1, r1, SI`, a stack pointer adjustment.
    pub(super) fn emulate_addi(&mut self, word: u32) -> Result<()> {
        let inst = DForm::decode(word);
        if inst.rt != 1 || inst.ra != 1 {
            return Err(DebugCoreError::operand_pattern(
                "addi",
                word,
                "only addi r1, r1, SI is tracked",
            ));
        }
        log::debug!("{}: addi r1, r1, {}", self.location(), inst.si);

        let sp = self.read_register(R1)?;
        let tag = ContextTag::new(
            ContextType::RestoreStackPointer,
            ContextInfo::RegisterPlusOffset {
                reg: R1,
                offset: inst.si as i64,
            },
        );
        self.write_register(tag, R1, sp.wrapping_add(inst.si as i64 as u64))
    }

    fn location(&self) -> String {
        match self.addr {
            Some(addr) => format!("0x{:016X}", addr),
            None => "<no address>".to_string(),
        }
    }
}
