//! SysV ppc64 Calling Convention
//!
//! This module implements the parts of the 64-bit PowerPC ELF ABI a debugger needs to
//! call functions in the inferior and to inspect values crossing a call boundary.
//!
//! # Stack Frame at a Call
//! ```text
//!   sp + 48   first stack-passed argument
//!   sp + 16   saved LR (return address)
//!   sp + 8    saved CR
//!   sp + 0    back chain (caller's SP)
//! ```
//!
//! # Register Usage
//! - **Arguments**: r3-r10 (generic `Arg(1)`..`Arg(8)`); argument extraction only reads
//!   the first six of them and continues on the stack
//! - **Integer/pointer return**: r3
//! - **Floating-point return**: f1
//! - **Vector return**: v2
//!
//! # API Reference
//!
//! ```rust,no_run
//! use ppc64dbg_core::abi::AbiSysVPpc64;
//! use ppc64dbg_core::runtime::{CpuContext, MemoryManager};
//! use ppc64dbg_core::target::ByteOrder;
//!
//! let abi = AbiSysVPpc64::new();
//! let mut regs = CpuContext::new();
//! let mut memory = MemoryManager::new(ByteOrder::Little);
//! memory.map_region(0x7FFF_0000, 0x1_0000, true);
//! abi.prepare_trivial_call(&mut regs, &mut memory, 0x7FFF_FFF0, 0x2000, 0x3000, &[1, 2, 3])?;
//! # Ok::<(), ppc64dbg_core::error::DebugCoreError>(())
//! ```

pub mod types;

use crate::error::{DebugCoreError, Result};
use crate::registers::{
    self, GenericRegister, RegisterId, RegisterInfo, F1, R3, REGISTER_INFOS, V2,
};
use crate::runtime::{RegisterContext, RegisterValue, TargetMemory};
use crate::target::{TargetArch, TargetSpec};
use crate::unwind::{self, UnwindPlan};

pub use types::{
    ArgumentLocation, ArgumentSlot, BasicType, Classification, ReturnValue, Scalar,
    TypeDescription, TypedValue,
};

/// Bytes below SP a leaf function may use without allocating a frame.
pub const RED_ZONE_SIZE: u64 = 224;
/// Arguments a trivial call can pass in registers.
pub const MAX_TRIVIAL_CALL_ARGS: usize = 8;
/// Argument registers read back by [`AbiSysVPpc64::get_argument_values`].
pub const ARGUMENT_REGISTERS_READ: usize = 6;
/// Minimum call frame reserved by a trivial call.
pub const MIN_FRAME_SIZE: u64 = 32;
/// Distance from SP to the first stack-passed argument.
pub const STACK_ARGUMENT_OFFSET: u64 = 48;

const RETURN_ADDRESS_SLOT: u64 = 16;

/// SysV ppc64 ABI engine. Stateless; every call works on the context it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiSysVPpc64;

impl AbiSysVPpc64 {
    pub fn new() -> Self {
        Self
    }

    /// ABI instance for `target`, or `None` if it is not a 64-bit PowerPC.
    pub fn create(target: &TargetSpec) -> Option<Self> {
        matches!(target.arch, TargetArch::Ppc64 | TargetArch::Ppc64le).then_some(Self)
    }

    pub fn red_zone_size(&self) -> u64 {
        RED_ZONE_SIZE
    }

    /// Set up registers and stack so that resuming the thread calls `func_addr`.
    ///
    /// # Algorithm
    /// 1. Write each argument into `Arg(i + 1)`
    /// 2. Align `sp` down to 16 bytes and reserve the minimum frame
    /// 3. Store `return_addr` in the LR save slot and the current SP as back chain
    /// 4. Write SP, then PC
    ///
    /// # Errors
    /// `TooManyArguments` for more than 8 arguments; otherwise the first failing
    /// register or memory access. Earlier writes are not rolled back.
    pub fn prepare_trivial_call(
        &self,
        regs: &mut dyn RegisterContext,
        memory: &mut dyn TargetMemory,
        sp: u64,
        func_addr: u64,
        return_addr: u64,
        args: &[u64],
    ) -> Result<()> {
        log::debug!(
            "prepare_trivial_call (sp = 0x{:x}, func_addr = 0x{:x}, return_addr = 0x{:x}, args = {:x?})",
            sp,
            func_addr,
            return_addr,
            args
        );

        if args.len() > MAX_TRIVIAL_CALL_ARGS {
            return Err(DebugCoreError::TooManyArguments {
                count: args.len(),
                max: MAX_TRIVIAL_CALL_ARGS,
            });
        }

        for (i, &arg) in args.iter().enumerate() {
            let reg = regs.resolve_generic(GenericRegister::Arg(i as u8 + 1))?;
            log::debug!("About to write arg{} (0x{:x}) into {}", i + 1, arg, reg);
            regs.write_register_unsigned(reg, arg)?;
        }

        log::debug!("16-byte aligning SP: 0x{:x} to 0x{:x}", sp, sp & !0xf);
        let sp = (sp & !0xf).wrapping_sub(MIN_FRAME_SIZE);

        let pc_reg = regs.resolve_generic(GenericRegister::Pc)?;
        let sp_reg = regs.resolve_generic(GenericRegister::Sp)?;

        log::debug!("Pushing the return address onto the stack: 0x{:x}: 0x{:x}", sp, return_addr);
        memory.write_pointer(sp.wrapping_add(RETURN_ADDRESS_SLOT), return_addr)?;

        let back_chain = regs.read_register_unsigned(sp_reg)?;
        memory.write_pointer(sp, back_chain)?;

        log::debug!("Writing SP: 0x{:x}", sp);
        regs.write_register_unsigned(sp_reg, sp)?;

        log::debug!("Writing PC: 0x{:x}", func_addr);
        regs.write_register_unsigned(pc_reg, func_addr)
    }

    /// Resolve integer and pointer arguments at a function's entry.
    ///
    /// The first six integer-like slots come from `Arg(1)`..`Arg(6)`, the rest from the
    /// stack starting at `SP + 48`. Float, vector and aggregate slots are left
    /// unresolved and do not consume a register or stack slot.
    ///
    /// # Errors
    /// Zero SP, a register or memory failure, or an integer wider than 64 bits. The
    /// stack cursor does not move for a rejected slot.
    pub fn get_argument_values(
        &self,
        regs: &dyn RegisterContext,
        memory: &dyn TargetMemory,
        values: &mut [ArgumentSlot],
    ) -> Result<()> {
        let sp = regs.sp()?;
        if sp == 0 {
            return Err(DebugCoreError::register(registers::SP, "stack pointer is zero"));
        }

        let mut argument_registers = [RegisterId(0); ARGUMENT_REGISTERS_READ];
        for (i, slot) in argument_registers.iter_mut().enumerate() {
            *slot = regs.resolve_generic(GenericRegister::Arg(i as u8 + 1))?;
        }

        let mut cursor = ArgumentCursor {
            next_register: 0,
            stack: sp.wrapping_add(STACK_ARGUMENT_OFFSET),
        };

        for slot in values.iter_mut() {
            let Some((bits, signed)) = slot.ty.integer_bits() else {
                continue;
            };
            if bits > 64 {
                return Err(DebugCoreError::unsupported(format!(
                    "{}-bit integer argument",
                    bits
                )));
            }

            let (raw, location) = if cursor.next_register < ARGUMENT_REGISTERS_READ {
                let reg = argument_registers[cursor.next_register];
                cursor.next_register += 1;
                (regs.read_register_unsigned(reg)?, ArgumentLocation::Register(reg))
            } else {
                let size = bits.div_ceil(8) as usize;
                let raw = memory.read_unsigned(cursor.stack, size)?;
                let location = ArgumentLocation::Stack {
                    address: cursor.stack,
                    size,
                };
                cursor.stack = cursor.stack.wrapping_add(size as u64);
                (raw, location)
            };

            // unsigned values are truncated to their width too; conforming callers
            // zero-extend, so the upper register bits are always clear
            slot.value = Some(Scalar::from_raw(raw, bits, signed));
            slot.location = Some(location);
        }
        Ok(())
    }

    /// Install `value` as the current frame's return value.
    ///
    /// # Errors
    /// Untyped values, integers wider than 64 bits, complex or wide floats and
    /// every other shape are rejected with `UnsupportedClassification`.
    pub fn set_return_value_object(
        &self,
        regs: &mut dyn RegisterContext,
        value: &TypedValue,
    ) -> Result<()> {
        let classification = value
            .classification
            .ok_or_else(|| DebugCoreError::unsupported("return value has no type"))?;

        match classification {
            Classification::Integer { .. } | Classification::Pointer { .. } => {
                if classification.byte_size() > 8 {
                    return Err(DebugCoreError::unsupported("integer return > 64 bits"));
                }
                let r3 = regs.resolve_name("r3")?;
                let raw = value.scalar.as_u64();
                let raw = match classification.byte_size() {
                    8 => raw,
                    n => raw & ((1u64 << (n * 8)) - 1),
                };
                log::debug!("Writing return value 0x{:x} into {}", raw, r3);
                regs.write_register_unsigned(r3, raw)
            }
            Classification::Float { complex: true, .. } => {
                Err(DebugCoreError::unsupported("complex float return"))
            }
            Classification::Float { bits, .. } if bits > 64 => {
                Err(DebugCoreError::unsupported("float return > 64 bits"))
            }
            Classification::Float { .. } => {
                // FPRs hold single-precision values in double format
                let f1 = regs.resolve_name("f1")?;
                let bits = value.scalar.as_f64().to_bits();
                log::debug!("Writing return value {} into {}", value.scalar, f1);
                regs.write_register(f1, RegisterValue::U64(bits))
            }
            Classification::Vector { .. } | Classification::Aggregate { .. } => Err(
                DebugCoreError::unsupported(format!("return value of shape {}", classification)),
            ),
        }
    }

    /// Decode the return value of a function that just returned.
    ///
    /// Returns `None` for shapes this path does not handle or if a register
    /// cannot be read. A 4-byte float is read from `f1` as a double and narrowed,
    /// not reinterpreted from the low 32 register bits.
    pub fn get_return_value_object_simple(
        &self,
        regs: &dyn RegisterContext,
        ty: &dyn TypeDescription,
    ) -> Option<ReturnValue> {
        match ty.classify() {
            Classification::Integer { signed, .. } => {
                let byte_size = ty.byte_size();
                if !matches!(byte_size, 1 | 2 | 4 | 8) {
                    return None;
                }
                let raw = regs.read_register_unsigned(R3).ok()?;
                let scalar = Scalar::from_raw(raw, (byte_size * 8) as u32, signed);
                Some(ReturnValue::Scalar(scalar))
            }
            Classification::Float { complex: false, .. } => {
                let raw = regs.read_register(F1).ok()?.as_u64();
                let value = f64::from_bits(raw);
                match ty.byte_size() {
                    4 => Some(ReturnValue::Scalar(Scalar::F32(value as f32))),
                    8 => Some(ReturnValue::Scalar(Scalar::F64(value))),
                    _ => None,
                }
            }
            Classification::Pointer { .. } => {
                let raw = regs.read_register_unsigned(R3).ok()?;
                Some(ReturnValue::Scalar(Scalar::Unsigned { value: raw, bits: 64 }))
            }
            Classification::Vector { byte_size } => {
                let capacity = V2.info()?.byte_size as u64;
                if byte_size == 0 || byte_size > capacity {
                    return None;
                }
                match regs.read_register(V2).ok()? {
                    RegisterValue::Vector(bytes) => {
                        Some(ReturnValue::Bytes(bytes[..byte_size as usize].to_vec()))
                    }
                    RegisterValue::U64(_) => None,
                }
            }
            Classification::Float { complex: true, .. } | Classification::Aggregate { .. } => None,
        }
    }

    /// Unwind plan valid at the first instruction of any function.
    pub fn create_function_entry_unwind_plan(&self) -> UnwindPlan {
        unwind::function_entry_plan()
    }

    /// Fallback unwind plan for frames without unwind info.
    pub fn create_default_unwind_plan(&self) -> UnwindPlan {
        unwind::default_plan()
    }

    pub fn register_is_callee_saved(&self, reg: RegisterId) -> bool {
        registers::register_is_callee_saved(reg)
    }

    pub fn register_is_volatile(&self, reg: RegisterId) -> bool {
        registers::register_is_volatile(reg)
    }

    pub fn get_register_info_array(&self) -> &'static [RegisterInfo] {
        &REGISTER_INFOS
    }
}

struct ArgumentCursor {
    next_register: usize,
    stack: u64,
}
