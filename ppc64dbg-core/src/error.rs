//! Error Handling
//!
//! This module provides the error type shared by the emulator, the ABI engine and the
//! entry-point resolver, built with `thiserror`.
//!
//! # Error Categories
//! - **Decode errors**: the fetched word is not in the opcode table, or a handler rejected
//!   its operands. Never fatal: the caller treats the instruction as "not understood".
//! - **Register errors**: a role is not mapped or the register context refused an access.
//! - **Memory errors**: reading or writing target memory failed. Writes that completed
//!   before the failure stay applied.
//! - **Classification errors**: a value shape the calling convention does not handle.
//! - **Target errors**: the target description or ELF image is not a 64-bit PowerPC.

use thiserror::Error;

use crate::registers::RegisterId;

/// Result alias used throughout the core.
pub type Result<T> = std::result::Result<T, DebugCoreError>;

/// Errors produced by the debugger core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebugCoreError {
    /// No opcode table entry matches the fetched word.
    #[error("Instruction decode error at {}: no opcode matches 0x{word:08X}", format_address(.address))]
    DecodeMismatch { word: u32, address: Option<u64> },

    /// The word matched a table entry but its operands are not a recognized idiom.
    #[error("Operand pattern rejected for `{mnemonic}` (0x{word:08X}): {reason}")]
    OperandPattern {
        mnemonic: &'static str,
        word: u32,
        reason: &'static str,
    },

    /// A register could not be resolved, read or written.
    #[error("Register unavailable: {register} ({reason})")]
    RegisterUnavailable { register: String, reason: String },

    /// A target memory access failed.
    #[error("Memory access error at 0x{address:016X} ({len} bytes): {reason}")]
    MemoryAccess {
        address: u64,
        len: usize,
        reason: String,
    },

    /// The calling convention does not handle this value shape.
    #[error("Unsupported: {0}")]
    UnsupportedClassification(String),

    /// A trivial call was requested with more arguments than argument registers.
    #[error("Too many arguments for a trivial call: {count} (at most {max})")]
    TooManyArguments { count: usize, max: usize },

    /// The target description cannot be handled by this core.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// An ELF image is malformed or not a 64-bit PowerPC object.
    #[error("ELF error: {0}")]
    Elf(String),
}

impl DebugCoreError {
    /// Create an operand-pattern rejection.
    pub fn operand_pattern(mnemonic: &'static str, word: u32, reason: &'static str) -> Self {
        Self::OperandPattern {
            mnemonic,
            word,
            reason,
        }
    }

    /// Create a register error for a concrete register.
    #[cold]
    pub fn register(register: RegisterId, reason: impl Into<String>) -> Self {
        Self::RegisterUnavailable {
            register: register.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a register error for a role or name that could not be resolved.
    #[cold]
    pub fn unmapped(what: impl Into<String>) -> Self {
        Self::RegisterUnavailable {
            register: what.into(),
            reason: "not mapped on this architecture".to_string(),
        }
    }

    /// Create a memory access error.
    #[cold]
    pub fn memory(address: u64, len: usize, reason: impl Into<String>) -> Self {
        Self::MemoryAccess {
            address,
            len,
            reason: reason.into(),
        }
    }

    /// Create an unsupported-classification error.
    #[cold]
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedClassification(what.into())
    }

    /// Whether this error only means "instruction not understood".
    ///
    /// Decode failures are expected while scanning a prologue and end the scan
    /// without being reported as faults.
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            Self::DecodeMismatch { .. } | Self::OperandPattern { .. }
        )
    }
}

fn format_address(address: &Option<u64>) -> String {
    match address {
        Some(addr) => format!("0x{:016X}", addr),
        None => "<invalid address>".to_string(),
    }
}
