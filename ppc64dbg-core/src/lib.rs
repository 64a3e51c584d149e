//! ppc64dbg Core
//!
//! Debugger-side machine semantics for 64-bit PowerPC:
//! - [`emulate`]: prologue/epilogue instruction emulation with context tags
//! - [`unwind`]: unwind plan model, fixed ABI plans and emulation-derived rows
//! - [`abi`]: SysV ppc64 calling convention (trivial calls, arguments, return values)
//! - [`arch`]: global/local entry-point resolution and ELF symbol loading
//!
//! Registers and memory of the inspected thread are reached through the
//! [`runtime::RegisterContext`] and [`runtime::TargetMemory`] traits.

pub mod abi;
pub mod arch;
pub mod emulate;
pub mod error;
pub mod registers;
pub mod runtime;
pub mod target;
pub mod unwind;

pub use error::{DebugCoreError, Result};
