//! Target Specification
//!
//! This module describes the inspected target: which PowerPC flavour it is, its byte
//! order and the object format its modules were loaded from. A `TargetSpec` can be
//! loaded from JSON so front ends can override the defaults.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{DebugCoreError, Result};

/// Target architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetArch {
    /// 64-bit big-endian PowerPC
    Ppc64,
    /// 64-bit little-endian PowerPC (default)
    Ppc64le,
    /// 32-bit PowerPC (not handled by this core)
    PowerPc,
}

/// Object file format of the module being inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectFormat {
    Elf,
    MachO,
    Coff,
    Unknown,
}

/// Byte order of target memory and registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Decode an unsigned integer of `bytes.len()` (1..=8) bytes.
    #[inline]
    pub fn read_uint(self, bytes: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        let len = bytes.len().min(8);
        match self {
            ByteOrder::Little => {
                buf[..len].copy_from_slice(&bytes[..len]);
                u64::from_le_bytes(buf)
            }
            ByteOrder::Big => {
                buf[8 - len..].copy_from_slice(&bytes[..len]);
                u64::from_be_bytes(buf)
            }
        }
    }

    /// Encode the low `size` (1..=8) bytes of `value`.
    #[inline]
    pub fn uint_bytes(self, value: u64, size: usize) -> SmallVec<[u8; 8]> {
        let size = size.min(8);
        match self {
            ByteOrder::Little => SmallVec::from_slice(&value.to_le_bytes()[..size]),
            ByteOrder::Big => SmallVec::from_slice(&value.to_be_bytes()[8 - size..]),
        }
    }
}

/// Target specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Target architecture
    pub arch: TargetArch,
    /// Object format of the main module
    pub object_format: ObjectFormat,
    /// OS (if applicable)
    #[serde(default)]
    pub os: Option<String>,
}

impl TargetSpec {
    pub fn ppc64le_elf() -> Self {
        Self {
            arch: TargetArch::Ppc64le,
            object_format: ObjectFormat::Elf,
            os: Some("linux".to_string()),
        }
    }

    pub fn byte_order(&self) -> ByteOrder {
        match self.arch {
            TargetArch::Ppc64le => ByteOrder::Little,
            TargetArch::Ppc64 | TargetArch::PowerPc => ByteOrder::Big,
        }
    }

    /// Parse a target specification from JSON and validate it.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let spec: TargetSpec = serde_json::from_str(text)?;
        validate_target(&spec)?;
        Ok(spec)
    }
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self::ppc64le_elf()
    }
}

/// Validate target specification.
pub fn validate_target(target: &TargetSpec) -> Result<()> {
    match target.arch {
        TargetArch::Ppc64 | TargetArch::Ppc64le => Ok(()),
        TargetArch::PowerPc => Err(DebugCoreError::InvalidTarget(
            "32-bit PowerPC is not a ppc64 target".to_string(),
        )),
    }
}
