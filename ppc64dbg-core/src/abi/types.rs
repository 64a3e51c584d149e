//! Value Classification
//!
//! The calling convention never looks at raw bytes to decide where a value lives;
//! it asks the value's type description for a [`Classification`] and works from
//! that alone.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registers::RegisterId;

/// Closed set of value shapes the calling convention distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Classification {
    /// Integer or enumeration.
    Integer { bits: u32, signed: bool },
    Pointer { bits: u32 },
    Float { bits: u32, complex: bool },
    Vector { byte_size: u64 },
    /// Structures, unions and anything else passed in memory.
    Aggregate { byte_size: u64 },
}

impl Classification {
    pub fn byte_size(&self) -> u64 {
        match *self {
            Classification::Integer { bits, .. }
            | Classification::Pointer { bits }
            | Classification::Float { bits, .. } => (bits as u64).div_ceil(8),
            Classification::Vector { byte_size } | Classification::Aggregate { byte_size } => {
                byte_size
            }
        }
    }

    /// Integer and pointer widths as read through the argument path.
    pub fn integer_bits(&self) -> Option<(u32, bool)> {
        match *self {
            Classification::Integer { bits, signed } => Some((bits, signed)),
            Classification::Pointer { bits } => Some((bits, false)),
            _ => None,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Classification::Integer { bits, signed: true } => write!(f, "i{}", bits),
            Classification::Integer { bits, signed: false } => write!(f, "u{}", bits),
            Classification::Pointer { .. } => write!(f, "ptr"),
            Classification::Float { bits, complex: false } => write!(f, "f{}", bits),
            Classification::Float { bits, complex: true } => write!(f, "complex f{}", bits),
            Classification::Vector { byte_size } => write!(f, "vector[{}]", byte_size),
            Classification::Aggregate { byte_size } => write!(f, "aggregate[{}]", byte_size),
        }
    }
}

/// Capability implemented by whatever describes a value's compile-time type.
pub trait TypeDescription {
    fn classify(&self) -> Classification;

    fn byte_size(&self) -> u64 {
        self.classify().byte_size()
    }
}

impl TypeDescription for Classification {
    fn classify(&self) -> Classification {
        *self
    }
}

/// Named C-like type, enough for CLI input and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicType {
    pub name: String,
    pub classification: Classification,
}

impl BasicType {
    pub fn new(name: impl Into<String>, classification: Classification) -> Self {
        Self {
            name: name.into(),
            classification,
        }
    }

    /// Parse `i8`..`i128`, `u8`..`u128`, `f32`, `f64`, `ptr` or `vN` (N-byte vector).
    pub fn parse(name: &str) -> Option<Self> {
        let classification = match name {
            "ptr" => Classification::Pointer { bits: 64 },
            "f32" => Classification::Float { bits: 32, complex: false },
            "f64" => Classification::Float { bits: 64, complex: false },
            _ => {
                let prefix = name.get(..1)?;
                let n: u32 = name.get(1..)?.parse().ok()?;
                match prefix {
                    "i" => Classification::Integer { bits: n, signed: true },
                    "u" => Classification::Integer { bits: n, signed: false },
                    "v" => Classification::Vector { byte_size: n as u64 },
                    _ => return None,
                }
            }
        };
        Some(Self::new(name, classification))
    }
}

impl TypeDescription for BasicType {
    fn classify(&self) -> Classification {
        self.classification
    }
}

/// Scalar held by a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Scalar {
    Signed { value: i64, bits: u32 },
    Unsigned { value: u64, bits: u32 },
    F32(f32),
    F64(f64),
}

impl Scalar {
    /// Raw register image: integers zero/sign-extended to 64 bits, floats as bits.
    pub fn as_u64(&self) -> u64 {
        match *self {
            Scalar::Signed { value, .. } => value as u64,
            Scalar::Unsigned { value, .. } => value,
            Scalar::F32(value) => value.to_bits() as u64,
            Scalar::F64(value) => value.to_bits(),
        }
    }

    pub fn as_i64(&self) -> i64 {
        match *self {
            Scalar::Signed { value, .. } => value,
            Scalar::Unsigned { value, .. } => value as i64,
            Scalar::F32(value) => value as i64,
            Scalar::F64(value) => value as i64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Signed { value, .. } => value as f64,
            Scalar::Unsigned { value, .. } => value as f64,
            Scalar::F32(value) => value as f64,
            Scalar::F64(value) => value,
        }
    }

    /// Interpret the low `bits` of `raw`, sign-extending when `signed`.
    pub fn from_raw(raw: u64, bits: u32, signed: bool) -> Self {
        let shift = 64 - bits.clamp(1, 64);
        if signed {
            Scalar::Signed {
                value: ((raw << shift) as i64) >> shift,
                bits,
            }
        } else {
            Scalar::Unsigned {
                value: (raw << shift) >> shift,
                bits,
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Scalar::Signed { value, .. } => write!(f, "{}", value),
            Scalar::Unsigned { value, .. } => write!(f, "{:#x}", value),
            Scalar::F32(value) => write!(f, "{}", value),
            Scalar::F64(value) => write!(f, "{}", value),
        }
    }
}

/// Where a resolved argument was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArgumentLocation {
    Register(RegisterId),
    Stack { address: u64, size: usize },
}

/// One requested argument; `value` and `location` are filled in once resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentSlot {
    pub ty: Classification,
    pub value: Option<Scalar>,
    pub location: Option<ArgumentLocation>,
}

impl ArgumentSlot {
    pub fn new(ty: &dyn TypeDescription) -> Self {
        Self {
            ty: ty.classify(),
            value: None,
            location: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.value.is_some()
    }
}

/// A value to install as a function's return value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypedValue {
    /// `None` when the value carries no type information.
    pub classification: Option<Classification>,
    pub scalar: Scalar,
}

impl TypedValue {
    pub fn new(ty: &dyn TypeDescription, scalar: Scalar) -> Self {
        Self {
            classification: Some(ty.classify()),
            scalar,
        }
    }

    pub fn untyped(scalar: Scalar) -> Self {
        Self {
            classification: None,
            scalar,
        }
    }
}

/// A decoded return value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReturnValue {
    Scalar(Scalar),
    /// Raw bytes in target memory order (vector returns).
    Bytes(Vec<u8>),
}

impl ReturnValue {
    pub fn scalar(&self) -> Option<Scalar> {
        match self {
            ReturnValue::Scalar(scalar) => Some(*scalar),
            ReturnValue::Bytes(_) => None,
        }
    }
}
