//! The abstract encoder procedure produced by synthesis.
//!
//! A procedure is an ordered list of steps over an implicit encoding
//! request that accumulates ModRM, SIB, REX and VEX fields and an output
//! byte buffer. Nothing here is source text; see [`crate::render`].

use crate::env::{AddressSize, Environment};
use crate::record::RecordId;
use std::fmt;

/// Register class of a register parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegClass {
    Gpr8,
    Gpr16,
    Gpr32,
    Gpr64,
    Xmm,
    Ymm,
    Mmx,
    X87,
}

impl RegClass {
    /// The general register class of `bits` width.
    pub fn gpr(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Self::Gpr8),
            16 => Some(Self::Gpr16),
            32 => Some(Self::Gpr32),
            64 => Some(Self::Gpr64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Gpr8 => "gpr8",
            Self::Gpr16 => "gpr16",
            Self::Gpr32 => "gpr32",
            Self::Gpr64 => "gpr64",
            Self::Xmm => "xmm",
            Self::Ymm => "ymm",
            Self::Mmx => "mmx",
            Self::X87 => "x87",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Register(RegClass),
    /// An immediate of this many bits.
    Immediate(u8),
    /// A signed displacement of this many bits.
    Displacement(u8),
    /// A base register at the given address size.
    Base(AddressSize),
    /// An index register at the given address size.
    Index(AddressSize),
    /// A SIB scale factor: 1, 2, 4 or 8.
    Scale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
}

/// An encoding field set on the request before bytes are assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Mod,
    Reg,
    Rm,
    RexW,
    VexPp,
    Map,
    VexL,
    Vvvv,
}

/// A memory operand: base, optional index and scale, optional
/// displacement, all given by parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    pub asz: AddressSize,
    pub base: &'static str,
    pub index: Option<&'static str>,
    pub scale: Option<&'static str>,
    pub disp: Option<(u8, &'static str)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Const(i64),
    Param(&'static str),
    /// The encoding of a register parameter. Setting a field from a
    /// register also sets the matching REX or VEX extension bit.
    Register { class: RegClass, param: &'static str },
    /// Set ModRM.rm (and mod, and the SIB fields when needed) from an
    /// address.
    Address(Address),
}

/// A byte or prefix assembled from the fields set so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assembled {
    Rex,
    ModRm,
    Sib,
    Vex2,
    Vex3,
}

/// A condition known only when the procedure runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    /// Some REX bit is set, or a byte register needs REX to be addressable.
    RexNeeded,
    HasSib,
    /// The chosen address form needs a one-byte displacement.
    HasDisp8,
    /// The chosen address form needs a four-byte displacement.
    HasDisp32,
    /// An extension bit other than VEX.R is set.
    RexB,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Emit a literal byte.
    Byte(u8),
    Set(Field, Value),
    Emit(Assembled),
    EmitIf(Flag, Assembled),
    /// Emit an integer, little-endian.
    Int { bits: u8, value: Value, signed: bool },
    Branch {
        flag: Flag,
        then: Vec<Step>,
        otherwise: Vec<Step>,
    },
}

/// An encoder for one instruction form in one environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderProcedure {
    pub name: String,
    pub env: Environment,
    pub origin: RecordId,
    pub params: Vec<Param>,
    pub steps: Vec<Step>,
}

impl EncoderProcedure {
    pub fn new(name: impl Into<String>, env: Environment, origin: RecordId) -> Self {
        Self {
            name: name.into(),
            env,
            origin,
            params: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn param(&mut self, name: &'static str, kind: ParamKind) {
        self.params.push(Param { name, kind });
    }

    pub fn byte(&mut self, byte: u8) {
        self.steps.push(Step::Byte(byte));
    }

    pub fn set(&mut self, field: Field, value: Value) {
        self.steps.push(Step::Set(field, value));
    }

    pub fn set_const(&mut self, field: Field, value: u8) {
        self.set(field, Value::Const(value.into()));
    }

    pub fn emit(&mut self, what: Assembled) {
        self.steps.push(Step::Emit(what));
    }

    pub fn emit_if(&mut self, flag: Flag, what: Assembled) {
        self.steps.push(Step::EmitIf(flag, what));
    }

    pub fn int(&mut self, bits: u8, value: Value, signed: bool) {
        self.steps.push(Step::Int {
            bits,
            value,
            signed,
        });
    }

    pub fn branch(&mut self, flag: Flag, then: Vec<Step>, otherwise: Vec<Step>) {
        self.steps.push(Step::Branch {
            flag,
            then,
            otherwise,
        });
    }

    /// Literal bytes at the top level, in order.
    pub fn literal_bytes(&self) -> Vec<u8> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                Step::Byte(b) => Some(*b),
                _ => None,
            })
            .collect()
    }

    pub fn has_step(&self, step: &Step) -> bool {
        self.steps.contains(step)
    }
}

impl fmt::Display for Assembled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rex => "rex",
            Self::ModRm => "modrm",
            Self::Sib => "sib",
            Self::Vex2 => "vex2",
            Self::Vex3 => "vex3",
        })
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RexNeeded => "rex_needed",
            Self::HasSib => "has_sib",
            Self::HasDisp8 => "has_disp8",
            Self::HasDisp32 => "has_disp32",
            Self::RexB => "rex_b",
        })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mod => "mod",
            Self::Reg => "reg",
            Self::Rm => "rm",
            Self::RexW => "rexw",
            Self::VexPp => "vexpp",
            Self::Map => "map",
            Self::VexL => "vexl",
            Self::Vvvv => "vvvv",
        })
    }
}
