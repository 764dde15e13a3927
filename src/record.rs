//! The instruction record: one concrete instruction form read from the
//! pattern database, with every derived attribute present from construction.

use crate::env::Mode;
use crate::operand::OperandDescriptor;
use crate::shape::Shape;
use indexmap::IndexMap;
use std::fmt;

/// Index of a record in its [`Database`](crate::reader::Database).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EncodingSpace {
    #[default]
    Legacy,
    Vex,
    Evex,
    /// The EVEX-like encoding of the Knights Corner coprocessor.
    EvexU0,
    Xop,
}

impl fmt::Display for EncodingSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Legacy => "legacy",
            Self::Vex => "vex",
            Self::Evex => "evex",
            Self::EvexU0 => "evex.u0",
            Self::Xop => "xop",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ModeRestriction {
    #[default]
    Any,
    Not64,
    Only16,
    Only32,
    Only64,
}

impl ModeRestriction {
    /// Whether an instruction with this restriction exists in `mode`.
    pub fn allows(self, mode: Mode) -> bool {
        match self {
            Self::Any => true,
            Self::Not64 => mode != Mode::M64,
            Self::Only16 => mode == Mode::M16,
            Self::Only32 => mode == Mode::M32,
            Self::Only64 => mode == Mode::M64,
        }
    }

    /// Tag used in the summary report.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Any => "mall",
            Self::Not64 => "mnot64",
            Self::Only16 => "m16",
            Self::Only32 => "m32",
            Self::Only64 => "m64",
        }
    }
}

/// Effective address size demanded by the pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AddressSizeClass {
    #[default]
    All,
    A16,
    A32,
    A64,
    Not16,
}

impl fmt::Display for AddressSizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "aszall",
            Self::A16 => "a16",
            Self::A32 => "a32",
            Self::A64 => "a64",
            Self::Not16 => "asznot16",
        })
    }
}

/// Effective operand size demanded by the pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OperandSizeClass {
    #[default]
    All,
    O16,
    O32,
    O64,
    Not16,
    Not64,
}

impl fmt::Display for OperandSizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::All => "oszall",
            Self::O16 => "o16",
            Self::O32 => "o32",
            Self::O64 => "o64",
            Self::Not16 => "osznot16",
            Self::Not64 => "osznot64",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RexW {
    #[default]
    Unspecified,
    Zero,
    One,
}

/// A fixed requirement on one ModRM field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ModrmField {
    #[default]
    Unspecified,
    Value(u8),
    /// `mod` is one of the memory forms 0, 1 or 2.
    AnyMemory,
}

impl ModrmField {
    pub fn value(self) -> Option<u8> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_specified(self) -> bool {
        self != Self::Unspecified
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VectorLength {
    #[default]
    NotApplicable,
    L128,
    L256,
    L512,
    /// VEX.L is ignored.
    Ignored,
    /// EVEX.L'L is ignored.
    IgnoredEvex,
}

impl fmt::Display for VectorLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotApplicable => "n/a",
            Self::L128 => "128",
            Self::L256 => "256",
            Self::L512 => "512",
            Self::Ignored => "LIG",
            Self::IgnoredEvex => "LLIG",
        })
    }
}

/// Width of the first immediate operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ImmediateSize {
    #[default]
    None,
    Byte,
    Word,
    Dword,
    /// 16 or 32 bits with the operand size.
    Z,
    /// 16, 32 or 64 bits with the operand size.
    V,
}

impl ImmediateSize {
    pub fn code(self) -> char {
        match self {
            Self::None => '0',
            Self::Byte => '1',
            Self::Word => '2',
            Self::Dword => '4',
            Self::Z => 'z',
            Self::V => 'v',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Immediates {
    pub size: ImmediateSize,
    pub has_imm8: bool,
    pub has_immz: bool,
    /// A second 8-bit immediate (`IMM1`).
    pub has_imm8_2: bool,
}

/// Vector-index memory addressing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Vsib {
    AvxXmm,
    AvxYmm,
    Avx512Xmm,
    Avx512Ymm,
    Avx512Zmm,
}

impl Vsib {
    /// Suffix appended to the memory operand in the summary report.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Avx512Xmm => "-uvx",
            Self::Avx512Ymm => "-uvy",
            Self::Avx512Zmm => "-uvz",
            Self::AvxXmm => "-vx",
            Self::AvxYmm => "-nvy",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct WriteMasking {
    pub enabled: bool,
    /// k0 may not be used as the mask.
    pub not_k0: bool,
    /// Zeroing is not allowed.
    pub merging_only: bool,
}

/// Legacy prefixes that are part of the instruction's identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RequiredPrefixes {
    pub lock: bool,
    pub f2: bool,
    pub f3: bool,
    pub osz: bool,
    pub none_allowed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct InstructionRecord {
    // Fields read from the database.
    pub iclass: String,
    pub iform: String,
    pub uname: Option<String>,
    pub version: Option<u32>,
    /// The non-terminal group the record was declared under.
    pub nonterminal: String,
    pub extension: String,
    pub isa_set: String,
    pub category: String,
    pub attributes: String,
    pub comment: String,
    pub cpl: Option<String>,
    pub real_opcode: bool,
    pub pattern: String,
    pub operands_text: String,
    pub operands: Vec<OperandDescriptor>,
    /// Remaining `KEY: value` fields, in input order.
    pub extra: IndexMap<String, String>,

    // Attributes derived from the pattern.
    pub space: EncodingSpace,
    pub map: u8,
    pub opcode: u8,
    pub partial_opcode: bool,
    pub prefixes: RequiredPrefixes,
    /// VEX.pp, for the vector encoding spaces.
    pub vex_pp: Option<u8>,
    pub rexw: RexW,
    pub modrm_mod: ModrmField,
    pub modrm_reg: ModrmField,
    pub modrm_rm: ModrmField,
    pub has_modrm: bool,
    pub mode: ModeRestriction,
    pub easz: AddressSizeClass,
    pub eosz: OperandSizeClass,
    pub default_64b: bool,
    pub vl: VectorLength,
    pub immediates: Immediates,
    pub vsib: Option<Vsib>,
    pub write_masking: WriteMasking,
    pub explicit_operands: Vec<String>,
    pub cpuid: Vec<String>,
    pub undocumented: bool,
    pub scalar: bool,
    pub amd_3dnow_opcode: Option<u8>,

    /// The encoding shape, once classified.
    pub shape: Option<Shape>,
}

impl InstructionRecord {
    pub fn pattern_tokens(&self) -> impl Iterator<Item = &str> {
        self.pattern.split_whitespace()
    }

    /// Operands that take part in shape selection, in declaration order.
    pub fn encodable_operands(&self) -> impl Iterator<Item = &OperandDescriptor> {
        self.operands.iter().filter(|op| op.is_encodable())
    }

    pub fn first_encodable(&self) -> Option<&OperandDescriptor> {
        self.encodable_operands().next()
    }

    /// Whether the first encodable operand lives in ModRM.reg rather than
    /// ModRM.rm.
    pub fn modrm_reg_first(&self) -> bool {
        self.first_encodable()
            .and_then(|op| op.lookup_fn.as_deref())
            .is_some_and(|l| l.ends_with("_R"))
    }

    pub fn upper_nibble(&self) -> u8 {
        self.opcode >> 4
    }

    pub fn lower_nibble(&self) -> u8 {
        self.opcode & 0xF
    }
}
