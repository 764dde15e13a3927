//! Operand descriptors and the parser for a single operand token.
//!
//! An operand token looks like `NAME[=VALUE](:PART)*`, for example
//! `REG0=GPRv_R():rw`, `MEM0:r:b` or `REG1=XED_REG_ST0:r:IMPL`.

use crate::Error;
use crate::error::Result;
use crate::tables::{ElementTypes, Widths};
use std::fmt;

/// How an operand appears in assembly syntax.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Explicit,
    Implicit,
    Suppressed,
    Conditional,
}

impl Visibility {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "EXPL" => Some(Self::Explicit),
            "IMPL" => Some(Self::Implicit),
            "SUPP" => Some(Self::Suppressed),
            "ECOND" => Some(Self::Conditional),
            _ => None,
        }
    }
}

/// The declared width class of an operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WidthClass {
    /// `b`
    Byte,
    /// `w`
    Word,
    /// `d`
    Dword,
    /// `q`
    Qword,
    /// `dq`
    DoubleQuad,
    /// `v`: 16, 32 or 64 bits with the effective operand size.
    Scalable,
    /// `z`: 16 or 32 bits with the effective operand size.
    ScalableZ,
    /// `y`: 32 or 64 bits with the effective operand size.
    ScalableY,
    /// Any other code from the widths table.
    Other(String),
}

impl WidthClass {
    const BUILTIN: [&'static str; 8] = ["b", "w", "d", "q", "dq", "v", "z", "y"];

    pub fn from_code(code: &str) -> Self {
        match code {
            "b" => Self::Byte,
            "w" => Self::Word,
            "d" => Self::Dword,
            "q" => Self::Qword,
            "dq" => Self::DoubleQuad,
            "v" => Self::Scalable,
            "z" => Self::ScalableZ,
            "y" => Self::ScalableY,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Byte => "b",
            Self::Word => "w",
            Self::Dword => "d",
            Self::Qword => "q",
            Self::DoubleQuad => "dq",
            Self::Scalable => "v",
            Self::ScalableZ => "z",
            Self::ScalableY => "y",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for WidthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One parsed operand of an instruction form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperandDescriptor {
    pub name: String,
    pub visibility: Visibility,
    /// Register-class selector such as `GPRv_R`, without the parentheses.
    pub lookup_fn: Option<String>,
    pub width: Option<WidthClass>,
    /// Fixed value such as `XED_REG_AL`.
    pub bits: Option<String>,
    /// Read/write access such as `r` or `rw`.
    pub access: Option<String>,
    pub xtype: Option<String>,
    /// Unrecognized tags, kept in order.
    pub extras: Vec<String>,
}

const ACCESS: [&str; 7] = ["r", "w", "rw", "cr", "cw", "crw", "rcw"];

/// Parse one operand token.
pub fn parse_operand(token: &str, widths: &Widths, xtypes: &ElementTypes) -> Result<OperandDescriptor> {
    let mut parts = token.split(':');
    let head = parts.next().unwrap_or_default();
    let (name, value) = match head.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (head, None),
    };
    if name.is_empty() {
        return Err(Error::Operand {
            token: token.to_string(),
            message: "missing operand name".to_string(),
        });
    }

    let (lookup_fn, bits) = match value {
        Some(v) => match v.strip_suffix("()") {
            Some(lookup) => (Some(lookup.to_string()), None),
            None => (None, Some(v.to_string())),
        },
        None => (None, None),
    };

    let mut op = OperandDescriptor {
        name: name.to_string(),
        visibility: Visibility::default(),
        lookup_fn,
        width: None,
        bits,
        access: None,
        xtype: None,
        extras: Vec::new(),
    };
    for part in parts {
        if let Some(vis) = Visibility::from_tag(part) {
            op.visibility = vis;
        } else if op.access.is_none() && ACCESS.contains(&part) {
            op.access = Some(part.to_string());
        } else if op.width.is_none() && (WidthClass::BUILTIN.contains(&part) || widths.contains(part)) {
            op.width = Some(WidthClass::from_code(part));
        } else if op.xtype.is_none() && xtypes.contains(part) {
            op.xtype = Some(part.to_string());
        } else {
            op.extras.push(part.to_string());
        }
    }
    Ok(op)
}

impl OperandDescriptor {
    fn lookup_contains(&self, needle: &str) -> bool {
        self.lookup_fn.as_deref().is_some_and(|l| l.contains(needle))
    }

    pub fn lookup_starts_with(&self, prefix: &str) -> bool {
        self.lookup_fn.as_deref().is_some_and(|l| l.starts_with(prefix))
    }

    fn width_is(&self, w: WidthClass) -> bool {
        self.width.as_ref() == Some(&w)
    }

    pub fn is_reg(&self) -> bool {
        self.name.contains("REG")
    }

    pub fn is_mem(&self) -> bool {
        self.name.contains("MEM")
    }

    pub fn is_implicit(&self) -> bool {
        self.visibility == Visibility::Implicit
    }

    pub fn is_xmm(&self) -> bool {
        self.lookup_contains("XMM")
    }

    pub fn is_ymm(&self) -> bool {
        self.lookup_contains("YMM")
    }

    pub fn is_mmx(&self) -> bool {
        self.lookup_contains("MMX")
    }

    /// Floating-point stack register, either by register class or as a
    /// fixed `ST0`..`ST7` register.
    pub fn is_x87(&self) -> bool {
        match &self.lookup_fn {
            Some(lookup) => lookup.contains("X87"),
            None => {
                self.name.starts_with("REG")
                    && self.bits.as_deref().is_some_and(|b| {
                        b.strip_prefix("XED_REG_ST")
                            .and_then(|n| n.chars().next())
                            .is_some_and(|c| ('0'..='7').contains(&c))
                    })
            }
        }
    }

    /// General register whose width follows the effective operand size.
    pub fn is_scalable(&self) -> bool {
        self.lookup_contains("GPRv") || self.width_is(WidthClass::Scalable)
    }

    pub fn is_gpr8(&self) -> bool {
        self.lookup_contains("GPR8") || self.width_is(WidthClass::Byte)
    }

    pub fn is_imm8(&self) -> bool {
        self.name == "IMM0" && self.width_is(WidthClass::Byte)
    }

    pub fn is_write_mask(&self) -> bool {
        matches!(self.lookup_fn.as_deref(), Some("MASK1" | "MASKNOT0"))
    }

    /// Operands that take part in choosing an encoding shape.
    pub fn is_encodable(&self) -> bool {
        !self.is_write_mask() && self.visibility != Visibility::Suppressed
    }

    /// Lower-case name of a fixed register operand, `es` for `XED_REG_ES`.
    pub fn fixed_register_name(&self) -> Option<String> {
        self.bits
            .as_deref()
            .and_then(|b| b.strip_prefix("XED_REG_"))
            .map(str::to_lowercase)
    }
}
