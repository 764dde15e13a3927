//! Classify a record's operand signature into an encoding shape.
//!
//! The predicates overlap on purpose: a lone XMM register also satisfies
//! "one XMM register with an optional immediate", and so on. Rules are
//! therefore tried in table order and the first match wins. The order of
//! [`LEGACY_RULES`] and [`VEX_RULES`] is part of the contract.

use crate::operand::{OperandDescriptor, WidthClass};
use crate::record::{EncodingSpace, InstructionRecord};

/// Vector register class of a VEX register-only form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VecClass {
    Xmm,
    Ymm,
}

impl VecClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::Xmm => "xmm",
            Self::Ymm => "ymm",
        }
    }
}

/// What the single operand of a [`Shape::OneNonMem`] form is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NonMemKind {
    /// `RELBR`: a relative branch displacement.
    RelativeBranch,
    /// `IMM0` with a `b`, `w`, `d` or `q` width.
    FixedImmediate,
    /// `IMM0` with a `z` width.
    ScalableImmediate,
    /// A general register sized by the operand size; the candidate sizes.
    ScalableGpr(&'static [u32]),
    /// A register encoded in the low opcode bits (`..._SB` lookups).
    PartialGpr,
    /// A general register of one fixed size.
    FixedGpr(u32),
    /// The accumulator sized by the address size (`ArAX`).
    AddressSizedRax,
    /// A general register sized by the address size (`A_GPR_..`).
    AddressSizedGpr,
    /// A fixed register that does not appear in the encoding.
    ImplicitRegister,
    /// Anything else, described for the diagnostic.
    Unrecognized(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    NoOperands,
    TwoGpr8,
    TwoScalableGpr,
    TwoXmm,
    TwoXmmImm8,
    OneXmmImm8,
    OneMmxImm8,
    TwoMmx,
    OneX87,
    TwoX87OneImplicit,
    OneNonMem(NonMemKind),
    Gpr8Imm8,
    GprvImm8,
    GprvImmz,
    OneMemFixed,
    VexRegs { count: u8, class: VecClass },
}

type Operands<'a> = [&'a OperandDescriptor];

/// One classification rule: a name for diagnostics, the predicate over
/// the encodable operands and the shape it produces.
pub struct Rule {
    pub name: &'static str,
    pub matches: fn(&Operands<'_>) -> bool,
    pub shape: fn(&Operands<'_>) -> Shape,
}

macro_rules! rule {
    ($name:literal, $pred:expr, $shape:expr) => {
        Rule {
            name: $name,
            matches: $pred,
            shape: $shape,
        }
    };
}

/// Legacy-space rules in priority order.
pub static LEGACY_RULES: &[Rule] = &[
    rule!("zero_operands", |ops| ops.is_empty(), |_| Shape::NoOperands),
    rule!("two_gpr8_regs", |ops| all_n(ops, 2, |op| op.is_reg() && op.is_gpr8()), |_| Shape::TwoGpr8),
    rule!("two_scalable_regs", |ops| all_n(ops, 2, |op| op.is_reg() && op.is_scalable()), |_| {
        Shape::TwoScalableGpr
    }),
    rule!("two_xmm_regs", |ops| all_n(ops, 2, |op| op.is_reg() && op.is_xmm()), |_| Shape::TwoXmm),
    rule!("two_xmm_regs_imm8", |ops| regs_with_imm8(ops, 2, OperandDescriptor::is_xmm), |_| {
        Shape::TwoXmmImm8
    }),
    rule!("one_xmm_reg_imm8", |ops| regs_with_imm8(ops, 1, OperandDescriptor::is_xmm), |_| {
        Shape::OneXmmImm8
    }),
    rule!("one_mmx_reg_imm8", |ops| regs_with_imm8(ops, 1, OperandDescriptor::is_mmx), |_| {
        Shape::OneMmxImm8
    }),
    rule!("two_mmx_regs", |ops| all_n(ops, 2, |op| op.is_reg() && op.is_mmx()), |_| Shape::TwoMmx),
    rule!(
        "one_x87_reg",
        |ops| all_n(ops, 1, |op| op.is_reg() && op.is_x87() && !op.is_implicit()),
        |_| Shape::OneX87
    ),
    rule!(
        "two_x87_reg",
        |ops| all_n(ops, 2, |op| op.is_reg() && op.is_x87())
            && ops.iter().filter(|op| op.is_implicit()).count() == 1,
        |_| Shape::TwoX87OneImplicit
    ),
    rule!(
        "one_nonmem_operand",
        |ops| ops.len() == 1 && !ops[0].is_mem(),
        |ops| Shape::OneNonMem(nonmem_kind(ops[0]))
    ),
    rule!("gpr8_imm8", |ops| reg_then_imm(ops, "GPR8", &WidthClass::Byte), |_| Shape::Gpr8Imm8),
    rule!("gprv_imm8", |ops| reg_then_imm(ops, "GPRv", &WidthClass::Byte), |_| Shape::GprvImm8),
    rule!("gprv_immz", |ops| reg_then_imm(ops, "GPRv", &WidthClass::ScalableZ), |_| Shape::GprvImmz),
    rule!(
        "one_mem_fixed",
        |ops| all_n(ops, 1, |op| {
            op.is_mem()
                && matches!(
                    op.width,
                    Some(WidthClass::Byte | WidthClass::Word | WidthClass::Dword | WidthClass::Qword | WidthClass::DoubleQuad)
                )
        }),
        |_| Shape::OneMemFixed
    ),
];

/// VEX-space rules in priority order.
pub static VEX_RULES: &[Rule] = &[
    rule!("three_xmm", |ops| all_n(ops, 3, |op| op.is_reg() && op.is_xmm()), |_| vex(3, VecClass::Xmm)),
    rule!("three_ymm", |ops| all_n(ops, 3, |op| op.is_reg() && op.is_ymm()), |_| vex(3, VecClass::Ymm)),
    rule!("two_xmm", |ops| all_n(ops, 2, |op| op.is_reg() && op.is_xmm()), |_| vex(2, VecClass::Xmm)),
    rule!("two_ymm", |ops| all_n(ops, 2, |op| op.is_reg() && op.is_ymm()), |_| vex(2, VecClass::Ymm)),
];

fn vex(count: u8, class: VecClass) -> Shape {
    Shape::VexRegs { count, class }
}

/// Exactly `n` operands, all satisfying `pred`.
fn all_n(ops: &Operands<'_>, n: usize, pred: impl Fn(&OperandDescriptor) -> bool) -> bool {
    ops.len() == n && ops.iter().all(|op| pred(*op))
}

/// `n` registers of a class, optionally followed by an 8-bit immediate at
/// position `n`.
fn regs_with_imm8(ops: &Operands<'_>, n: usize, class: fn(&OperandDescriptor) -> bool) -> bool {
    let mut regs = 0;
    for (i, op) in ops.iter().enumerate() {
        if op.is_reg() && class(*op) {
            regs += 1;
        } else if !(i == n && op.is_imm8()) {
            return false;
        }
    }
    regs == n
}

/// `REG0` with a lookup starting with `lookup`, then `IMM0` of `width`.
fn reg_then_imm(ops: &Operands<'_>, lookup: &str, width: &WidthClass) -> bool {
    ops.len() <= 2
        && ops.iter().enumerate().all(|(i, op)| match i {
            0 => op.name == "REG0" && op.lookup_starts_with(lookup),
            _ => op.name == "IMM0" && op.width.as_ref() == Some(width),
        })
}

fn nonmem_kind(op: &OperandDescriptor) -> NonMemKind {
    if op.name == "RELBR" {
        return NonMemKind::RelativeBranch;
    }
    if op.name == "IMM0" {
        return match &op.width {
            Some(WidthClass::Byte | WidthClass::Word | WidthClass::Dword | WidthClass::Qword) => {
                NonMemKind::FixedImmediate
            }
            Some(WidthClass::ScalableZ) => NonMemKind::ScalableImmediate,
            other => NonMemKind::Unrecognized(format!(
                "IMM0 of width {}",
                other.as_ref().map_or("-", WidthClass::code)
            )),
        };
    }
    if let Some(lookup) = op.lookup_fn.as_deref() {
        return if lookup.ends_with("_SB") {
            NonMemKind::PartialGpr
        } else if lookup.starts_with("GPRv") {
            NonMemKind::ScalableGpr(&[16, 32, 64])
        } else if lookup.starts_with("GPRy") {
            NonMemKind::ScalableGpr(&[32, 64])
        } else if lookup.starts_with("GPR8") {
            NonMemKind::FixedGpr(8)
        } else if lookup.starts_with("GPR16") {
            NonMemKind::FixedGpr(16)
        } else if lookup.starts_with("GPR32") {
            NonMemKind::FixedGpr(32)
        } else if lookup.starts_with("GPR64") {
            NonMemKind::FixedGpr(64)
        } else if lookup.starts_with("ArAX") {
            NonMemKind::AddressSizedRax
        } else if lookup.starts_with("A_GPR_") {
            NonMemKind::AddressSizedGpr
        } else {
            NonMemKind::Unrecognized(format!("lookup function {lookup}"))
        };
    }
    if op.is_implicit() && op.name.starts_with("REG") {
        return NonMemKind::ImplicitRegister;
    }
    NonMemKind::Unrecognized(format!("operand {}", op.name))
}

/// The rule table for an encoding space. EVEX and XOP forms have none.
pub fn rules(space: EncodingSpace) -> &'static [Rule] {
    match space {
        EncodingSpace::Legacy => LEGACY_RULES,
        EncodingSpace::Vex => VEX_RULES,
        EncodingSpace::Evex | EncodingSpace::EvexU0 | EncodingSpace::Xop => &[],
    }
}

/// The first matching rule and its shape.
pub fn classify_with_rule(record: &InstructionRecord) -> Option<(&'static str, Shape)> {
    let ops: Vec<&OperandDescriptor> = record.encodable_operands().collect();
    rules(record.space)
        .iter()
        .find(|rule| (rule.matches)(&ops))
        .map(|rule| (rule.name, (rule.shape)(&ops)))
}

/// Shape of `record`, or `None` when no rule applies.
pub fn classify(record: &InstructionRecord) -> Option<Shape> {
    classify_with_rule(record).map(|(_, shape)| shape)
}
