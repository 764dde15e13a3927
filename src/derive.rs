//! Derive encoding attributes from a record's pattern tokens.
//!
//! Each attribute comes from one recognized token shape in the pattern,
//! such as `REXW=1`, `MOD[0b11]` or ` MODE!=2`. Shapes are independent of
//! each other; anything unrecognized is ignored.

use crate::Error;
use crate::error::Result;
use crate::record::{
    AddressSizeClass, EncodingSpace, ImmediateSize, Immediates, InstructionRecord, ModeRestriction,
    ModrmField, OperandSizeClass, RexW, VectorLength, Vsib, WriteMasking,
};
use crate::operand::{OperandDescriptor, Visibility, WidthClass};
use crate::tables::CpuidMap;
use regex::Regex;
use std::sync::LazyLock;

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect("static regex must compile"));
    };
}

pattern!(MAP, r"MAP=(?P<map>[0-6])");
pattern!(VEX_PREFIX, r"VEX_PREFIX=(?P<prefix>[0-9])");
pattern!(REP_PREFIX, r"REP=(?P<prefix>[0-3])");
pattern!(OSZ_PREFIX, r" OSZ=(?P<prefix>[01])");
pattern!(REXW_PREFIX, r"REXW=(?P<rexw>[01])");
pattern!(REG_BITS, r"REG\[(?P<reg>[b01]+)\]");
pattern!(MOD_BITS, r"MOD\[(?P<mod>[b01]+)\]");
pattern!(RM_VALUE, r"RM=(?P<rm>[0-9]+)");
// Matches both RM[...] and SRM[...].
pattern!(RM_BITS, r"RM\[(?P<rm>[b01]+)\]");
pattern!(MODE, r" MODE=(?P<mode>[012]+)");

/// Parse `0x..` hex, `0b..` binary (underscores allowed) or decimal.
pub fn parse_numeric(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = s.strip_prefix("0b") {
        u32::from_str_radix(&bin.replace('_', ""), 2).ok()
    } else {
        s.parse().ok()
    }
}

fn capture<'a>(re: &Regex, haystack: &'a str, group: &str) -> Option<&'a str> {
    re.captures(haystack)
        .and_then(|c| c.name(group))
        .map(|m| m.as_str())
}

/// Fill in every pattern-derived attribute of `record`.
pub fn derive(mut record: InstructionRecord, cpuid: &CpuidMap) -> Result<InstructionRecord> {
    let fail = |record: &InstructionRecord, message: String| Error::Attribute {
        iclass: record.iclass.clone(),
        message,
    };

    if record.isa_set.is_empty() {
        record.isa_set = record.extension.clone();
    }
    record.undocumented = record.comment.contains("UNDOC");
    record.attributes = record.attributes.to_uppercase();
    record.scalar = record.attributes.contains("SCALAR");
    record.cpuid = cpuid.features(&record.isa_set).to_vec();

    let pattern = record.pattern.clone();
    let tokens: Vec<&str> = pattern.split_whitespace().collect();
    let token = |i: usize| -> Result<&str> {
        tokens
            .get(i)
            .copied()
            .ok_or_else(|| fail(&record, format!("pattern `{pattern}` has no opcode")))
    };

    // Encoding space, map and opcode byte.
    let (space, map, opcode) = match token(0)? {
        "0x0F" => match token(1)? {
            "0x38" => (EncodingSpace::Legacy, 2, token(2)?),
            "0x3A" => (EncodingSpace::Legacy, 3, token(2)?),
            op => (EncodingSpace::Legacy, 1, op),
        },
        "VEXVALID=1" => (EncodingSpace::Vex, 0, token(1)?),
        "VEXVALID=2" => (EncodingSpace::Evex, 0, token(1)?),
        "VEXVALID=3" => (EncodingSpace::Xop, 0, token(1)?),
        "VEXVALID=4" => (EncodingSpace::EvexU0, 0, token(1)?),
        op => (EncodingSpace::Legacy, 0, op),
    };
    let (opcode, partial) = if opcode.starts_with("0x") {
        (parse_numeric(opcode), false)
    } else if opcode.starts_with("0b") {
        (parse_numeric(opcode).map(|v| v << 3), true)
    } else {
        (None, false)
    };
    let opcode = opcode
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| fail(&record, format!("cannot find an opcode in `{pattern}`")))?;
    record.space = space;
    record.opcode = opcode;
    record.partial_opcode = partial;
    record.map = match capture(&MAP, &pattern, "map") {
        Some(m) => m.parse().unwrap_or(map),
        None => map,
    };

    if record.extension == "3DNOW" && record.category == "3DNOW" {
        record.amd_3dnow_opcode = tokens
            .last()
            .and_then(|t| parse_numeric(t))
            .and_then(|v| u8::try_from(v).ok());
    }

    // Mandatory prefixes.
    let prefixes = &mut record.prefixes;
    prefixes.lock = record.iclass.ends_with("_LOCK");
    prefixes.none_allowed = pattern.contains("REP=0 OSZ=0");
    prefixes.osz = capture(&OSZ_PREFIX, &pattern, "prefix") == Some("1");
    match capture(&REP_PREFIX, &pattern, "prefix") {
        Some("2") => prefixes.f2 = true,
        Some("3") => prefixes.f3 = true,
        _ => {}
    }
    if matches!(space, EncodingSpace::Vex | EncodingSpace::Evex | EncodingSpace::Xop) {
        if let Some(pp) = capture(&VEX_PREFIX, &pattern, "prefix").and_then(|p| p.parse().ok()) {
            match pp {
                0 => prefixes.none_allowed = true,
                1 => prefixes.osz = true,
                2 => prefixes.f2 = true,
                3 => prefixes.f3 = true,
                _ => {}
            }
            record.vex_pp = Some(pp);
        }
    }

    record.rexw = match capture(&REXW_PREFIX, &pattern, "rexw") {
        Some("0") => RexW::Zero,
        Some("1") => RexW::One,
        _ => RexW::Unspecified,
    };

    // ModRM requirements; later shapes override earlier ones.
    let bits_field = |re: &Regex, group: &str| {
        capture(re, &pattern, group)
            .and_then(parse_numeric)
            .and_then(|v| u8::try_from(v).ok())
            .map_or(ModrmField::Unspecified, ModrmField::Value)
    };
    record.modrm_reg = bits_field(&REG_BITS, "reg");
    record.modrm_rm = bits_field(&RM_BITS, "rm");
    if let ModrmField::Value(v) = bits_field(&RM_VALUE, "rm") {
        record.modrm_rm = ModrmField::Value(v);
    }
    record.modrm_mod = bits_field(&MOD_BITS, "mod");
    if pattern.contains("MOD!=3") {
        record.modrm_mod = ModrmField::AnyMemory;
    }
    if pattern.contains("MOD=3") {
        record.modrm_mod = ModrmField::Value(3);
    }
    record.has_modrm = pattern.contains("MODRM")
        || record.modrm_reg.is_specified()
        || record.modrm_mod.is_specified()
        || (record.modrm_rm.is_specified() && !pattern.contains("SRM["));

    record.mode = if pattern.contains(" MODE!=2") {
        ModeRestriction::Not64
    } else {
        match capture(&MODE, &pattern, "mode") {
            None => ModeRestriction::Any,
            Some("0") => ModeRestriction::Only16,
            Some("1") => ModeRestriction::Only32,
            Some("2") => ModeRestriction::Only64,
            Some(other) => return Err(fail(&record, format!("unknown MODE={other}"))),
        }
    };

    record.easz = if pattern.contains("EASZ=1") {
        AddressSizeClass::A16
    } else if pattern.contains("EASZ=2") {
        AddressSizeClass::A32
    } else if pattern.contains("EASZ=3") {
        AddressSizeClass::A64
    } else if pattern.contains("EASZ!=1") {
        AddressSizeClass::Not16
    } else {
        AddressSizeClass::All
    };

    record.eosz = if space != EncodingSpace::Legacy {
        OperandSizeClass::All
    } else if pattern.contains("EOSZ=1") {
        OperandSizeClass::O16
    } else if pattern.contains("EOSZ=2") {
        OperandSizeClass::O32
    } else if pattern.contains("EOSZ=3") {
        OperandSizeClass::O64
    } else if pattern.contains("EOSZ!=1") {
        OperandSizeClass::Not16
    } else if pattern.contains("EOSZ!=3") {
        OperandSizeClass::Not64
    } else {
        OperandSizeClass::All
    };

    record.default_64b = pattern.contains("DF64()") || pattern.contains("CR_WIDTH()");
    record.vl = vector_length(space, &pattern);
    record.immediates = immediates(&record.operands);
    record.vsib = vsib(&pattern);
    record.write_masking = write_masking(&record.operands, &pattern);
    record.explicit_operands = explicit_operands(&record.operands);
    Ok(record)
}

fn vector_length(space: EncodingSpace, pattern: &str) -> VectorLength {
    if !matches!(space, EncodingSpace::Vex | EncodingSpace::Evex) {
        return VectorLength::NotApplicable;
    }
    if pattern.contains("VL=0") {
        VectorLength::L128
    } else if pattern.contains("VL=1") {
        VectorLength::L256
    } else if pattern.contains("VL=2") || pattern.contains("FIX_ROUND_LEN512") {
        VectorLength::L512
    } else if space == EncodingSpace::Vex {
        VectorLength::Ignored
    } else {
        VectorLength::IgnoredEvex
    }
}

fn immediates(operands: &[OperandDescriptor]) -> Immediates {
    let mut imm = Immediates::default();
    for op in operands {
        let width = if op.name == "IMM0" { op.width.as_ref() } else { None };
        match width {
            Some(WidthClass::Byte) => {
                imm.has_imm8 = true;
                imm.size = ImmediateSize::Byte;
            }
            Some(WidthClass::ScalableZ) => {
                imm.has_immz = true;
                imm.size = ImmediateSize::Z;
            }
            Some(WidthClass::Scalable) => imm.size = ImmediateSize::V,
            Some(WidthClass::Dword) => imm.size = ImmediateSize::Dword,
            Some(WidthClass::Word) => imm.size = ImmediateSize::Word,
            _ if op.name == "IMM1" => imm.has_imm8_2 = true,
            _ => {}
        }
    }
    imm
}

fn vsib(pattern: &str) -> Option<Vsib> {
    [
        ("UISA_VMODRM_XMM()", Vsib::Avx512Xmm),
        ("UISA_VMODRM_YMM()", Vsib::Avx512Ymm),
        ("UISA_VMODRM_ZMM()", Vsib::Avx512Zmm),
        ("VMODRM_XMM()", Vsib::AvxXmm),
        ("VMODRM_YMM()", Vsib::AvxYmm),
    ]
    .into_iter()
    .find(|(marker, _)| pattern.contains(marker))
    .map(|(_, v)| v)
}

fn write_masking(operands: &[OperandDescriptor], pattern: &str) -> WriteMasking {
    let mut wm = WriteMasking::default();
    for op in operands {
        match op.lookup_fn.as_deref() {
            Some("MASK1") => wm.enabled = true,
            Some("MASKNOT0") => {
                wm.enabled = true;
                wm.not_k0 = true;
            }
            _ => {}
        }
    }
    wm.merging_only = wm.enabled && pattern.contains("ZEROING=0");
    wm
}

/// Names of the operands written in assembly syntax: the register class or
/// fixed register for `NAME=VALUE` operands, the bare name for immediates
/// and memory.
fn explicit_operands(operands: &[OperandDescriptor]) -> Vec<String> {
    operands
        .iter()
        .filter(|op| op.visibility == Visibility::Explicit)
        .filter_map(|op| {
            op.lookup_fn.clone().or_else(|| op.bits.clone()).or_else(|| {
                ["IMM0", "MEM0", "IMM1"]
                    .iter()
                    .any(|p| op.name.starts_with(p))
                    .then(|| op.name.clone())
            })
        })
        .collect()
}
