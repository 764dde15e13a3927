//! Register, immediate and branch forms in the legacy encoding space.

use super::{
    Assembled, Field, Job, ParamKind, RegClass, Value, fixed_digit, fixed_modrm, imm8_bytes,
    imm8_params, map_escapes, operand_size_override, operand_sizes, osz_allowed, register,
    register_fields, required_prefixes, rex,
};
use crate::env::Mode;
use crate::error::Result;
use crate::operand::WidthClass;
use crate::record::{AddressSizeClass, ImmediateSize, OperandSizeClass};
use crate::synth::EncoderProcedure;

fn gpr(job: &Job<'_>, bits: u32) -> Result<RegClass> {
    RegClass::gpr(bits).ok_or_else(|| job.fatal(format!("no general register class of {bits} bits")))
}

/// Escapes, opcode and, when `modrm` is set, the ModRM byte.
fn opcode_and_modrm(p: &mut EncoderProcedure, job: &Job<'_>, modrm: bool) {
    map_escapes(p, job.record);
    p.byte(job.record.opcode);
    if modrm {
        p.emit(Assembled::ModRm);
    }
}

pub(super) fn no_operands(job: &mut Job<'_>) -> Result<()> {
    let record = job.record;
    let mode = job.mode();
    if matches!(
        (mode, record.easz),
        (Mode::M64, AddressSizeClass::A16) | (Mode::M16 | Mode::M32, AddressSizeClass::A64)
    ) {
        job.skip();
        return Ok(());
    }

    let mut suffix = String::new();
    if matches!(record.easz, AddressSizeClass::A16 | AddressSizeClass::A32 | AddressSizeClass::A64) {
        suffix.push_str(&format!("_{}", record.easz));
    }
    if matches!(record.eosz, OperandSizeClass::O16 | OperandSizeClass::O32 | OperandSizeClass::O64) {
        suffix.push_str(&format!("_{}", record.eosz));
    }
    let mut p = job.procedure(&suffix);
    let modrm = fixed_modrm(&mut p, record);

    match (mode, record.easz) {
        (Mode::M64, AddressSizeClass::A32)
        | (Mode::M32, AddressSizeClass::A16)
        | (Mode::M16, AddressSizeClass::A32) => p.byte(0x67),
        _ => {}
    }

    let mut rexw = false;
    let mut osz = None;
    if !record.prefixes.osz {
        match record.eosz {
            OperandSizeClass::O16 => osz = Some(16),
            OperandSizeClass::O32 => osz = Some(32),
            OperandSizeClass::O64 if mode != Mode::M64 => {
                job.skip();
                return Ok(());
            }
            OperandSizeClass::O64 if !record.default_64b => {
                p.set_const(Field::RexW, 1);
                rexw = true;
            }
            OperandSizeClass::O64 => {}
            OperandSizeClass::Not16 | OperandSizeClass::Not64 => {
                job.warn(format!("Check handling of {}", record.eosz));
            }
            OperandSizeClass::All => job.debug("Check handling of oszall"),
        }
    }

    if osz.is_some_and(|osz| !osz_allowed(record, mode, osz)) {
        job.skip();
        return Ok(());
    }

    required_prefixes(&mut p, record);
    if let Some(osz) = osz {
        operand_size_override(&mut p, record, osz);
    }
    if rexw {
        rex(&mut p, true);
    }
    if record.partial_opcode {
        job.warn("partial opcodes are not handled yet");
        job.skip();
        return Ok(());
    }
    opcode_and_modrm(&mut p, job, modrm);
    job.push(p);
    Ok(())
}

pub(super) fn two_gpr8(job: &mut Job<'_>) -> Result<()> {
    let record = job.record;
    if record.partial_opcode {
        return Err(job.fatal("partial opcodes are not handled in two-register forms"));
    }
    let mut p = job.procedure("_r8r8");
    p.param("reg0", ParamKind::Register(RegClass::Gpr8));
    p.param("reg1", ParamKind::Register(RegClass::Gpr8));
    let (first, second) = register_fields(record);
    p.set_const(Field::Mod, 3);
    p.set(first, register(RegClass::Gpr8, "reg0"));
    p.set(second, register(RegClass::Gpr8, "reg1"));
    required_prefixes(&mut p, record);
    rex(&mut p, false);
    opcode_and_modrm(&mut p, job, true);
    job.push(p);
    Ok(())
}

pub(super) fn two_scalable(job: &mut Job<'_>) -> Result<()> {
    let record = job.record;
    if record.partial_opcode {
        return Err(job.fatal("partial opcodes are not handled in two-register forms"));
    }
    for osz in encodable_sizes(job, &[16, 32, 64]) {
        let class = gpr(job, osz)?;
        let mut p = job.procedure(&format!("_rvrv_o{osz}"));
        p.param("reg0", ParamKind::Register(class));
        p.param("reg1", ParamKind::Register(class));
        let forced = osz == 64 && !record.default_64b;
        if forced {
            p.set_const(Field::RexW, 1);
        }
        let (first, second) = register_fields(record);
        p.set_const(Field::Mod, 3);
        p.set(first, register(class, "reg0"));
        p.set(second, register(class, "reg1"));
        required_prefixes(&mut p, record);
        operand_size_override(&mut p, record, osz);
        rex(&mut p, forced);
        opcode_and_modrm(&mut p, job, true);
        job.push(p);
    }
    Ok(())
}

pub(super) fn two_xmm(job: &mut Job<'_>, imm8: bool) -> Result<()> {
    let record = job.record;
    let mut p = job.procedure(if imm8 { "_xmmi" } else { "_xmm" });
    p.param("reg0", ParamKind::Register(RegClass::Xmm));
    p.param("reg1", ParamKind::Register(RegClass::Xmm));
    imm8_params(&mut p, record);
    let (first, second) = register_fields(record);
    p.set_const(Field::Mod, 3);
    p.set(first, register(RegClass::Xmm, "reg0"));
    p.set(second, register(RegClass::Xmm, "reg1"));
    required_prefixes(&mut p, record);
    rex(&mut p, false);
    opcode_and_modrm(&mut p, job, true);
    imm8_bytes(&mut p, record);
    job.push(p);
    Ok(())
}

/// One XMM or MMX register, with a fixed digit in the other ModRM field,
/// and optional immediates.
pub(super) fn one_vec_imm8(job: &mut Job<'_>, class: RegClass) -> Result<()> {
    let record = job.record;
    let suffix = match class {
        RegClass::Mmx => "_mmxi",
        _ => "_xmmi",
    };
    let mut p = job.procedure(suffix);
    p.param("reg0", ParamKind::Register(class));
    imm8_params(&mut p, record);
    let (first, second) = register_fields(record);
    p.set(first, register(class, "reg0"));
    p.set_const(Field::Mod, 3);
    fixed_digit(&mut p, record, second);
    required_prefixes(&mut p, record);
    if class == RegClass::Xmm {
        rex(&mut p, false);
    }
    opcode_and_modrm(&mut p, job, true);
    imm8_bytes(&mut p, record);
    job.push(p);
    Ok(())
}

pub(super) fn two_mmx(job: &mut Job<'_>) -> Result<()> {
    let record = job.record;
    let mut p = job.procedure("_mmx");
    p.param("reg0", ParamKind::Register(RegClass::Mmx));
    p.param("reg1", ParamKind::Register(RegClass::Mmx));
    imm8_params(&mut p, record);
    let (first, second) = register_fields(record);
    p.set_const(Field::Mod, 3);
    p.set(first, register(RegClass::Mmx, "reg0"));
    p.set(second, register(RegClass::Mmx, "reg1"));
    required_prefixes(&mut p, record);
    opcode_and_modrm(&mut p, job, true);
    imm8_bytes(&mut p, record);
    job.push(p);
    Ok(())
}

/// An explicit stack register in ModRM.rm, with or without an implicit
/// ST0. ModRM.reg must be a fixed digit.
pub(super) fn x87(job: &mut Job<'_>, with_st0: bool) -> Result<()> {
    let record = job.record;
    let Some(digit) = record.modrm_reg.value() else {
        return Err(job.fatal("Need a value for MODRM.REG in x87 encoding"));
    };
    let mut p = job.procedure(if with_st0 { "_x87_st0" } else { "_x87" });
    p.param("reg0", ParamKind::Register(RegClass::X87));
    p.set_const(Field::Mod, 3);
    p.set_const(Field::Reg, digit);
    p.set(Field::Rm, register(RegClass::X87, "reg0"));
    required_prefixes(&mut p, record);
    opcode_and_modrm(&mut p, job, true);
    job.push(p);
    Ok(())
}

pub(super) fn relative_branch(job: &mut Job<'_>) -> Result<()> {
    let record = job.record;
    let width = record.first_encodable().and_then(|op| op.width.clone());
    let sizes: &[u32] = match width {
        Some(WidthClass::Byte) => &[8],
        Some(WidthClass::Dword) => &[32],
        Some(WidthClass::ScalableZ) => &[16, 32],
        other => {
            return Err(job.fatal(format!(
                "Unhandled relbr width: {}",
                other.as_ref().map_or("-", WidthClass::code)
            )));
        }
    };
    for &osz in sizes {
        if sizes.len() > 1 && !osz_allowed(record, job.mode(), osz) {
            continue;
        }
        let (bits, param) = match osz {
            8 => (8, "disp8"),
            16 => (16, "disp16"),
            _ => (32, "disp32"),
        };
        let mut p = job.procedure(&format!("_o{osz}"));
        p.param(param, ParamKind::Displacement(bits));
        let modrm = fixed_modrm(&mut p, record);
        required_prefixes(&mut p, record);
        if sizes.len() > 1 {
            operand_size_override(&mut p, record, osz);
        }
        opcode_and_modrm(&mut p, job, modrm);
        p.int(bits, Value::Param(param), true);
        job.push(p);
    }
    Ok(())
}

pub(super) fn fixed_immediate(job: &mut Job<'_>) -> Result<()> {
    let record = job.record;
    let width = record.first_encodable().and_then(|op| op.width.clone());
    let (bits, param) = match width {
        Some(WidthClass::Byte) => (8, "imm8"),
        Some(WidthClass::Word) => (16, "imm16"),
        other => {
            return Err(job.fatal(format!(
                "not handling imm width {}",
                other.as_ref().map_or("-", WidthClass::code)
            )));
        }
    };
    let mut p = job.procedure("");
    p.param(param, ParamKind::Immediate(bits));
    let modrm = fixed_modrm(&mut p, record);
    required_prefixes(&mut p, record);
    opcode_and_modrm(&mut p, job, modrm);
    p.int(bits, Value::Param(param), false);
    job.push(p);
    Ok(())
}

/// A register that is not encoded, like the `es` of `push es`. Its name
/// becomes part of the procedure name.
pub(super) fn implicit_register(job: &mut Job<'_>) -> Result<()> {
    let record = job.record;
    let names: Vec<String> = record
        .encodable_operands()
        .filter(|op| op.is_implicit() && op.name.starts_with("REG"))
        .filter_map(|op| op.fixed_register_name())
        .collect();
    let suffix = if names.is_empty() {
        String::new()
    } else {
        format!("_{}", names.join("_"))
    };
    let mut p = job.procedure(&suffix);
    let modrm = fixed_modrm(&mut p, record);
    required_prefixes(&mut p, record);
    opcode_and_modrm(&mut p, job, modrm);
    job.push(p);
    Ok(())
}

pub(super) fn one_scalable_gpr(job: &mut Job<'_>, widths: &[u32]) -> Result<()> {
    let record = job.record;
    for osz in encodable_sizes(job, widths) {
        let class = gpr(job, osz)?;
        let mut p = job.procedure(&format!("_rv_o{osz}"));
        p.param("reg0", ParamKind::Register(class));
        let forced = job.mode() == Mode::M64 && osz == 64 && !record.default_64b;
        if forced {
            p.set_const(Field::RexW, 1);
        }
        let (first, second) = register_fields(record);
        p.set_const(Field::Mod, 3);
        p.set(first, register(class, "reg0"));
        fixed_digit(&mut p, record, second);
        if matches!(record.eosz, OperandSizeClass::Not16 | OperandSizeClass::Not64) {
            job.warn(format!("Check handling of {}", record.eosz));
        }
        required_prefixes(&mut p, record);
        operand_size_override(&mut p, record, osz);
        rex(&mut p, forced);
        opcode_and_modrm(&mut p, job, true);
        job.push(p);
    }
    Ok(())
}

pub(super) fn one_fixed_gpr(job: &mut Job<'_>, bits: u32) -> Result<()> {
    let record = job.record;
    let class = gpr(job, bits)?;
    let mut p = job.procedure(&format!("_o{bits}"));
    p.param("reg0", ParamKind::Register(class));
    let forced = job.mode() == Mode::M64 && bits == 64 && !record.default_64b;
    if forced {
        p.set_const(Field::RexW, 1);
    }
    let (first, second) = register_fields(record);
    p.set_const(Field::Mod, 3);
    p.set(first, register(class, "reg0"));
    fixed_digit(&mut p, record, second);
    required_prefixes(&mut p, record);
    rex(&mut p, forced);
    opcode_and_modrm(&mut p, job, true);
    job.push(p);
    Ok(())
}

/// A general register with an immediate, at each of `widths`.
pub(super) fn gpr_imm(job: &mut Job<'_>, widths: &[u32]) -> Result<()> {
    let record = job.record;
    if record.partial_opcode {
        job.warn("partial-opcode register forms are not implemented");
        job.skip();
        return Ok(());
    }
    for osz in encodable_sizes(job, widths) {
        let class = gpr(job, osz)?;
        let (bits, param) = match (record.immediates.size, osz) {
            (ImmediateSize::Byte, _) => (8, "imm8"),
            (ImmediateSize::Z, 16) => (16, "imm16"),
            (ImmediateSize::Z, _) => (32, "imm32"),
            (other, _) => {
                return Err(job.fatal(format!("not handling imm width {}", other.code())));
            }
        };
        let mut p = job.procedure(&format!("_ri_o{osz}"));
        p.param("reg0", ParamKind::Register(class));
        p.param(param, ParamKind::Immediate(bits));
        let forced = job.mode() == Mode::M64 && osz == 64 && !record.default_64b;
        if forced {
            p.set_const(Field::RexW, 1);
        }
        let (first, second) = register_fields(record);
        p.set_const(Field::Mod, 3);
        p.set(first, register(class, "reg0"));
        fixed_digit(&mut p, record, second);
        required_prefixes(&mut p, record);
        operand_size_override(&mut p, record, osz);
        rex(&mut p, forced);
        opcode_and_modrm(&mut p, job, true);
        // A 32-bit immediate is sign-extended at operand size 64.
        p.int(bits, Value::Param(param), osz == 64);
        job.push(p);
    }
    Ok(())
}

/// Operand sizes of `widths` the record can be encoded at in the job's
/// mode.
fn encodable_sizes(job: &Job<'_>, widths: &[u32]) -> Vec<u32> {
    let (record, mode) = (job.record, job.mode());
    let mut sizes = operand_sizes(mode, widths, record.default_64b);
    sizes.retain(|&osz| osz_allowed(record, mode, osz));
    sizes
}
