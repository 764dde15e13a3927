//! Serialize encoder procedures as Rust source, and write the summary
//! report.
//!
//! Generated functions call into a small runtime provided by the including
//! crate: an `Encoder` that accumulates encoding fields and output bytes,
//! the register types `Gpr8`..`Gpr64`, `Xmm`, `Ymm`, `Mmx` and `X87`, and
//! `Scale`.

use crate::diagnostics::summary_line;
use crate::record::InstructionRecord;
use crate::synth::{
    Address, EncoderProcedure, Field, Param, ParamKind, RegClass, Step, Synthesis, Value,
};
use std::collections::HashMap;
use x86_encgen_srcgen::{Formatter, fmtln};

/// One `pub mod` per environment holding one function per procedure.
/// Repeated names inside a module get a numeric suffix, starting at `_2`.
pub fn encoders(synthesis: &Synthesis, records: &[InstructionRecord]) -> Formatter {
    let mut f = Formatter::new("Generated by x86-encgen; do not edit", file!(), line!());
    f.empty_line();
    for env in &synthesis.environments {
        f.doc_comment(format!("Encoders for {env}."));
        f.block(format!("pub mod {}", env.module_name()), |f| {
            fmtln!(f, "use super::*;");
            let mut seen: HashMap<&str, usize> = HashMap::new();
            for p in synthesis.procedures().filter(|p| p.env == *env) {
                let count = seen.entry(p.name.as_str()).or_default();
                *count += 1;
                let name = match *count {
                    1 => p.name.clone(),
                    n => format!("{}_{n}", p.name),
                };
                f.empty_line();
                procedure(f, p, &name, records);
            }
        });
        f.empty_line();
    }
    f
}

fn procedure(f: &mut Formatter, p: &EncoderProcedure, name: &str, records: &[InstructionRecord]) {
    if let Some(record) = records.get(p.origin.0) {
        if record.iform.is_empty() {
            f.doc_comment(&record.iclass);
        } else {
            f.doc_comment(&record.iform);
        }
    }
    let mut params = vec!["e: &mut Encoder".to_string()];
    params.extend(
        p.params
            .iter()
            .map(|param| format!("{}: {}", param.name, param_type(param.kind))),
    );
    f.block(format!("pub fn {name}({})", params.join(", ")), |f| {
        steps(f, &p.steps, &p.params)
    });
}

fn steps(f: &mut Formatter, steps: &[Step], params: &[Param]) {
    for step in steps {
        match step {
            Step::Byte(b) => fmtln!(f, "e.byte({:#04x});", b),
            Step::Set(field, value) => set(f, *field, value),
            Step::Emit(what) => fmtln!(f, "e.{}();", what),
            Step::EmitIf(flag, what) => f.block(format!("if e.{flag}()"), |f| {
                fmtln!(f, "e.{}();", what);
            }),
            Step::Int {
                bits,
                value,
                signed,
            } => {
                let sign = if *signed { 'i' } else { 'u' };
                let mut arg = operand(value);
                if *signed && is_immediate(value, params) {
                    arg = format!("{arg} as i{bits}");
                }
                fmtln!(f, "e.{}{}({});", sign, bits, arg);
            }
            Step::Branch {
                flag,
                then,
                otherwise,
            } => {
                f.line(format!("if e.{flag}() {{"), None);
                f.indent(|f| self::steps(f, then, params));
                if !otherwise.is_empty() {
                    f.line("} else {", None);
                    f.indent(|f| self::steps(f, otherwise, params));
                }
                f.line("}", None);
            }
        }
    }
}

fn set(f: &mut Formatter, field: Field, value: &Value) {
    match value {
        Value::Register { param, .. } => fmtln!(f, "e.set_{}_reg({});", field, param),
        Value::Address(address) => fmtln!(
            f,
            "e.set_{}_mem{}({});",
            field,
            address.asz.bits(),
            address_args(address)
        ),
        Value::Const(_) | Value::Param(_) => fmtln!(f, "e.set_{}({});", field, operand(value)),
    }
}

fn operand(value: &Value) -> String {
    match value {
        Value::Const(v) => v.to_string(),
        Value::Param(name) | Value::Register { param: name, .. } => name.to_string(),
        Value::Address(address) => address_args(address),
    }
}

/// Immediates are passed unsigned even when they are sign-extended.
fn is_immediate(value: &Value, params: &[Param]) -> bool {
    let Value::Param(name) = value else {
        return false;
    };
    params
        .iter()
        .any(|p| p.name == *name && matches!(p.kind, ParamKind::Immediate(_)))
}

fn address_args(address: &Address) -> String {
    let index = match address.index {
        Some(index) => format!("Some({index})"),
        None => "None".to_string(),
    };
    let scale = address.scale.unwrap_or("Scale::One");
    let disp = match address.disp {
        Some((_, name)) => format!("i32::from({name})"),
        None => "0".to_string(),
    };
    format!("{}, {index}, {scale}, {disp}", address.base)
}

fn param_type(kind: ParamKind) -> String {
    match kind {
        ParamKind::Register(class) => reg_type(class).to_string(),
        ParamKind::Immediate(bits) => format!("u{bits}"),
        ParamKind::Displacement(bits) => format!("i{bits}"),
        ParamKind::Base(asz) | ParamKind::Index(asz) => format!("Gpr{}", asz.bits()),
        ParamKind::Scale => "Scale".to_string(),
    }
}

fn reg_type(class: RegClass) -> &'static str {
    match class {
        RegClass::Gpr8 => "Gpr8",
        RegClass::Gpr16 => "Gpr16",
        RegClass::Gpr32 => "Gpr32",
        RegClass::Gpr64 => "Gpr64",
        RegClass::Xmm => "Xmm",
        RegClass::Ymm => "Ymm",
        RegClass::Mmx => "Mmx",
        RegClass::X87 => "X87",
    }
}

/// One summary line per record, then the run statistics.
pub fn summary(synthesis: &Synthesis, records: &[InstructionRecord]) -> String {
    let mut out = String::new();
    for (id, outcome) in &synthesis.outcomes {
        if let Some(record) = records.get(id.0) {
            out.push_str(&summary_line(record, outcome));
            out.push('\n');
        }
    }
    out.push('\n');
    out.push_str(&synthesis.stats.to_string());
    out.push('\n');
    out
}
