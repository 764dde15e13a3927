//! Encoder synthesis: turn each classified record into encoder procedures
//! for every environment of the run.
//!
//! Every procedure lays out its bytes in the same order:
//!
//! 1. address-size override (0x67)
//! 2. mandatory prefixes: lock, F2, F3, 66
//! 3. operand-size override (0x66)
//! 4. REX, in 64-bit mode
//! 5. opcode-map escapes, or a VEX prefix
//! 6. opcode
//! 7. ModRM, SIB, displacement, immediate

mod legacy;
mod memory;
pub mod procedure;
mod vex;

pub use self::procedure::{
    Address, Assembled, EncoderProcedure, Field, Flag, Param, ParamKind, RegClass, Step, Value,
};

use crate::diagnostics::{Diagnostics, Stats};
use crate::env::{Environment, Mode, RunConfig};
use crate::error::{Error, Result};
use crate::record::{EncodingSpace, InstructionRecord, RecordId};
use crate::shape::{NonMemKind, Shape};
use indexmap::IndexMap;
use rayon::prelude::*;

/// What synthesis produced for one record over all environments.
#[derive(Clone, Debug, Default)]
pub struct RecordOutcome {
    pub procedures: Vec<EncoderProcedure>,
    /// Some environment was structurally inapplicable.
    pub skipped: bool,
    pub diagnostics: Diagnostics,
}

impl RecordOutcome {
    pub fn handled(&self) -> bool {
        !self.procedures.is_empty()
    }
}

/// The result of a run: one outcome per record, in record order.
#[derive(Clone, Debug, Default)]
pub struct Synthesis {
    pub environments: Vec<Environment>,
    pub outcomes: IndexMap<RecordId, RecordOutcome>,
    pub stats: Stats,
}

impl Synthesis {
    pub fn outcome(&self, id: RecordId) -> Option<&RecordOutcome> {
        self.outcomes.get(&id)
    }

    /// Every procedure, grouped by record.
    pub fn procedures(&self) -> impl Iterator<Item = &EncoderProcedure> {
        self.outcomes.values().flat_map(|o| &o.procedures)
    }
}

/// Synthesize encoders for `records` in every environment `config`
/// selects. Records must already be derived and classified.
pub fn synthesize(records: &[InstructionRecord], config: &RunConfig) -> Result<Synthesis> {
    let environments = config.environments();
    for env in &environments {
        log::info!("Generating encoder functions for {env}");
    }
    let outcomes = records
        .par_iter()
        .enumerate()
        .map(|(i, record)| synthesize_record(RecordId(i), record, &environments))
        .collect::<Result<Vec<_>>>()?;

    for outcome in &outcomes {
        outcome.diagnostics.replay();
    }
    let stats = Stats::gather(&outcomes);
    Ok(Synthesis {
        environments,
        outcomes: outcomes
            .into_iter()
            .enumerate()
            .map(|(i, o)| (RecordId(i), o))
            .collect(),
        stats,
    })
}

/// Synthesize one record in every environment.
pub fn synthesize_record(
    id: RecordId,
    record: &InstructionRecord,
    environments: &[Environment],
) -> Result<RecordOutcome> {
    let mut outcome = RecordOutcome::default();
    for &env in environments {
        Job {
            record,
            id,
            env,
            outcome: &mut outcome,
        }
        .run()?;
    }
    Ok(outcome)
}

/// Synthesis of one record in one environment.
pub(crate) struct Job<'a> {
    pub record: &'a InstructionRecord,
    pub id: RecordId,
    pub env: Environment,
    pub outcome: &'a mut RecordOutcome,
}

impl Job<'_> {
    fn run(&mut self) -> Result<()> {
        if self.record.space == EncodingSpace::EvexU0 {
            return Err(self.fatal(format!("Unhandled encoding space: {}", self.record.space)));
        }
        if !self.record.mode.allows(self.env.mode) {
            self.skip();
            return Ok(());
        }
        let Some(shape) = self.record.shape.clone() else {
            return Ok(());
        };
        match shape {
            Shape::NoOperands => legacy::no_operands(self),
            Shape::TwoGpr8 => legacy::two_gpr8(self),
            Shape::TwoScalableGpr => legacy::two_scalable(self),
            Shape::TwoXmm => legacy::two_xmm(self, false),
            Shape::TwoXmmImm8 => legacy::two_xmm(self, true),
            Shape::OneXmmImm8 => legacy::one_vec_imm8(self, RegClass::Xmm),
            Shape::OneMmxImm8 => legacy::one_vec_imm8(self, RegClass::Mmx),
            Shape::TwoMmx => legacy::two_mmx(self),
            Shape::OneX87 => legacy::x87(self, false),
            Shape::TwoX87OneImplicit => legacy::x87(self, true),
            Shape::OneNonMem(kind) => self.one_nonmem(kind),
            Shape::Gpr8Imm8 => legacy::gpr_imm(self, &[8]),
            Shape::GprvImm8 | Shape::GprvImmz => legacy::gpr_imm(self, &[16, 32, 64]),
            Shape::OneMemFixed => memory::one_mem_fixed(self),
            Shape::VexRegs { count, class } => vex::simd_regs(self, count, class),
        }
    }

    fn one_nonmem(&mut self, kind: NonMemKind) -> Result<()> {
        match kind {
            NonMemKind::RelativeBranch => legacy::relative_branch(self),
            NonMemKind::FixedImmediate => legacy::fixed_immediate(self),
            NonMemKind::ScalableGpr(widths) => legacy::one_scalable_gpr(self, widths),
            NonMemKind::FixedGpr(bits) => legacy::one_fixed_gpr(self, bits),
            NonMemKind::ImplicitRegister => legacy::implicit_register(self),
            NonMemKind::ScalableImmediate => self.not_implemented("scalable immediate"),
            NonMemKind::PartialGpr => self.not_implemented("partial-opcode register"),
            NonMemKind::AddressSizedRax => self.not_implemented("address-sized accumulator"),
            NonMemKind::AddressSizedGpr => self.not_implemented("address-sized register"),
            NonMemKind::Unrecognized(what) => {
                self.warn(format!("Need to handle {what}"));
                Ok(())
            }
        }
    }

    fn not_implemented(&mut self, what: &str) -> Result<()> {
        self.warn(format!("{what} forms are not implemented"));
        Ok(())
    }

    /// A new procedure named after the record's class plus `suffix`.
    pub fn procedure(&self, suffix: &str) -> EncoderProcedure {
        let name = format!("{}{suffix}", self.record.iclass.to_lowercase());
        EncoderProcedure::new(name, self.env, self.id)
    }

    pub fn push(&mut self, procedure: EncoderProcedure) {
        self.outcome.diagnostics.debug(format!(
            "{}: {} steps for {}",
            procedure.name,
            procedure.steps.len(),
            self.env
        ));
        self.outcome.procedures.push(procedure);
    }

    pub fn skip(&mut self) {
        self.outcome.skipped = true;
    }

    pub fn mode(&self) -> Mode {
        self.env.mode
    }

    pub fn warn(&mut self, message: impl std::fmt::Display) {
        self.outcome.diagnostics.warn(format!(
            "{} / {}: {message}",
            self.record.iclass, self.record.iform
        ));
    }

    pub fn debug(&mut self, message: impl std::fmt::Display) {
        self.outcome.diagnostics.debug(format!(
            "{} / {}: {message}",
            self.record.iclass, self.record.iform
        ));
    }

    pub fn fatal(&self, message: impl Into<String>) -> Error {
        Error::Synthesis {
            iclass: self.record.iclass.clone(),
            iform: self.record.iform.clone(),
            message: message.into(),
        }
    }
}

/// Operand sizes from `sizes` that can be encoded in `mode`: 64 only in
/// 64-bit mode, and not 32 in 64-bit mode for default-64 classes.
pub(crate) fn operand_sizes(mode: Mode, sizes: &[u32], default_64b: bool) -> Vec<u32> {
    sizes
        .iter()
        .copied()
        .filter(|&osz| !(osz == 64 && mode != Mode::M64))
        .filter(|&osz| !(osz == 32 && mode == Mode::M64 && default_64b))
        .collect()
}

/// Whether `osz` differs from the default operand size of `mode`.
pub(crate) fn needs_osz_override(mode: Mode, osz: u32) -> bool {
    (osz == 16 && mode != Mode::M16) || (osz == 32 && mode == Mode::M16)
}

/// Records whose pattern forbids prefixes cannot take an operand-size
/// override.
pub(crate) fn osz_allowed(record: &InstructionRecord, mode: Mode, osz: u32) -> bool {
    !(record.prefixes.none_allowed && needs_osz_override(mode, osz))
}

/// Emit 0x66 when `osz` differs from the mode's default operand size.
pub(crate) fn operand_size_override(p: &mut EncoderProcedure, record: &InstructionRecord, osz: u32) {
    if !record.prefixes.osz && needs_osz_override(p.env.mode, osz) {
        p.byte(0x66);
    }
}

pub(crate) fn required_prefixes(p: &mut EncoderProcedure, record: &InstructionRecord) {
    let prefixes = &record.prefixes;
    if prefixes.lock {
        p.byte(0xF0);
    }
    if prefixes.f2 {
        p.byte(0xF2);
    }
    if prefixes.f3 {
        p.byte(0xF3);
    }
    if prefixes.osz {
        p.byte(0x66);
    }
}

/// REX in 64-bit mode: always when REX.W is forced, otherwise only when
/// the registers chosen at run time need it.
pub(crate) fn rex(p: &mut EncoderProcedure, forced: bool) {
    if p.env.mode != Mode::M64 {
        return;
    }
    if forced {
        p.emit(Assembled::Rex);
    } else {
        p.emit_if(Flag::RexNeeded, Assembled::Rex);
    }
}

pub(crate) fn map_escapes(p: &mut EncoderProcedure, record: &InstructionRecord) {
    match record.map {
        1 => p.byte(0x0F),
        2 => {
            p.byte(0x0F);
            p.byte(0x38);
        }
        3 => {
            p.byte(0x0F);
            p.byte(0x3A);
        }
        _ => {}
    }
}

/// Set the ModRM fields of a record that needs a ModRM byte, fixed values
/// or 0. Returns whether it needs one.
pub(crate) fn fixed_modrm(p: &mut EncoderProcedure, record: &InstructionRecord) -> bool {
    let fields = [
        (Field::Mod, record.modrm_mod.value()),
        (Field::Reg, record.modrm_reg.value()),
        (Field::Rm, record.modrm_rm.value()),
    ];
    if !record.has_modrm && fields.iter().all(|(_, v)| v.is_none()) {
        return false;
    }
    for (field, value) in fields {
        p.set_const(field, value.unwrap_or(0));
    }
    true
}

/// The ModRM fields holding the first and the second register operand.
pub(crate) fn register_fields(record: &InstructionRecord) -> (Field, Field) {
    if record.modrm_reg_first() {
        (Field::Reg, Field::Rm)
    } else {
        (Field::Rm, Field::Reg)
    }
}

/// Set the fixed digit of `field` when the record has one.
pub(crate) fn fixed_digit(p: &mut EncoderProcedure, record: &InstructionRecord, field: Field) {
    let value = match field {
        Field::Reg => record.modrm_reg.value(),
        Field::Rm => record.modrm_rm.value(),
        _ => None,
    };
    if let Some(v) = value {
        p.set_const(field, v);
    }
}

pub(crate) fn register(class: RegClass, param: &'static str) -> Value {
    Value::Register { class, param }
}

/// Parameters for the record's 8-bit immediates.
pub(crate) fn imm8_params(p: &mut EncoderProcedure, record: &InstructionRecord) {
    if record.immediates.has_imm8 {
        p.param("imm8", ParamKind::Immediate(8));
    }
    if record.immediates.has_imm8_2 {
        p.param("imm8_2", ParamKind::Immediate(8));
    }
}

pub(crate) fn imm8_bytes(p: &mut EncoderProcedure, record: &InstructionRecord) {
    if record.immediates.has_imm8 {
        p.int(8, Value::Param("imm8"), false);
    }
    if record.immediates.has_imm8_2 {
        p.int(8, Value::Param("imm8_2"), false);
    }
}

#[cfg(test)]
mod tests;
