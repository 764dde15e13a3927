//! Generate x86 instruction encoders from a pattern database.
//!
//! The pipeline runs in five stages:
//!
//! 1. [`tables`] loads the side tables (operand widths, element types,
//!    CPUID features, state-bit macros).
//! 2. [`reader`] turns the brace-block database into one
//!    [`InstructionRecord`] per concrete instruction form.
//! 3. [`derive`] fills in the attributes implied by each record's pattern,
//!    and [`shape`] assigns its encoding shape.
//! 4. [`synth`] produces abstract [`EncoderProcedure`]s for every
//!    environment of the run.
//! 5. [`render`] serializes those procedures as Rust source, together with
//!    a summary report.

pub mod derive;
pub mod diagnostics;
pub mod env;
mod error;
pub mod operand;
pub mod reader;
pub mod record;
pub mod render;
pub mod shape;
pub mod synth;
pub mod tables;

pub use crate::env::{AddressSize, Environment, Mode, RunConfig};
pub use crate::error::{Error, Location, Result};
pub use crate::reader::Database;
pub use crate::record::{InstructionRecord, RecordId};
pub use crate::synth::{EncoderProcedure, Synthesis};
pub use crate::tables::Tables;

use crate::tables::{CpuidMap, ElementTypes, StateBits, Widths, read_input};
use rayon::prelude::*;
use std::path::PathBuf;

/// Paths of every input file.
#[derive(Clone, Debug, Default)]
pub struct Inputs {
    pub state_bits: PathBuf,
    pub instructions: PathBuf,
    pub widths: PathBuf,
    pub element_types: PathBuf,
    /// Without a CPUID file every record gets an empty feature list.
    pub cpuid: Option<PathBuf>,
}

/// Read the side tables, then the pattern database.
pub fn load(inputs: &Inputs) -> Result<(Tables, Database)> {
    let cpuid = match &inputs.cpuid {
        Some(path) => CpuidMap::parse(&read_input(path)?, &path.display().to_string())?,
        None => CpuidMap::default(),
    };
    let tables = Tables {
        widths: Widths::parse(
            &read_input(&inputs.widths)?,
            &inputs.widths.display().to_string(),
        )?,
        element_types: ElementTypes::parse(&read_input(&inputs.element_types)?),
        cpuid,
        state_bits: StateBits::parse(
            &read_input(&inputs.state_bits)?,
            &inputs.state_bits.display().to_string(),
        )?,
    };
    log::debug!(
        "{} operand widths, {} state-bit macros",
        tables.widths.len(),
        tables.state_bits.len()
    );

    let path = &inputs.instructions;
    let database = reader::read_database(&read_input(path)?, &path.display().to_string(), &tables)?;
    log::info!("Read {} instruction forms", database.records.len());
    Ok((tables, database))
}

/// Derive every record's attributes and classify its shape, keeping input
/// order.
pub fn prepare(database: Database, tables: &Tables) -> Result<Vec<InstructionRecord>> {
    database
        .records
        .into_par_iter()
        .map(|record| {
            let mut record = derive::derive(record, &tables.cpuid)?;
            record.shape = shape::classify(&record);
            Ok(record)
        })
        .collect()
}

/// Everything a run produces.
#[derive(Debug)]
pub struct Generated {
    pub records: Vec<InstructionRecord>,
    pub synthesis: Synthesis,
}

impl Generated {
    /// Rust source for every procedure, one module per environment.
    pub fn encoders(&self) -> x86_encgen_srcgen::Formatter {
        render::encoders(&self.synthesis, &self.records)
    }

    /// Per-record summary lines followed by the run statistics.
    pub fn summary(&self) -> String {
        render::summary(&self.synthesis, &self.records)
    }
}

/// Run the whole pipeline.
pub fn generate(inputs: &Inputs, config: &RunConfig) -> Result<Generated> {
    let (tables, database) = load(inputs)?;
    let records = prepare(database, &tables)?;
    let synthesis = synth::synthesize(&records, config)?;
    Ok(Generated { records, synthesis })
}
