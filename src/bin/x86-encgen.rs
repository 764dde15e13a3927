//! The `x86-encgen` command line tool.
//!
//! Reads the pattern database and its side tables, then writes the
//! generated encoders and a summary report into the output directory.
//! See `x86-encgen --help` for usage.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use x86_encgen::{AddressSize, Inputs, Mode, RunConfig};

/// Generate x86 encoder functions from an instruction pattern database
#[derive(Parser, Debug)]
#[command(name = "x86-encgen", version)]
struct Args {
    /// 64-bit mode (default)
    #[arg(long)]
    m64: bool,
    /// 32-bit mode
    #[arg(long)]
    m32: bool,
    /// 16-bit mode
    #[arg(long)]
    m16: bool,
    /// 64-bit addressing (default)
    #[arg(long)]
    a64: bool,
    /// 32-bit addressing
    #[arg(long)]
    a32: bool,
    /// 16-bit addressing
    #[arg(long)]
    a16: bool,
    /// All modes and address sizes
    #[arg(long)]
    all: bool,

    /// Output directory; inputs default to files under `<GENDIR>/dgen`
    #[arg(long, default_value = "obj")]
    gendir: PathBuf,

    /// State-bit macro definitions
    #[arg(long)]
    state_bits: Option<PathBuf>,
    /// The instruction pattern database
    #[arg(long)]
    instructions: Option<PathBuf>,
    /// Operand width codes
    #[arg(long)]
    widths: Option<PathBuf>,
    /// Operand element types
    #[arg(long)]
    element_types: Option<PathBuf>,
    /// CPUID features per ISA set; skipped when absent
    #[arg(long)]
    cpuid: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> RunConfig {
        let modes = [(self.m64, Mode::M64), (self.m32, Mode::M32), (self.m16, Mode::M16)];
        let address_sizes = [
            (self.a64, AddressSize::A64),
            (self.a32, AddressSize::A32),
            (self.a16, AddressSize::A16),
        ];
        RunConfig::from_flags(&selected(&modes), &selected(&address_sizes), self.all)
    }

    fn inputs(&self) -> Inputs {
        let dgen = self.gendir.join("dgen");
        let or_default = |path: &Option<PathBuf>, name: &str| {
            path.clone().unwrap_or_else(|| dgen.join(name))
        };
        let cpuid = match &self.cpuid {
            Some(path) => Some(path.clone()),
            None => Some(dgen.join("all-cpuid.txt")).filter(|p| p.exists()),
        };
        Inputs {
            state_bits: or_default(&self.state_bits, "all-state.txt"),
            instructions: or_default(&self.instructions, "all-dec-instructions.txt"),
            widths: or_default(&self.widths, "all-widths.txt"),
            element_types: or_default(&self.element_types, "all-element-types.txt"),
            cpuid,
        }
    }
}

fn selected<T: Copy>(flags: &[(bool, T)]) -> Vec<T> {
    flags.iter().filter(|(on, _)| *on).map(|&(_, v)| v).collect()
}

fn write(path: &Path, text: &str) -> Result<()> {
    log::info!("Writing {}", path.display());
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.config();
    let inputs = args.inputs();

    log::info!("Reading the instruction database...");
    let generated = x86_encgen::generate(&inputs, &config)
        .with_context(|| format!("failed to generate encoders from {}", inputs.instructions.display()))?;

    fs::create_dir_all(&args.gendir)
        .with_context(|| format!("failed to create {}", args.gendir.display()))?;
    let encoders = args.gendir.join("encoders.rs");
    log::info!("Writing {}", encoders.display());
    generated
        .encoders()
        .write(&encoders)
        .with_context(|| format!("failed to write {}", encoders.display()))?;
    let summary = generated.summary();
    write(&args.gendir.join("encoders-summary.txt"), &summary)?;

    let stats = &generated.synthesis.stats;
    log::info!(
        "{} of {} forms handled, {} encoder functions",
        stats.handled,
        stats.forms,
        stats.generated
    );
    Ok(())
}
