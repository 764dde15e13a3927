//! Per-record diagnostics, the summary report and run statistics.
//!
//! Synthesis may run records in parallel, so messages are buffered per
//! record and replayed through `log` in record order afterwards.

use crate::record::InstructionRecord;
use crate::synth::RecordOutcome;
use log::Level;
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<(Level, String)>,
}

impl Diagnostics {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.entries.push((Level::Warn, message.into()));
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.entries.push((Level::Debug, message.into()));
    }

    pub fn entries(&self) -> &[(Level, String)] {
        &self.entries
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(level, _)| *level == Level::Warn)
            .map(|(_, m)| m.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Send every buffered message to the logger.
    pub fn replay(&self) {
        for (level, message) in &self.entries {
            log::log!(*level, "{message}");
        }
    }
}

/// Outcome tag of a summary line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tag {
    /// At least one procedure was generated.
    Handled,
    /// Some environment did not apply to the record.
    Skipped,
    /// A lone non-memory, non-x87 operand that was not handled.
    LoneOperand,
    /// Any other unhandled record.
    Unhandled,
}

impl Tag {
    pub fn of(record: &InstructionRecord, outcome: &RecordOutcome) -> Self {
        if !outcome.procedures.is_empty() {
            return Self::Handled;
        }
        if outcome.skipped {
            return Self::Skipped;
        }
        let ops: Vec<_> = record.encodable_operands().collect();
        let lone_x87 = matches!(ops.as_slice(), [op] if op.is_reg() && op.is_x87() && !op.is_implicit());
        match ops.as_slice() {
            [op] if !op.is_mem() && !lone_x87 => Self::LoneOperand,
            _ => Self::Unhandled,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Handled => "XX  ",
            Self::Skipped => "SKIP",
            Self::LoneOperand => "ZZ  ",
            Self::Unhandled => "YY  ",
        })
    }
}

/// One line describing a record for the summary report.
pub fn summary_line(record: &InstructionRecord, outcome: &RecordOutcome) -> String {
    let mut s = vec![
        record.iclass.to_lowercase(),
        record.space.to_string(),
        record.isa_set.clone(),
        format!("{:#x}", record.opcode),
        record.map.to_string(),
        record.mode.tag().to_string(),
        record.easz.to_string(),
        record.eosz.to_string(),
    ];
    let wm = record.write_masking;
    if wm.enabled {
        s.push("masking".to_string());
        if wm.merging_only {
            s.push("nz".to_string());
        }
        if wm.not_k0 {
            s.push("!k0".to_string());
        }
    }
    for op in record.encodable_operands() {
        let mut name = op.name.clone();
        if let Some(width) = &op.width {
            name = format!("{name}-{width}");
        }
        s.push(name);
        if let Some(lookup) = &op.lookup_fn {
            s.push(format!("({lookup})"));
        } else if let Some(bits) = op.bits.as_deref().filter(|b| *b != "1") {
            s.push(format!("[{bits}]"));
        }
        if op.name == "MEM0" {
            if let (Some(vsib), Some(last)) = (record.vsib, s.last_mut()) {
                last.push_str(vsib.tag());
            }
        }
    }
    format!("{} {}", Tag::of(record, outcome), s.join(" "))
}

/// Aggregate counts over every record of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub forms: usize,
    pub handled: usize,
    pub unhandled: usize,
    /// Procedures generated over all records.
    pub generated: usize,
    /// Records with at least one skipped environment.
    pub skipped: usize,
}

impl Stats {
    pub fn gather<'a>(outcomes: impl IntoIterator<Item = &'a RecordOutcome>) -> Self {
        let mut stats = Self::default();
        for outcome in outcomes {
            stats.forms += 1;
            if outcome.procedures.is_empty() {
                stats.unhandled += 1;
            } else {
                stats.handled += 1;
            }
            stats.generated += outcome.procedures.len();
            if outcome.skipped {
                stats.skipped += 1;
            }
        }
        stats
    }

    fn percent(&self, n: usize) -> f64 {
        if self.forms == 0 {
            0.0
        } else {
            100.0 * n as f64 / self.forms as f64
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Forms:       {:4}", self.forms)?;
        writeln!(f, "Handled:     {:4}  ({:6.2}%)", self.handled, self.percent(self.handled))?;
        writeln!(f, "Not handled: {:4}  ({:6.2}%)", self.unhandled, self.percent(self.unhandled))?;
        writeln!(f, "Generated encoding functions: {:5}", self.generated)?;
        write!(f, "Skipped encoding functions:   {:5}", self.skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{AddressSize, Environment, Mode};
    use crate::operand::parse_operand;
    use crate::record::RecordId;
    use crate::synth::EncoderProcedure;
    use crate::tables::{ElementTypes, Widths};

    fn record(operands: &str) -> InstructionRecord {
        let widths = Widths::default();
        let xtypes = ElementTypes::default();
        InstructionRecord {
            iclass: "PUSH".to_string(),
            isa_set: "I86".to_string(),
            opcode: 0x06,
            operands: operands
                .split_whitespace()
                .map(|t| parse_operand(t, &widths, &xtypes).unwrap())
                .collect(),
            ..Default::default()
        }
    }

    fn handled() -> RecordOutcome {
        let env = Environment::new(Mode::M64, AddressSize::A64).unwrap();
        RecordOutcome {
            procedures: vec![EncoderProcedure::new("push_es", env, RecordId(0))],
            ..Default::default()
        }
    }

    #[test]
    fn tags() {
        let skipped = RecordOutcome {
            skipped: true,
            ..Default::default()
        };
        let none = RecordOutcome::default();
        let r = record("REG0=XED_REG_ES:r:IMPL");
        assert_eq!(Tag::of(&r, &handled()), Tag::Handled);
        assert_eq!(Tag::of(&r, &skipped), Tag::Skipped);
        assert_eq!(Tag::of(&r, &none), Tag::LoneOperand);
        assert_eq!(Tag::of(&record("REG0=X87():r"), &none), Tag::Unhandled);
        assert_eq!(Tag::of(&record("MEM0:r:b"), &none), Tag::Unhandled);
    }

    #[test]
    fn summary_text() {
        let r = record("REG0=XED_REG_ES:r:IMPL MEM0:r:b");
        assert_eq!(
            summary_line(&r, &handled()),
            "XX   push legacy I86 0x6 0 mall aszall oszall REG0 [XED_REG_ES] MEM0-b"
        );
    }

    #[test]
    fn stats_add_up() {
        let outcomes = [handled(), RecordOutcome::default(), handled()];
        let stats = Stats::gather(&outcomes);
        assert_eq!(stats.forms, 3);
        assert_eq!(stats.handled + stats.unhandled, stats.forms);
        assert_eq!(stats.generated, 2);
        assert_eq!(
            stats.to_string(),
            "\
Forms:          3
Handled:        2  ( 66.67%)
Not handled:    1  ( 33.33%)
Generated encoding functions:     2
Skipped encoding functions:       0"
        );
        assert_eq!(Stats::gather(&[]).percent(0), 0.0);
    }

    #[test]
    fn buffered_messages() {
        let mut d = Diagnostics::default();
        assert!(d.is_empty());
        d.debug("oszall");
        d.warn("Need to handle ArAX");
        assert_eq!(d.entries().len(), 2);
        assert_eq!(d.warnings().collect::<Vec<_>>(), ["Need to handle ArAX"]);
        d.replay();
    }
}
