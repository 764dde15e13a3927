//! Reader for the brace-block pattern database.
//!
//! The reader turns database text into one [`InstructionRecord`] per
//! concrete instruction form. Attributes that depend on the pattern are
//! left at their defaults; see [`crate::derive`].

pub mod block;
pub mod expand;
pub mod lines;

use self::block::BlockReader;
use self::expand::{FormFields, drop_udeleted, expand_compound, keep_latest_versions};
use self::lines::{Directive, expand_slashes, join_continuations, nonterminal, strip_comment};
use crate::error::{Location, Result, parse_err};
use crate::operand::parse_operand;
use crate::record::InstructionRecord;
use crate::tables::Tables;
use std::collections::HashSet;

/// The records of one database after deletion and versioning.
#[derive(Clone, Debug, Default)]
pub struct Database {
    pub records: Vec<InstructionRecord>,
    /// Classes named by `DELETE` directives.
    pub deleted_classes: Vec<String>,
    /// Records dropped by `UDELETE` directives.
    pub udeletes_dropped: usize,
    /// Records dropped because a newer version of their class exists.
    pub versions_dropped: usize,
}

/// Read database `text`; `file` names it in error messages.
pub fn read_database(text: &str, file: &str, tables: &Tables) -> Result<Database> {
    let mut blocks = BlockReader::default();
    let mut deleted_unames = HashSet::new();
    let mut deleted_classes = Vec::new();
    let mut group = String::from("Unknown");
    let mut last = Location::new(file, 0);

    for (number, line) in join_continuations(text) {
        let loc = Location::new(file, number);
        let line = strip_comment(&line).trim();
        if line.is_empty() {
            continue;
        }
        let line = expand_slashes(line);
        match Directive::parse(&line) {
            Some(Directive::Udelete(uname)) => {
                deleted_unames.insert(uname.to_string());
                continue;
            }
            Some(Directive::DeleteClass(iclass)) => {
                deleted_classes.push(iclass.to_string());
                continue;
            }
            None => {}
        }

        let line = tables.state_bits.expand(&line);
        if let Some(name) = nonterminal(&line) {
            group = name.to_string();
        } else if line.starts_with('{') {
            blocks.open(&loc, &group)?;
        } else if line.starts_with('}') {
            blocks.close(&loc)?;
        } else {
            blocks.field(&loc, &line)?;
        }
        last = loc;
    }

    let mut records = Vec::new();
    for block in blocks.finish(&last)? {
        for form in expand_compound(block)? {
            records.push(materialize(form, tables)?);
        }
    }

    let (records, udeletes_dropped) = drop_udeleted(records, &deleted_unames);
    log::info!("UDELETES: dropped {udeletes_dropped} udelete records");
    let (records, versions_dropped) = keep_latest_versions(records);
    log::info!("VERSION DELETES: dropped {versions_dropped} versioned records");

    Ok(Database {
        records,
        deleted_classes,
        udeletes_dropped,
        versions_dropped,
    })
}

/// Build a record from the fields of one form and parse its operands.
fn materialize(form: FormFields, tables: &Tables) -> Result<InstructionRecord> {
    let FormFields {
        location,
        mut fields,
    } = form;
    let mut take = |key: &str| fields.shift_remove(key);

    let Some(iclass) = take("ICLASS") else {
        return parse_err!(location, "record without ICLASS");
    };
    let Some(pattern) = take("PATTERN") else {
        return parse_err!(location, "{}: record without PATTERN", iclass);
    };
    let version = match take("VERSION") {
        Some(v) => match v.parse() {
            Ok(v) => Some(v),
            Err(_) => return parse_err!(location, "{}: bad VERSION `{}`", iclass, v),
        },
        None => None,
    };
    let operands_text = take("OPERANDS").unwrap_or_default();
    let operands = operands_text
        .split_whitespace()
        .map(|token| parse_operand(token, &tables.widths, &tables.element_types))
        .collect::<Result<Vec<_>>>()?;

    let mut record = InstructionRecord {
        iclass,
        pattern,
        version,
        operands_text,
        operands,
        iform: take("IFORM").unwrap_or_default(),
        uname: take("UNAME"),
        nonterminal: take("NTNAME").unwrap_or_default(),
        extension: take("EXTENSION").unwrap_or_default(),
        isa_set: take("ISA_SET").unwrap_or_default(),
        category: take("CATEGORY").unwrap_or_default(),
        attributes: take("ATTRIBUTES").unwrap_or_default(),
        comment: take("COMMENT").unwrap_or_default(),
        cpl: take("CPL"),
        real_opcode: take("REAL_OPCODE").is_none_or(|v| v != "N"),
        ..Default::default()
    };
    record.extra = fields;
    Ok(record)
}
