//! Record-set passes: compound expansion, unique-name deletion and
//! versioning.

use super::block::RawBlock;
use crate::error::{Location, Result, parse_err};
use crate::record::InstructionRecord;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// One concrete form: every key has exactly one value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormFields {
    pub location: Location,
    pub fields: IndexMap<String, String>,
}

/// Split a block with several `PATTERN`/`OPERANDS` lines into one set of
/// fields per form. Single-valued keys are shared by every form.
pub fn expand_compound(block: RawBlock) -> Result<Vec<FormFields>> {
    let patterns = block.count("PATTERN");
    let operands = block.count("OPERANDS");
    if patterns <= 1 && operands <= 1 {
        let fields = block
            .fields
            .into_iter()
            .filter_map(|(k, v)| v.into_iter().next().map(|first| (k, first)))
            .collect();
        return Ok(vec![FormFields {
            location: block.location,
            fields,
        }]);
    }
    if patterns != operands {
        return parse_err!(
            block.location,
            "Mismatched number of patterns and operands lines: {} patterns, {} operands",
            patterns,
            operands
        );
    }

    let mut forms = Vec::with_capacity(patterns);
    for i in 0..patterns {
        let mut fields = IndexMap::with_capacity(block.fields.len());
        for (key, values) in &block.fields {
            let value = match values.as_slice() {
                [single] => single,
                many => match many.get(i) {
                    Some(v) => v,
                    None => {
                        return parse_err!(
                            block.location,
                            "{} has {} values for {} forms",
                            key,
                            many.len(),
                            patterns
                        );
                    }
                },
            };
            fields.insert(key.clone(), value.clone());
        }
        forms.push(FormFields {
            location: block.location.clone(),
            fields,
        });
    }
    Ok(forms)
}

/// Drop records whose unique name was deleted. Returns the survivors and
/// the number dropped.
pub fn drop_udeleted(
    records: Vec<InstructionRecord>,
    deleted: &HashSet<String>,
) -> (Vec<InstructionRecord>, usize) {
    let before = records.len();
    let kept: Vec<_> = records
        .into_iter()
        .filter(|r| !r.uname.as_ref().is_some_and(|u| deleted.contains(u)))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Keep, per instruction class, only the records of the highest version
/// seen so far. Walking in input order, a higher version replaces every
/// record gathered for its class, including unversioned ones; a lower
/// version is dropped; an unversioned record joins the current group.
/// Survivors stay in input order.
pub fn keep_latest_versions(records: Vec<InstructionRecord>) -> (Vec<InstructionRecord>, usize) {
    let mut groups: HashMap<&str, (u32, Vec<usize>)> = HashMap::new();
    let mut dropped = 0;
    for (i, r) in records.iter().enumerate() {
        let (current, members) = groups.entry(r.iclass.as_str()).or_default();
        match r.version {
            None => members.push(i),
            Some(v) if v > *current => {
                dropped += members.len();
                *current = v;
                *members = vec![i];
            }
            Some(v) if v == *current => members.push(i),
            Some(_) => dropped += 1,
        }
    }
    let mut keep = vec![false; records.len()];
    for (_, members) in groups.values() {
        for &i in members {
            keep[i] = true;
        }
    }
    let kept = records
        .into_iter()
        .zip(keep)
        .filter_map(|(r, keep)| keep.then_some(r))
        .collect();
    (kept, dropped)
}
