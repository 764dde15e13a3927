//! The brace-block state machine.
//!
//! Outside a block only `{` is accepted; inside, `KEY: value` lines
//! accumulate until `}`. Keys may repeat, collecting a list of values.

use crate::error::{Location, Result, parse_err};
use indexmap::IndexMap;

/// One `{ ... }` block with its fields in first-seen key order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawBlock {
    /// Where the block opened.
    pub location: Location,
    pub fields: IndexMap<String, Vec<String>>,
}

impl RawBlock {
    pub fn count(&self, key: &str) -> usize {
        self.fields.get(key).map_or(0, Vec::len)
    }
}

#[derive(Default)]
pub struct BlockReader {
    current: Option<RawBlock>,
    blocks: Vec<RawBlock>,
}

impl BlockReader {
    /// Start a block; every block is stamped with its non-terminal group.
    pub fn open(&mut self, loc: &Location, nonterminal: &str) -> Result<()> {
        if self.current.is_some() {
            return parse_err!(loc, "Nested instructions");
        }
        let mut block = RawBlock {
            location: loc.clone(),
            fields: IndexMap::new(),
        };
        block
            .fields
            .insert("NTNAME".to_string(), vec![nonterminal.to_string()]);
        self.current = Some(block);
        Ok(())
    }

    pub fn close(&mut self, loc: &Location) -> Result<()> {
        match self.current.take() {
            Some(block) => {
                self.blocks.push(block);
                Ok(())
            }
            None => parse_err!(loc, "Mis-nested instructions"),
        }
    }

    /// Add a `KEY: value` line to the open block.
    pub fn field(&mut self, loc: &Location, line: &str) -> Result<()> {
        let Some(block) = self.current.as_mut() else {
            return parse_err!(loc, "Unexpected: [{}]", line);
        };
        let Some((key, value)) = line.split_once(':') else {
            return parse_err!(loc, "Expected `KEY: value`, found: [{}]", line);
        };
        let key = key.trim();
        if key.is_empty() {
            return parse_err!(loc, "Missing key in: [{}]", line);
        }
        if key == "IFORM" {
            // Forms declared before their first IFORM line get an empty one.
            let patterns = block.count("PATTERN");
            let iforms = block.fields.entry("IFORM".to_string()).or_default();
            while iforms.len() + 1 < patterns {
                iforms.push(String::new());
            }
        }
        block
            .fields
            .entry(key.to_string())
            .or_default()
            .push(value.trim().to_string());
        Ok(())
    }

    pub fn finish(self, loc: &Location) -> Result<Vec<RawBlock>> {
        if let Some(block) = self.current {
            return parse_err!(loc, "Unterminated block opened at {}", block.location);
        }
        Ok(self.blocks)
    }
}
