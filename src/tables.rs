//! Side tables loaded once before reading the pattern database: operand
//! widths, element types, CPUID feature names and state-bit macros.
//!
//! Each table is a plain name lookup; nothing here interprets instructions.

use crate::error::{Location, Result, parse_err};
use crate::reader::lines::{expand_slashes, strip_comment};
use regex::{NoExpand, Regex};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Read a whole input file.
pub fn read_input(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| crate::Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Every side table, loaded once and shared read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct Tables {
    pub widths: Widths,
    pub element_types: ElementTypes,
    pub cpuid: CpuidMap,
    pub state_bits: StateBits,
}

/// One line of the widths file: the bit width of an operand width code at
/// each effective operand size.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WidthInfo {
    pub name: String,
    pub dtype: String,
    /// Widths in bits for effective operand sizes 8, 16, 32 and 64.
    pub bits: [u32; 4],
}

/// Operand width codes, keyed by upper-cased name.
#[derive(Clone, Debug, Default)]
pub struct Widths {
    map: HashMap<String, WidthInfo>,
}

impl Widths {
    pub fn parse(text: &str, file: &str) -> Result<Self> {
        let mut map = HashMap::new();
        for (i, line) in text.lines().enumerate() {
            let loc = Location::new(file, i + 1);
            let line = strip_comment(line).trim();
            if line.is_empty() {
                continue;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            let (name, dtype, raw) = match words.as_slice() {
                [name, dtype, all] => (name, dtype, [*all, *all, *all, *all]),
                [name, dtype, w16, w32, w64] => (name, dtype, ["0", *w16, *w32, *w64]),
                _ => return parse_err!(loc, "Bad number of tokens on line: {}", line),
            };
            let mut bits = [0; 4];
            for (slot, value) in bits.iter_mut().zip(raw) {
                *slot = width_in_bits(value).ok_or_else(|| crate::Error::Parse {
                    location: loc.clone(),
                    message: format!("bad width `{value}`"),
                })?;
            }
            let name = name.to_uppercase();
            map.insert(
                name.clone(),
                WidthInfo {
                    name,
                    dtype: dtype.to_string(),
                    bits,
                },
            );
        }
        Ok(Self { map })
    }

    pub fn get(&self, code: &str) -> Option<&WidthInfo> {
        self.map.get(&code.to_uppercase())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

/// Values are in bytes unless written in the explicit `<n>bits` form.
fn width_in_bits(value: &str) -> Option<u32> {
    match value.strip_suffix("bits") {
        Some(n) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => n.parse().ok(),
        _ => value.parse::<u32>().ok().map(|bytes| bytes * 8),
    }
}

/// Names of operand element types.
#[derive(Clone, Debug, Default)]
pub struct ElementTypes {
    names: HashSet<String>,
}

impl ElementTypes {
    pub fn parse(text: &str) -> Self {
        let names = text
            .lines()
            .filter_map(|line| strip_comment(line).split_whitespace().next())
            .map(str::to_string)
            .collect();
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// CPUID feature names per ISA set.
#[derive(Clone, Debug, Default)]
pub struct CpuidMap {
    map: HashMap<String, Vec<String>>,
}

impl CpuidMap {
    pub fn parse(text: &str, file: &str) -> Result<Self> {
        let mut map = HashMap::new();
        for (i, line) in text.lines().enumerate() {
            let line = strip_comment(line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, features)) = line.split_once(':') else {
                return parse_err!(Location::new(file, i + 1), "Bad cpuid line: {}", line);
            };
            let key = key.trim();
            let isa_set = match key.find("ISA_SET_") {
                Some(at) => &key[at + "ISA_SET_".len()..],
                None => key,
            };
            map.insert(
                isa_set.to_uppercase(),
                features.split_whitespace().map(str::to_string).collect(),
            );
        }
        Ok(Self { map })
    }

    /// Feature names for `isa_set`, empty when unknown.
    pub fn features(&self, isa_set: &str) -> &[String] {
        self.map
            .get(&isa_set.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Whole-word macro substitutions applied to every database line.
#[derive(Clone, Debug, Default)]
pub struct StateBits {
    substitutions: Vec<(Regex, String)>,
}

impl StateBits {
    pub fn parse(text: &str, file: &str) -> Result<Self> {
        let mut substitutions = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let loc = Location::new(file, i + 1);
            let line = strip_comment(line).trim_start();
            if line.trim().is_empty() {
                continue;
            }
            let line = expand_slashes(line);
            let Some((key, value)) = line.trim_end().split_once(char::is_whitespace) else {
                return parse_err!(loc, "Bad state line: {}", line);
            };
            let re = Regex::new(&whole_word(key)).map_err(|e| {
                crate::Error::Parse {
                    location: loc.clone(),
                    message: e.to_string(),
                }
            })?;
            substitutions.push((re, value.trim().to_string()));
        }
        Ok(Self { substitutions })
    }

    /// Apply every substitution, in file order.
    pub fn expand(&self, line: &str) -> String {
        let mut line = line.to_string();
        for (re, value) in &self.substitutions {
            if re.is_match(&line) {
                line = re.replace_all(&line, NoExpand(value)).into_owned();
            }
        }
        line
    }

    pub fn len(&self) -> usize {
        self.substitutions.len()
    }
}

/// A pattern matching `key` as a whole word. Word boundaries are only
/// required at edges where `key` itself has a word character.
fn whole_word(key: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut pattern = String::new();
    if key.starts_with(is_word) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(key));
    if key.ends_with(is_word) {
        pattern.push_str(r"\b");
    }
    pattern
}
