//! Line-level preprocessing of the pattern database.

use regex::Regex;
use std::sync::LazyLock;

static UDELETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^UDELETE\s*:?\s*(?P<uname>[A-Za-z0-9_]+)").expect("static regex must compile")
});
static DELETE_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^DELETE\s*:?\s*(?P<iclass>[A-Za-z0-9_]+)").expect("static regex must compile")
});
static NONTERMINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<ntname>[A-Za-z_0-9]+)\s*\(\)\s*::\s*$").expect("static regex must compile")
});

/// Everything before the first `#`.
pub fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(at) => &line[..at],
        None => line,
    }
}

/// Join physical lines ending in `\` with their successor. Each logical
/// line keeps the 1-based number of its first physical line.
pub fn join_continuations(text: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (i, line) in text.lines().enumerate() {
        let (number, mut joined) = pending.take().unwrap_or((i + 1, String::new()));
        match line.strip_suffix('\\') {
            Some(head) => {
                joined.push_str(head);
                pending = Some((number, joined));
            }
            None => {
                joined.push_str(line);
                out.push((number, joined));
            }
        }
    }
    out.extend(pending);
    out
}

/// Replace each whitespace-separated `A/B/C` token by its alternatives
/// `A B C`, in place.
pub fn expand_slashes(line: &str) -> String {
    if !line.contains('/') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while !rest.is_empty() {
        let ws = rest.len() - rest.trim_start().len();
        out.push_str(&rest[..ws]);
        rest = &rest[ws..];
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..end];
        let parts: Vec<&str> = token.split('/').collect();
        if parts.len() > 1 && parts.iter().all(|p| !p.is_empty()) {
            out.push_str(&parts.join(" "));
        } else {
            out.push_str(token);
        }
        rest = &rest[end..];
    }
    out
}

/// A database line that is handled before state-bit substitution.
#[derive(Debug, PartialEq, Eq)]
pub enum Directive<'a> {
    /// Drop every record with this unique name.
    Udelete(&'a str),
    /// Mark an instruction class as deleted.
    DeleteClass(&'a str),
}

impl<'a> Directive<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        if let Some(m) = UDELETE.captures(line) {
            return m.name("uname").map(|u| Directive::Udelete(u.as_str()));
        }
        DELETE_CLASS
            .captures(line)
            .and_then(|m| m.name("iclass"))
            .map(|c| Directive::DeleteClass(c.as_str()))
    }
}

/// The group name from a `NAME()::` marker line.
pub fn nonterminal(line: &str) -> Option<&str> {
    NONTERMINAL
        .captures(line)
        .and_then(|m| m.name("ntname"))
        .map(|m| m.as_str())
}
