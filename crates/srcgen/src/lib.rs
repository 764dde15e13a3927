//! Collect generated Rust source text line by line.
//!
//! Use [`fmtln`] by default since it appends a comment naming the generator
//! source location to each line it writes. For more control, use the
//! [`Formatter`] directly.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

const SHIFTWIDTH: usize = 4;

/// Write a formatted line into a [`Formatter`], tagged with the location of
/// the call.
#[macro_export]
macro_rules! fmtln {
    ($fmt:ident, $fmtstring:expr, $($fmtargs:expr),*) => {{
        let loc = $crate::maybe_file_loc($fmtstring, file!(), line!());
        $fmt.line(format!($fmtstring, $($fmtargs),*), loc)
    }};

    ($fmt:ident, $arg:expr) => {{
        let loc = $crate::maybe_file_loc($arg, file!(), line!());
        $fmt.line(format!($arg), loc)
    }};

    ($_:tt, $($args:expr),+) => {
        compile_error!("This macro requires at least two arguments: the Formatter instance and a format string.")
    };

    ($_:tt) => {
        compile_error!("This macro requires at least two arguments: the Formatter instance and a format string.")
    };
}

/// Only tag lines that neither open nor close a braced block.
pub fn maybe_file_loc(fmtstr: &str, file: &'static str, line: u32) -> Option<FileLocation> {
    if fmtstr.ends_with(['{', '}']) {
        None
    } else {
        Some(FileLocation { file, line })
    }
}

/// A generator source location; preferably, use [`fmtln`] directly.
#[derive(Clone, Copy, Debug)]
pub struct FileLocation {
    file: &'static str,
    line: u32,
}

impl FileLocation {
    pub fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Collect source code to be written to a file and keep track of indentation.
#[derive(Default)]
pub struct Formatter {
    indent: usize,
    lines: Vec<String>,
}

impl Formatter {
    /// Construct a [`Formatter`] whose first line is the `generated_by`
    /// header followed by the location that created it.
    pub fn new(generated_by: &str, file: &'static str, line: u32) -> Self {
        let mut fmt = Self::default();
        let loc = FileLocation::new(file, line);
        fmt.line(format!("// {generated_by}, {loc}"), None);
        fmt
    }

    /// Increase current indentation level by one.
    pub fn indent_push(&mut self) {
        self.indent += 1;
    }

    /// Decrease indentation by one level.
    ///
    /// # Panics
    ///
    /// Panics if already at the top level.
    pub fn indent_pop(&mut self) {
        assert!(self.indent > 0, "Already at top level indentation");
        self.indent -= 1;
    }

    /// Write all formatting commands in `f` while indented one level.
    pub fn indent<T, F: FnOnce(&mut Formatter) -> T>(&mut self, f: F) -> T {
        self.indent_push();
        let ret = f(self);
        self.indent_pop();
        ret
    }

    /// Write `head {`, the lines produced by `f` one level deeper, and a
    /// closing `}`.
    pub fn block<T, F: FnOnce(&mut Formatter) -> T>(&mut self, head: impl AsRef<str>, f: F) -> T {
        self.line(format!("{} {{", head.as_ref()), None);
        let ret = self.indent(f);
        self.line("}", None);
        ret
    }

    fn get_indent(&self) -> String {
        " ".repeat(self.indent * SHIFTWIDTH)
    }

    /// Add an indented line.
    pub fn line(&mut self, contents: impl AsRef<str>, location: Option<FileLocation>) {
        let indented_line = match location {
            Some(location) => format!("{}{} // {location}\n", self.get_indent(), contents.as_ref()),
            None => format!("{}{}\n", self.get_indent(), contents.as_ref()),
        };
        self.lines.push(indented_line);
    }

    /// Push an empty line.
    pub fn empty_line(&mut self) {
        self.lines.push("\n".to_string());
    }

    /// Add a doc comment line.
    pub fn doc_comment(&mut self, s: impl AsRef<str>) {
        self.line(format!("/// {}", s.as_ref()), None);
    }

    /// The collected text.
    pub fn text(&self) -> String {
        self.lines.concat()
    }

    /// Write the collected lines to a file.
    pub fn write(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut f = fs::File::create(path)?;
        for l in self.lines.iter().map(String::as_bytes) {
            f.write_all(l)?;
        }
        Ok(())
    }
}
