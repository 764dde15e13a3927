//! Define the `Location` and `Error` types shared by every stage.
//!
//! All of these errors are fatal: the generator stops at the first one and
//! never produces partial output.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// A position in one of the input text files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    /// Name of the input, usually a file path.
    pub file: String,
    /// Line number, starting from 1. Zero means "no particular line".
    pub line_number: usize,
}

impl Location {
    pub fn new(file: impl Into<String>, line_number: usize) -> Self {
        Self {
            file: file.into(),
            line_number,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line_number == 0 {
            write!(f, "{}", self.file)
        } else {
            write!(f, "{}:{}", self.file, self.line_number)
        }
    }
}

/// A fatal generator error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An input file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The pattern database or a side table is structurally malformed.
    #[error("{location}: {message}")]
    Parse { location: Location, message: String },

    /// An operand token could not be turned into a descriptor.
    #[error("bad operand `{token}`: {message}")]
    Operand { token: String, message: String },

    /// A required instruction attribute could not be derived from its pattern.
    #[error("{iclass}: {message}")]
    Attribute { iclass: String, message: String },

    /// An instruction form violated an assumption of its encoding shape.
    #[error("{iclass} ({iform}): {message}")]
    Synthesis {
        iclass: String,
        iform: String,
        message: String,
    },
}

/// Result of a generator operation.
pub type Result<T> = std::result::Result<T, Error>;

// Create an `Err(Error::Parse)` from a location and `format!` args.
macro_rules! parse_err {
    ( $loc:expr, $msg:expr ) => {
        Err($crate::Error::Parse {
            location: $loc.clone(),
            message: $msg.to_string(),
        })
    };

    ( $loc:expr, $fmt:expr, $( $arg:expr ),+ ) => {
        Err($crate::Error::Parse {
            location: $loc.clone(),
            message: format!( $fmt, $( $arg ),+ ),
        })
    };
}
pub(crate) use parse_err;
