//! Collaborators that map between emulator addresses and source text.
//!
//! The listing table and the file reader live outside this crate; the engine
//! only borrows their answers.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A line in a source file. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentLocation {
    pub file: PathBuf,
    pub line: usize,
}

impl DocumentLocation {
    pub fn new<P: Into<PathBuf>>(file: P, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Where a line of code lives on the calculator. `page` is app-relative for
/// Flash code in app sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalcLocation {
    pub address: u16,
    pub page: u8,
    pub is_ram: bool,
}

impl CalcLocation {
    pub fn new(address: u16, page: u8, is_ram: bool) -> Self {
        Self {
            address,
            page,
            is_ram,
        }
    }
}

pub trait SymbolService {
    fn file_location(&self, page: u8, address: u16, is_ram: bool) -> Option<DocumentLocation>;
    fn calc_location(&self, file: &Path, line: usize) -> Option<CalcLocation>;
    /// First location with code at or after `line` in `file`.
    fn next_nearest_calc_location(&self, file: &Path, line: usize) -> Option<CalcLocation>;
}

pub trait LineReader {
    fn line(&self, file: &Path, line: usize) -> Option<String>;
}
