//! Diagnostic collection, mirroring the collector pattern used throughout
//! the lowering pipeline: passes accumulate `Diagnostic`s rather than
//! failing on the first problem.

use std::fmt;

/// A position in a source file, or the default "nowhere" location for
/// diagnostics raised about synthetic (lowering-generated) IR.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    pub filename: String,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(filename: impl Into<String>, line: u32, column: u32) -> Self {
        Location {
            filename: filename.into(),
            line,
            column,
        }
    }

    pub fn nowhere() -> Self {
        Location {
            filename: "(none)".to_string(),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Error => "Error",
            Level::Warning => "Warning",
            Level::Info => "Info",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub location: Location,
    pub level: Level,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.level, self.location, self.message)
    }
}

/// Accumulates diagnostics across an entire compilation. Every pass takes a
/// `&mut Diagnostics` rather than returning on the first error, so a single
/// run can report everything wrong with a program at once.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn report(&mut self, location: Location, level: Level, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            location,
            level,
            message: message.into(),
        });
    }

    pub fn error(&mut self, location: Location, message: impl Into<String>) {
        self.report(location, Level::Error, message);
    }

    pub fn warning(&mut self, location: Location, message: impl Into<String>) {
        self.report(location, Level::Warning, message);
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.level == Level::Error)
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Writes every entry to `out`, one per line, in the `Error:`/`Warning:`/
    /// `Info:` + `file:line:col:` format.
    pub fn write_to(&self, mut out: impl std::io::Write) -> std::io::Result<()> {
        for entry in &self.entries {
            writeln!(out, "{}", entry)?;
        }
        Ok(())
    }
}
