use std::fmt;
use std::io::{stderr, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One collected diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub location: Option<rexlex::Location>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self.severity {
            Severity::Warning => "Warning",
            Severity::Error => "Error",
        };
        if let Some(location) = &self.location {
            write!(f, "{}: {}: {}.", location, label, self.message)
        } else {
            write!(f, "{}: {}.", label, self.message)
        }
    }
}

/// Collected warnings and errors from analysis and table construction.
///
/// Generation keeps going after a warning so several diagnostics can
/// surface from one run; `report` writes the lot to stderr.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    warning_count: u32,
    error_count: u32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn warning(&mut self, message: String, location: Option<rexlex::Location>) {
        self.warning_count += 1;
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            message,
            location,
        });
    }

    pub fn error(&mut self, message: String, location: Option<rexlex::Location>) {
        self.error_count += 1;
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            message,
            location,
        });
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn iter(&self) -> std::slice::Iter<Diagnostic> {
        self.entries.iter()
    }

    pub fn report(&self) {
        let mut dest = stderr();
        for entry in &self.entries {
            writeln!(dest, "{}", entry).expect("nowhere to go");
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry)?;
        }
        Ok(())
    }
}
