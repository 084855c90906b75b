//! Accumulated compile-time messages.
//!
//! Lowering, binding and pass assembly keep going after a problem so one
//! compile reports everything it can; the runtime decides at the end whether
//! the effect is usable.

use std::fmt;

use crate::ast::Location;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// `None` for backend output (e.g. program link logs) that is passed
    /// through verbatim.
    pub location: Option<Location>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(loc) = &self.location else {
            return f.write_str(self.message.trim_end());
        };
        let kind = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{}({}, {}): {}: {}",
            loc.source, loc.line, loc.column, kind, self.message
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, location: &Location, message: impl Into<String>) {
        self.push(Severity::Error, Some(location.clone()), message.into());
    }

    pub fn warning(&mut self, location: &Location, message: impl Into<String>) {
        self.push(Severity::Warning, Some(location.clone()), message.into());
    }

    /// Records backend output as a fatal entry without a source location.
    pub fn backend_error(&mut self, log: impl Into<String>) {
        self.push(Severity::Error, None, log.into());
    }

    fn push(&mut self, severity: Severity, location: Option<Location>, message: String) {
        match severity {
            Severity::Error => log::debug!("compile error: {message}"),
            Severity::Warning => log::debug!("compile warning: {message}"),
        }
        self.entries.push(Diagnostic {
            severity,
            location,
            message,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// The accumulated text blob, one entry per line.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_render_with_location() {
        let mut diags = Diagnostics::new();
        let loc = Location::new("shader.fx", 12, 4);
        diags.warning(&loc, "a texture cannot have 0 miplevels, changed it to 1");
        diags.error(&loc, "unknown sampler");
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
        assert_eq!(
            diags.text(),
            "shader.fx(12, 4): warning: a texture cannot have 0 miplevels, changed it to 1\n\
             shader.fx(12, 4): error: unknown sampler\n"
        );
    }

    #[test]
    fn test_backend_errors_are_verbatim_and_fatal() {
        let mut diags = Diagnostics::new();
        diags.backend_error("link failed: missing main\n");
        assert!(diags.has_errors());
        assert_eq!(diags.text(), "link failed: missing main\n");
    }

    #[test]
    fn test_warnings_alone_are_not_fatal() {
        let mut diags = Diagnostics::new();
        diags.warning(&Location::default(), "ignored");
        assert!(!diags.has_errors());
        assert!(!diags.is_empty());
    }
}
