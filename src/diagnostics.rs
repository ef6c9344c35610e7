//! Recoverable emission diagnostics.
//!
//! Not every irregular input aborts the write. Identifiers longer than the format's documented
//! maximum are still written untruncated (the format technically allows them; only some
//! downstream tooling objects), and PDB-bound strings past the native symbol writer's empirical
//! limit are a warning only. Those conditions are reported through [`DiagnosticSink`] and the
//! emission continues.
//!
//! The writer does not buffer or deduplicate diagnostics; that is the caller's responsibility.

use std::fmt;

/// Maximum UTF-8 byte length of a metadata identifier (type, member, namespace, assembly,
/// module or file name) before a diagnostic is raised.
pub const MAX_IDENTIFIER_LENGTH: usize = 1023;

/// Maximum length of a path-like metadata string.
pub const MAX_PATH_LENGTH: usize = 259;

/// Empirical maximum string length accepted by the native symbol-writer API before it starts
/// throwing. Discovered by observation, kept verbatim for compatibility.
pub const MAX_PDB_STRING_LENGTH: usize = 2046;

/// Stable code identifying the kind of a recoverable emission diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// A metadata identifier exceeds [`MAX_IDENTIFIER_LENGTH`] bytes of UTF-8.
    NameTooLong,
    /// A file path written to metadata exceeds [`MAX_PATH_LENGTH`].
    PathTooLong,
    /// A PDB-bound string (local name, using-directive) exceeds [`MAX_PDB_STRING_LENGTH`].
    /// Warning only; never blocks emission.
    PdbStringTooLong,
}

/// A single recoverable diagnostic produced during emission.
///
/// Carries the code, the offending symbol's name for caller-side location mapping, and a
/// preformatted message.
#[derive(Debug, Clone)]
pub struct EmitDiagnostic {
    /// What rule was violated.
    pub code: DiagnosticCode,
    /// Name of the symbol the diagnostic is keyed to, when one exists.
    pub symbol: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for EmitDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{:?}: {} ({})", self.code, self.message, symbol),
            None => write!(f, "{:?}: {}", self.code, self.message),
        }
    }
}

/// Receiver for recoverable diagnostics raised during emission.
///
/// Implemented by the caller; the writer pushes and moves on.
pub trait DiagnosticSink {
    /// Reports one diagnostic. Must not fail; the writer does not expect feedback.
    fn report(&mut self, diagnostic: EmitDiagnostic);
}

/// Collects diagnostics into a `Vec`, the default sink when the caller supplies none.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Everything reported so far, in emission order.
    pub diagnostics: Vec<EmitDiagnostic>,
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, diagnostic: EmitDiagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Checks an identifier against [`MAX_IDENTIFIER_LENGTH`] and reports when it is oversized.
///
/// The name is still written in full afterwards; truncation is never attempted.
pub fn check_name_length(name: &str, sink: &mut dyn DiagnosticSink) {
    if name.len() > MAX_IDENTIFIER_LENGTH {
        sink.report(EmitDiagnostic {
            code: DiagnosticCode::NameTooLong,
            symbol: Some(truncate_for_message(name)),
            message: format!(
                "metadata name is {} bytes, exceeding the maximum of {}",
                name.len(),
                MAX_IDENTIFIER_LENGTH
            ),
        });
    }
}

/// Checks a path-like string against [`MAX_PATH_LENGTH`].
pub fn check_path_length(path: &str, sink: &mut dyn DiagnosticSink) {
    if path.len() > MAX_PATH_LENGTH {
        sink.report(EmitDiagnostic {
            code: DiagnosticCode::PathTooLong,
            symbol: Some(truncate_for_message(path)),
            message: format!(
                "metadata path is {} bytes, exceeding the maximum of {}",
                path.len(),
                MAX_PATH_LENGTH
            ),
        });
    }
}

/// Checks a PDB-bound string against [`MAX_PDB_STRING_LENGTH`].
///
/// For [`crate::writer::DebugSink`] implementations; the string is still handed to the symbol
/// writer in full.
pub fn check_pdb_string_length(value: &str, sink: &mut dyn DiagnosticSink) {
    if value.len() > MAX_PDB_STRING_LENGTH {
        sink.report(EmitDiagnostic {
            code: DiagnosticCode::PdbStringTooLong,
            symbol: Some(truncate_for_message(value)),
            message: format!(
                "debug string is {} bytes, exceeding the symbol writer's limit of {}",
                value.len(),
                MAX_PDB_STRING_LENGTH
            ),
        });
    }
}

fn truncate_for_message(name: &str) -> String {
    let mut end = name.len().min(64);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_produces_no_diagnostic() {
        let mut sink = CollectingSink::default();
        check_name_length("System.Object", &mut sink);
        assert!(sink.diagnostics.is_empty());
    }

    #[test]
    fn test_oversized_name_produces_one_diagnostic() {
        let mut sink = CollectingSink::default();
        let name = "N".repeat(MAX_IDENTIFIER_LENGTH + 1);
        check_name_length(&name, &mut sink);
        assert_eq!(sink.diagnostics.len(), 1);
        assert_eq!(sink.diagnostics[0].code, DiagnosticCode::NameTooLong);
    }

    #[test]
    fn test_oversized_pdb_string_is_a_warning() {
        let mut sink = CollectingSink::default();
        let value = "u".repeat(MAX_PDB_STRING_LENGTH + 1);
        check_pdb_string_length(&value, &mut sink);
        assert_eq!(sink.diagnostics.len(), 1);
        assert_eq!(sink.diagnostics[0].code, DiagnosticCode::PdbStringTooLong);
    }

    #[test]
    fn test_boundary_name_is_accepted() {
        let mut sink = CollectingSink::default();
        let name = "N".repeat(MAX_IDENTIFIER_LENGTH);
        check_name_length(&name, &mut sink);
        assert!(sink.diagnostics.is_empty());
    }
}
