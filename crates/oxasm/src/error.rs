//! Diagnostics and source positions.
//!
//! The parser never aborts on a bad line: it reports through the host's
//! diagnostic sink and recovers at the next comma.  A [`Diag`] therefore
//! carries a severity rather than being an `Err` payload.
//!
//! Positions are byte ranges within the current line buffer.  The parser
//! sees exactly one pre-processed line per call; the driver that handed
//! the line over already knows the file and line number, so a location
//! here only needs to say where in the buffer the construct sits.

use alloc::string::String;
use core::fmt;

/// Where a construct sits in the pre-processed line buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    /// 0-based byte offset of the first byte.
    pub start: usize,
    /// Length in bytes; tokens the parser synthesizes use 0.
    pub len: usize,
}

impl Span {
    /// The range of `len` bytes beginning at `start`.
    #[must_use]
    pub fn at(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Placeholder for synthesized tokens (pushed-back zeros, the
    /// end-of-statement marker).
    #[must_use]
    pub fn empty() -> Self {
        Self { start: 0, len: 0 }
    }

    /// One past the last byte covered.
    #[must_use]
    pub fn end(self) -> usize {
        self.start + self.len
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 1-based column, the way assemblers conventionally report it.
        write!(f, "col {}", self.start + 1)
    }
}

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Suspicious but legal construct; assembly continues unchanged.
    Warning,
    /// The construct is rejected; the parser recovers at the next comma.
    Error,
}

/// Classification for suppressible warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WarnClass {
    /// A label alone on a line without a trailing colon.
    LabelOrphan,
    /// A data declaration with no operands.
    DbEmpty,
    /// An explicit size inconsistent with the named register's size.
    RegSize,
    /// The same prefix given twice.
    PrefixRedundant,
    /// Anything else.
    Other,
}

/// One diagnostic, as delivered to [`Host::diag`](crate::Host::diag).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diag {
    /// Error or warning.
    pub severity: Severity,
    /// Warning class; `Other` for errors.
    pub class: WarnClass,
    /// Human-readable message.
    pub message: String,
    /// Source location, when one is known.
    pub span: Span,
}

impl Diag {
    /// Build an error diagnostic.
    #[must_use]
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            class: WarnClass::Other,
            message: message.into(),
            span,
        }
    }

    /// Build a warning diagnostic of the given class.
    #[must_use]
    pub fn warn(class: WarnClass, message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            class,
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", self.span, kind, self.message)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Diag {}
