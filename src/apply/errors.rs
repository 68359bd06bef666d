use std::fmt;

/// Why a patch was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The original text could not be found in the file, even after
    /// whitespace normalization
    SpanNotFound,
    /// The replacement is empty or not a plausible function body
    MalformedReplacement,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SpanNotFound => write!(f, "original span not found in file"),
            SkipReason::MalformedReplacement => write!(f, "replacement is not a function body"),
        }
    }
}
