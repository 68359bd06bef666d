use crate::apply::errors::SkipReason;
use crate::apply::matcher::{find_region, trim_blank_lines, MatchStrategy};
use std::fmt;
use tracing::debug;

/// Result of one substitution attempt.
///
/// There is no partial state: when `applied` is false the returned text is
/// the input text, byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "PatchOutcome should be checked for success/failure"]
pub struct PatchOutcome {
    pub applied: bool,
    pub reason: Option<SkipReason>,
    pub strategy: Option<MatchStrategy>,
}

impl PatchOutcome {
    pub fn applied(strategy: MatchStrategy) -> Self {
        Self {
            applied: true,
            reason: None,
            strategy: Some(strategy),
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            applied: false,
            reason: Some(reason),
            strategy: None,
        }
    }
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.applied, self.strategy, self.reason) {
            (true, Some(strategy), _) => write!(f, "applied ({strategy} match)"),
            (true, None, _) => write!(f, "applied"),
            (false, _, Some(reason)) => write!(f, "not applied: {reason}"),
            (false, _, None) => write!(f, "not applied"),
        }
    }
}

/// Replace the first occurrence of `original` in `file_text` with
/// `replacement`.
///
/// Both inputs are trimmed of leading/trailing blank lines first. The
/// returned text equals `file_text` whenever the outcome is not applied.
pub fn apply(file_text: &str, original: &str, replacement: &str) -> (String, PatchOutcome) {
    let replacement = trim_blank_lines(replacement);
    if replacement.is_empty() {
        return (
            file_text.to_string(),
            PatchOutcome::skipped(SkipReason::MalformedReplacement),
        );
    }

    let Some(region) = find_region(file_text, original) else {
        debug!("original text not found by any matching strategy");
        return (
            file_text.to_string(),
            PatchOutcome::skipped(SkipReason::SpanNotFound),
        );
    };

    let mut patched = String::with_capacity(
        file_text.len() + replacement.len() - (region.byte_end - region.byte_start),
    );
    patched.push_str(&file_text[..region.byte_start]);
    patched.push_str(replacement);
    patched.push_str(&file_text[region.byte_end..]);

    debug!(
        strategy = %region.strategy,
        byte_start = region.byte_start,
        bytes_changed = replacement.len(),
        "replacement applied"
    );
    (patched, PatchOutcome::applied(region.strategy))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUGGY: &str = "int add(int a, int b) {\n  return a - b;\n}\n";
    const FIXED: &str = "int add(int a, int b) {\n  return a + b;\n}";

    #[test]
    fn end_to_end_add_fix() {
        let file = format!("#include <cstdio>\n\n{BUGGY}\nint main() {{ return add(1, 2); }}\n");
        let (patched, outcome) = apply(&file, BUGGY, FIXED);

        assert!(outcome.applied);
        assert_eq!(outcome.strategy, Some(MatchStrategy::Exact));
        assert_eq!(
            patched,
            format!("#include <cstdio>\n\n{FIXED}\n\nint main() {{ return add(1, 2); }}\n")
        );
    }

    #[test]
    fn second_application_reports_span_not_found() {
        let (once, first) = apply(BUGGY, BUGGY, FIXED);
        assert!(first.applied);

        let (twice, second) = apply(&once, BUGGY, FIXED);
        assert!(!second.applied);
        assert_eq!(second.reason, Some(SkipReason::SpanNotFound));
        assert_eq!(twice, once);
    }

    #[test]
    fn whitespace_tolerant_replacement_is_verbatim() {
        let file = "// math\nint sum(int a, int b) {\n    int s = a - b;\n    return s;\n}\n// end\n";
        let original = "int sum(int a, int b) {\n  int s = a - b;\n  return s;\n}";
        let replacement = "int sum(int a, int b) {\n  int s = a + b;\n  return s;\n}";

        let (patched, outcome) = apply(file, original, replacement);

        assert!(outcome.applied);
        assert_eq!(outcome.strategy, Some(MatchStrategy::WhitespaceNormalized));
        assert_eq!(patched, format!("// math\n{replacement}\n// end\n"));
    }

    #[test]
    fn only_first_occurrence_is_replaced() {
        let file = format!("{BUGGY}\n{BUGGY}");
        let (patched, outcome) = apply(&file, BUGGY, FIXED);

        assert!(outcome.applied);
        assert_eq!(patched, format!("{FIXED}\n\n{BUGGY}"));
    }

    #[test]
    fn unmatched_original_leaves_file_untouched() {
        let file = "int mul(int a, int b) {\n  return a * b;\n}\n";
        let (patched, outcome) = apply(file, BUGGY, FIXED);

        assert_eq!(outcome, PatchOutcome::skipped(SkipReason::SpanNotFound));
        assert_eq!(patched, file);
    }

    #[test]
    fn blank_replacement_is_malformed() {
        let (patched, outcome) = apply(BUGGY, BUGGY, "\n   \n");
        assert_eq!(outcome.reason, Some(SkipReason::MalformedReplacement));
        assert_eq!(patched, BUGGY);
    }

    #[test]
    fn replacement_blank_lines_are_trimmed() {
        let (patched, outcome) = apply(BUGGY, BUGGY, &format!("\n\n{FIXED}\n\n\n"));
        assert!(outcome.applied);
        assert_eq!(patched, format!("{FIXED}\n"));
    }

    #[test]
    fn identical_replacement_is_applied_without_change() {
        let (patched, outcome) = apply(BUGGY, BUGGY, BUGGY);
        assert!(outcome.applied);
        assert_eq!(patched, BUGGY);
    }

    #[test]
    fn outcome_display() {
        assert_eq!(
            PatchOutcome::applied(MatchStrategy::Exact).to_string(),
            "applied (exact match)"
        );
        assert!(PatchOutcome::skipped(SkipReason::SpanNotFound)
            .to_string()
            .contains("not found"));
    }
}
