//! Cleanup of fix-service responses.
//!
//! Text-completion services wrap code in markdown fences and often add a
//! sentence or two of explanation. Before a response is used as replacement
//! text it is reduced to the function itself, or rejected.

use crate::locate::locator::brace_counts;
use crate::locate::FunctionLocator;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedReplacement {
    #[error("fix response is empty")]
    Empty,

    #[error("fix response contains no function body")]
    NoBody,

    #[error("fix response has unbalanced braces ({open} '{{' vs {close} '}}')")]
    Unbalanced { open: usize, close: usize },
}

/// Body of the first fenced code block, or the whole text when there is
/// no fence. An unterminated fence runs to the end of the text. A fence
/// closed on its opening line has no info string.
pub fn strip_code_fence(raw: &str) -> &str {
    let Some(fence) = raw.find("```") else {
        return raw;
    };
    let after = &raw[fence + 3..];
    let newline = after.find('\n');
    // Fence opened and closed on one line: everything between is code
    if let Some(close) = after.find("```") {
        if newline.map_or(true, |nl| close < nl) {
            return &after[..close];
        }
    }
    // Skip the info string (```cpp, ```c++ ...)
    let body_start = newline.map_or(after.len(), |i| i + 1);
    let body = &after[body_start..];
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

/// Reduce a raw fix response to replacement text for `function_name`.
pub fn sanitize_replacement(
    raw: &str,
    function_name: &str,
    locator: &FunctionLocator,
) -> Result<String, MalformedReplacement> {
    let code = strip_code_fence(raw.trim_start_matches('\u{feff}'));
    if code.trim().is_empty() {
        return Err(MalformedReplacement::Empty);
    }

    let code = match locator.locate(code, function_name) {
        Ok(span) => span.text,
        Err(_) => code.to_string(),
    };

    let (open, close) = brace_counts(&code);
    if open == 0 {
        return Err(MalformedReplacement::NoBody);
    }
    if open != close {
        return Err(MalformedReplacement::Unbalanced { open, close });
    }

    Ok(code.trim_matches(|c| c == '\n' || c == '\r').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXED: &str = "int add(int a, int b) {\n  return a + b;\n}";

    fn sanitize(raw: &str) -> Result<String, MalformedReplacement> {
        sanitize_replacement(raw, "add", &FunctionLocator::default())
    }

    #[test]
    fn raw_code_passes_through() {
        assert_eq!(sanitize(FIXED).unwrap(), FIXED);
    }

    #[test]
    fn fenced_code_is_extracted() {
        let raw = format!("```cpp\n{FIXED}\n```");
        assert_eq!(sanitize(&raw).unwrap(), FIXED);
    }

    #[test]
    fn prose_around_fence_is_dropped() {
        let raw = format!(
            "Here is the corrected function:\n\n```c++\n{FIXED}\n```\n\nThe subtraction was replaced."
        );
        assert_eq!(sanitize(&raw).unwrap(), FIXED);
    }

    #[test]
    fn prose_without_fence_is_dropped_by_locator() {
        let raw = format!("Fixed version:\n{FIXED}\nThis now adds the operands.");
        assert_eq!(sanitize(&raw).unwrap(), FIXED);
    }

    #[test]
    fn unterminated_fence_runs_to_end() {
        let raw = format!("```cpp\n{FIXED}\n");
        assert_eq!(sanitize(&raw).unwrap(), FIXED);
    }

    #[test]
    fn empty_response_is_malformed() {
        assert_eq!(sanitize("   \n"), Err(MalformedReplacement::Empty));
        assert_eq!(sanitize("```cpp\n```"), Err(MalformedReplacement::Empty));
    }

    #[test]
    fn response_without_braces_is_malformed() {
        assert_eq!(
            sanitize("I cannot fix this function."),
            Err(MalformedReplacement::NoBody)
        );
    }

    #[test]
    fn unbalanced_response_is_malformed() {
        let raw = "```cpp\nint add(int a, int b) {\n  return a + b;\n```";
        assert_eq!(
            sanitize(raw),
            Err(MalformedReplacement::Unbalanced { open: 1, close: 0 })
        );
    }

    #[test]
    fn renamed_function_keeps_balanced_block() {
        let raw = "int add_checked(int a, int b) {\n  return a + b;\n}";
        assert_eq!(sanitize(raw).unwrap(), raw);
    }

    #[test]
    fn single_line_fence_keeps_code() {
        assert_eq!(
            strip_code_fence("```int f() { return 1; }```"),
            "int f() { return 1; }"
        );
        let reply = "Fixed: ```int add(int a, int b) { return a + b; }``` done";
        assert_eq!(
            sanitize(reply).unwrap(),
            "int add(int a, int b) { return a + b; }"
        );
    }
}
