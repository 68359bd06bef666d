use crate::source::{lines_with_endings, strip_line_ending};

/// Which matching layer located the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStrategy {
    /// Byte-exact substring
    Exact,
    /// Same lines once per-line leading/trailing whitespace is ignored
    WhitespaceNormalized,
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStrategy::Exact => write!(f, "exact"),
            MatchStrategy::WhitespaceNormalized => write!(f, "whitespace-normalized"),
        }
    }
}

/// A byte range of the file that corresponds to the original text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub byte_start: usize,
    pub byte_end: usize,
    pub strategy: MatchStrategy,
}

/// Drop whitespace-only lines at both ends of `text`.
///
/// The terminator of the last content line goes with them; every byte in
/// between is kept as-is.
pub fn trim_blank_lines(text: &str) -> &str {
    let mut start = 0;
    for line in lines_with_endings(text) {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }

    let rest = &text[start..];
    let mut end = 0;
    let mut offset = 0;
    for line in lines_with_endings(rest) {
        if !line.trim().is_empty() {
            end = offset + strip_line_ending(line).len();
        }
        offset += line.len();
    }

    &rest[..end]
}

/// Find the first region of `file_text` matching `original`.
///
/// Returns `None` when neither matching layer succeeds or when `original`
/// is blank.
pub fn find_region(file_text: &str, original: &str) -> Option<Region> {
    let original = trim_blank_lines(original);
    if original.is_empty() {
        return None;
    }

    if let Some(byte_start) = file_text.find(original) {
        return Some(Region {
            byte_start,
            byte_end: byte_start + original.len(),
            strategy: MatchStrategy::Exact,
        });
    }

    find_normalized(file_text, original)
}

fn normalize(line: &str) -> &str {
    strip_line_ending(line).trim()
}

fn find_normalized(file_text: &str, original: &str) -> Option<Region> {
    let needle: Vec<&str> = lines_with_endings(original).map(normalize).collect();

    let mut lines = Vec::new();
    let mut offset = 0;
    for line in lines_with_endings(file_text) {
        lines.push((offset, line));
        offset += line.len();
    }

    if needle.is_empty() || needle.len() > lines.len() {
        return None;
    }

    (0..=lines.len() - needle.len()).find_map(|start| {
        let window = &lines[start..start + needle.len()];
        let matches = window
            .iter()
            .zip(&needle)
            .all(|((_, line), expected)| normalize(line) == *expected);
        if !matches {
            return None;
        }

        let (last_offset, last_line) = window[window.len() - 1];
        Some(Region {
            byte_start: window[0].0,
            byte_end: last_offset + strip_line_ending(last_line).len(),
            strategy: MatchStrategy::WhitespaceNormalized,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_blank_lines_both_ends() {
        assert_eq!(trim_blank_lines("\n  \nint a;\n\nint b;\n \n\n"), "int a;\n\nint b;");
        assert_eq!(trim_blank_lines("int a;"), "int a;");
        assert_eq!(trim_blank_lines("  int a;  \n"), "  int a;  ");
        assert_eq!(trim_blank_lines(" \n\t\n"), "");
        assert_eq!(trim_blank_lines(""), "");
    }

    #[test]
    fn exact_match_wins_first() {
        let file = "void a() {\n}\nvoid b() {\n}\n";
        let region = find_region(file, "void b() {\n}\n").unwrap();
        assert_eq!(region.strategy, MatchStrategy::Exact);
        assert_eq!(&file[region.byte_start..region.byte_end], "void b() {\n}");
    }

    #[test]
    fn normalized_match_covers_original_indentation() {
        let file = "namespace n {\n    int f() {\n        return 1;\n    }\n}\n";
        let original = "int f() {\n  return 1;\n}";
        let region = find_region(file, original).unwrap();

        assert_eq!(region.strategy, MatchStrategy::WhitespaceNormalized);
        assert_eq!(
            &file[region.byte_start..region.byte_end],
            "    int f() {\n        return 1;\n    }"
        );
    }

    #[test]
    fn normalized_match_does_not_tolerate_content_drift() {
        let file = "int f() {\n    return 1;\n}\n";
        assert!(find_region(file, "int f() {\n  return 2;\n}").is_none());
    }

    #[test]
    fn normalized_match_keeps_line_structure() {
        // Same tokens joined onto one line is not a whitespace-only change.
        let file = "int f() {\n    return 1;\n}\n";
        assert!(find_region(file, "int f() { return 1; }").is_none());
    }

    #[test]
    fn blank_original_never_matches() {
        assert!(find_region("int a;\n", "\n  \n").is_none());
    }

    #[test]
    fn original_longer_than_file() {
        assert!(find_region("int a;\n", "int a;\nint b;\nint c;").is_none());
    }
}
