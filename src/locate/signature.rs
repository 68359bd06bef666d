//! Signature-line recognition.
//!
//! A line is a signature candidate for `name` when either
//!
//! - `name(` appears with no identifier character directly before `name`, or
//! - a recognized return-type keyword is followed by whitespace and then
//!   `name`, with identifier boundaries on both outer edges.
//!
//! The keyword set is data, not code: see [`TypeKeywords`].

use serde::Deserialize;

/// Return-type keywords recognized when no configuration overrides them.
pub const DEFAULT_TYPE_KEYWORDS: &[&str] = &["void", "int"];

/// The enumerated set of return-type keywords used for signature detection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TypeKeywords {
    keywords: Vec<String>,
}

impl Default for TypeKeywords {
    fn default() -> Self {
        Self::new(DEFAULT_TYPE_KEYWORDS.iter().copied())
    }
}

impl TypeKeywords {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self {
            keywords: Vec::new(),
        };
        set.extend(keywords);
        set
    }

    /// Add keywords, ignoring blanks and duplicates.
    pub fn extend<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for keyword in keywords {
            let keyword = keyword.into().trim().to_string();
            if !keyword.is_empty() && !self.keywords.contains(&keyword) {
                self.keywords.push(keyword);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keywords.iter().map(String::as_str)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn has_left_boundary(line: &str, idx: usize) -> bool {
    line[..idx]
        .chars()
        .next_back()
        .map_or(true, |c| !is_ident_char(c))
}

fn has_right_boundary(line: &str, idx: usize) -> bool {
    line[idx..].chars().next().map_or(true, |c| !is_ident_char(c))
}

/// Check whether `line` opens a candidate definition of `name`.
pub fn is_signature_candidate(line: &str, name: &str, keywords: &TypeKeywords) -> bool {
    if name.is_empty() {
        return false;
    }
    has_call_form(line, name) || keywords.iter().any(|kw| has_keyword_form(line, kw, name))
}

fn has_call_form(line: &str, name: &str) -> bool {
    line.match_indices(name).any(|(idx, _)| {
        has_left_boundary(line, idx) && line[idx + name.len()..].starts_with('(')
    })
}

fn has_keyword_form(line: &str, keyword: &str, name: &str) -> bool {
    for (idx, _) in line.match_indices(keyword) {
        let after_keyword = idx + keyword.len();
        if !has_left_boundary(line, idx) || !has_right_boundary(line, after_keyword) {
            continue;
        }
        let rest = &line[after_keyword..];
        let trimmed = rest.trim_start_matches([' ', '\t']);
        if trimmed.len() == rest.len() {
            continue;
        }
        if let Some(after_name) = trimmed.strip_prefix(name) {
            if after_name.chars().next().map_or(true, |c| !is_ident_char(c)) {
                return true;
            }
        }
    }
    false
}

/// The part of `line` before a `//` comment.
pub fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Best-effort name of the function a line appears to define.
///
/// Used only to build "did you mean" hints, so it is deliberately loose:
/// it takes the identifier directly before the first `(` on lines that do
/// not end in `;`.
pub fn defined_name(line: &str) -> Option<&str> {
    let trimmed = line.trim_end();
    if trimmed.ends_with(';') || trimmed.starts_with(|c: char| c.is_whitespace()) {
        return None;
    }
    let paren = trimmed.find('(')?;
    let head = trimmed[..paren].trim_end();
    let start = head
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_ident_char(*c))
        .last()
        .map(|(i, _)| i)?;
    let ident = &head[start..];
    if ident.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(ident)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> TypeKeywords {
        TypeKeywords::default()
    }

    #[test]
    fn call_form_matches() {
        assert!(is_signature_candidate(
            "int add(int a, int b) {",
            "add",
            &defaults()
        ));
        assert!(is_signature_candidate(
            "double Matrix::det(const Matrix& m)",
            "det",
            &defaults()
        ));
    }

    #[test]
    fn substring_of_longer_identifier_is_rejected() {
        assert!(!is_signature_candidate(
            "void doThingExtra() {",
            "doThing",
            &defaults()
        ));
        assert!(!is_signature_candidate(
            "void redoThing() {",
            "doThing",
            &defaults()
        ));
    }

    #[test]
    fn keyword_form_matches_without_paren() {
        assert!(is_signature_candidate("int compute", "compute", &defaults()));
        assert!(is_signature_candidate("void\tcompute (", "compute", &defaults()));
    }

    #[test]
    fn keyword_form_requires_whitespace_and_boundaries() {
        assert!(!is_signature_candidate("intcompute", "compute", &defaults()));
        assert!(!is_signature_candidate("uint compute_all", "compute", &defaults()));
        assert!(!is_signature_candidate("int computeAll", "compute", &defaults()));
    }

    #[test]
    fn unknown_keyword_needs_call_form() {
        assert!(!is_signature_candidate("bool check", "check", &defaults()));

        let mut keywords = defaults();
        keywords.extend(["bool"]);
        assert!(is_signature_candidate("bool check", "check", &keywords));
    }

    #[test]
    fn keyword_set_ignores_blanks_and_duplicates() {
        let keywords = TypeKeywords::new(["void", " int ", "", "void"]);
        assert_eq!(keywords.iter().collect::<Vec<_>>(), vec!["void", "int"]);
        assert_eq!(keywords.len(), 2);
        assert!(keywords.contains("int"));
    }

    #[test]
    fn empty_name_never_matches() {
        assert!(!is_signature_candidate("int add(int a)", "", &defaults()));
    }

    #[test]
    fn defined_name_extraction() {
        assert_eq!(defined_name("int add(int a, int b) {"), Some("add"));
        assert_eq!(defined_name("void Foo::bar() const"), Some("bar"));
        assert_eq!(defined_name("int add(int a, int b);"), None);
        assert_eq!(defined_name("    return add(a, b)"), None);
        assert_eq!(defined_name("no parens here"), None);
    }
}
