use crate::locate::errors::LocateError;
use crate::locate::signature::{
    defined_name, is_signature_candidate, strip_line_comment, TypeKeywords,
};
use crate::source::{lines_with_endings, strip_line_ending, FunctionQuery, SourceFile};
use std::path::Path;
use tracing::debug;

/// A located function definition.
///
/// `start_line..end_line` is a half-open, 0-based line range; the byte range
/// covers the same lines including the terminator of the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    pub byte_start: usize,
    pub byte_end: usize,
    /// The materialized text of the span
    pub text: String,
}

impl Span {
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line
    }

    /// Counts of `{` and `}` inside the span text.
    pub fn brace_counts(&self) -> (usize, usize) {
        brace_counts(&self.text)
    }

    /// 1-based inclusive line range, for display.
    pub fn display_lines(&self) -> (usize, usize) {
        (self.start_line + 1, self.end_line)
    }
}

pub(crate) fn brace_counts(text: &str) -> (usize, usize) {
    text.chars().fold((0, 0), |(open, close), c| match c {
        '{' => (open + 1, close),
        '}' => (open, close + 1),
        _ => (open, close),
    })
}

enum BodyScan {
    /// Body closed; value is the exclusive end line
    Closed(usize),
    /// Not a definition (declaration, statement, or stray closing brace)
    Abandoned,
    /// End of input reached before the body closed
    Eof { opened: bool, depth: i64 },
}

/// Brace-depth function locator.
#[derive(Debug, Clone, Default)]
pub struct FunctionLocator {
    keywords: TypeKeywords,
}

impl FunctionLocator {
    pub fn new(keywords: TypeKeywords) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &TypeKeywords {
        &self.keywords
    }

    /// Locate the first brace-balanced definition of `name` in `text`.
    pub fn locate(&self, text: &str, name: &str) -> Result<Span, LocateError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LocateError::EmptyName);
        }

        let lines: Vec<&str> = lines_with_endings(text).collect();
        let mut offsets = Vec::with_capacity(lines.len() + 1);
        let mut offset = 0;
        offsets.push(0);
        for line in &lines {
            offset += line.len();
            offsets.push(offset);
        }

        let mut idx = 0;
        while idx < lines.len() {
            let code = strip_line_comment(strip_line_ending(lines[idx]));
            if !is_signature_candidate(code, name, &self.keywords) {
                idx += 1;
                continue;
            }

            match scan_body(&lines[idx..]) {
                BodyScan::Closed(len) => {
                    let end_line = idx + len;
                    let byte_start = offsets[idx];
                    let byte_end = offsets[end_line];
                    debug!(
                        function = name,
                        start_line = idx + 1,
                        end_line,
                        "located function body"
                    );
                    return Ok(Span {
                        start_line: idx,
                        end_line,
                        byte_start,
                        byte_end,
                        text: text[byte_start..byte_end].to_string(),
                    });
                }
                BodyScan::Abandoned => {
                    debug!(function = name, line = idx + 1, "skipping non-definition candidate");
                    idx += 1;
                }
                BodyScan::Eof { opened: false, .. } => break,
                BodyScan::Eof { opened: true, depth } => {
                    return Err(LocateError::Unbalanced {
                        name: name.to_string(),
                        line: idx + 1,
                        depth,
                    });
                }
            }
        }

        Err(LocateError::NotFound {
            name: name.to_string(),
        })
    }

    pub fn locate_in(&self, file: &SourceFile, name: &str) -> Result<Span, LocateError> {
        self.locate(file.text(), name)
    }

    /// Read a file and locate `name` in it.
    pub fn locate_in_file(&self, path: &Path, name: &str) -> Result<Span, LocateError> {
        let file = SourceFile::read(path).map_err(|source| LocateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.locate_in(&file, name)
    }

    /// Locate the function named by an issue in the file it names.
    pub fn locate_query(&self, query: &FunctionQuery) -> Result<Span, LocateError> {
        self.locate_in_file(&query.containing_file, &query.name)
    }

    /// Names of functions that appear to be defined in `text`, in order of
    /// first appearance.
    pub fn candidates(&self, text: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for line in lines_with_endings(text) {
            if let Some(name) = defined_name(strip_line_ending(line)) {
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Defined names similar to `name`, best match first.
    pub fn suggest(&self, text: &str, name: &str, limit: usize) -> Vec<String> {
        let mut scored: Vec<(f64, String)> = self
            .candidates(text)
            .into_iter()
            .filter(|candidate| candidate != name)
            .map(|candidate| (strsim::jaro_winkler(name, &candidate), candidate))
            .filter(|(score, _)| *score >= 0.8)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, c)| c).collect()
    }
}

/// Track brace depth from a candidate line until the body closes.
///
/// Depth starts at zero before the candidate line's own braces. The body
/// must open (depth > 0) before a return to zero ends it. Until it opens,
/// comment text is skipped and any `;` abandons the candidate.
fn scan_body(lines: &[&str]) -> BodyScan {
    let mut depth: i64 = 0;
    let mut opened = false;
    let mut in_block_comment = false;

    for (i, line) in lines.iter().enumerate() {
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if !opened {
                if in_block_comment {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        in_block_comment = false;
                    }
                    continue;
                }
                match (c, chars.peek()) {
                    ('/', Some('/')) => break,
                    ('/', Some('*')) => {
                        chars.next();
                        in_block_comment = true;
                        continue;
                    }
                    (';', _) => return BodyScan::Abandoned,
                    _ => {}
                }
            }

            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => {
                    depth -= 1;
                    if depth < 0 {
                        return BodyScan::Abandoned;
                    }
                }
                _ => {}
            }
        }

        if opened && depth == 0 {
            return BodyScan::Closed(i + 1);
        }
    }

    BodyScan::Eof { opened, depth }
}
