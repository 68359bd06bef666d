use std::fs;
use std::path::{Path, PathBuf};

/// The text of one source file, addressed as an ordered sequence of lines.
///
/// Lines keep their terminators, so concatenating [`SourceFile::lines`]
/// reproduces [`SourceFile::text`] byte-for-byte. That property is what lets
/// the locator hand out byte offsets alongside line numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    path: PathBuf,
    text: String,
}

impl SourceFile {
    /// Read a file from disk. Invalid UTF-8 is an error, not a lossy decode.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            text,
        })
    }

    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Lines with their `\n` (or `\r\n`) terminators preserved.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        lines_with_endings(&self.text)
    }

    pub fn line_count(&self) -> usize {
        self.lines().count()
    }
}

/// Split `text` into lines, keeping each line's terminator.
pub fn lines_with_endings(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive('\n')
}

/// Strip a trailing `\n` or `\r\n` from a single line.
pub fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Lookup key taken from an issue report: a function name and the file
/// that is supposed to contain it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionQuery {
    pub name: String,
    pub containing_file: PathBuf,
}

impl FunctionQuery {
    pub fn new(name: impl Into<String>, containing_file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            containing_file: containing_file.into(),
        }
    }
}
