//! Issue reports: the ordered list of `(function, issue, file)` records to
//! process.
//!
//! The format is chosen by file extension. JSON and TOML records use the
//! scanner export column names (`function`, `issue`, `filename`) as field
//! names, with the longer names accepted as aliases. CSV files and
//! spreadsheets are read positionally as `(issue, function, filename)`
//! after a header row, the way the scanner exports them.

use calamine::{open_workbook_auto, Reader};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One reported defect.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueRecord {
    #[serde(rename = "function", alias = "function_name", default)]
    pub function_name: String,
    #[serde(rename = "issue", alias = "issue_description", default)]
    pub issue_description: String,
    #[serde(rename = "filename", alias = "file_path", alias = "file", default)]
    pub file_path: String,
}

impl IssueRecord {
    pub fn new(
        function_name: impl Into<String>,
        issue_description: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            issue_description: issue_description.into(),
            file_path: file_path.into(),
        }
    }

    /// Copy with surrounding whitespace removed from every field.
    pub fn trimmed(&self) -> Self {
        Self::new(
            self.function_name.trim(),
            self.issue_description.trim(),
            self.file_path.trim(),
        )
    }

    /// All three fields must be non-empty.
    pub fn validate(&self) -> Result<(), IssueError> {
        let missing = [
            ("function", &self.function_name),
            ("issue", &self.issue_description),
            ("filename", &self.file_path),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty());

        match missing {
            Some((field, _)) => Err(IssueError::EmptyField {
                field,
                function: self.function_name.trim().to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for IssueRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.function_name, self.file_path)
    }
}

#[derive(Error, Debug)]
pub enum IssueError {
    #[error("failed to read issue report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse issue report {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(
        "unsupported issue report format '{extension}' (expected .json, .toml, .csv or .xlsx)"
    )]
    UnsupportedFormat { extension: String },

    #[error("issue record for '{function}' has an empty '{field}' field")]
    EmptyField {
        field: &'static str,
        function: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonReport {
    List(Vec<IssueRecord>),
    Wrapped { issues: Vec<IssueRecord> },
}

#[derive(Deserialize)]
struct TomlReport {
    #[serde(default)]
    issues: Vec<IssueRecord>,
}

/// Parse a JSON report: either a bare array or `{ "issues": [...] }`.
pub fn parse_json(input: &str) -> Result<Vec<IssueRecord>, String> {
    let report: JsonReport = serde_json::from_str(input).map_err(|e| e.to_string())?;
    let issues = match report {
        JsonReport::List(issues) | JsonReport::Wrapped { issues } => issues,
    };
    Ok(issues.iter().map(IssueRecord::trimmed).collect())
}

/// Parse a TOML report made of `[[issues]]` tables.
pub fn parse_toml(input: &str) -> Result<Vec<IssueRecord>, String> {
    let report: TomlReport = toml_edit::de::from_str(input).map_err(|e| e.to_string())?;
    Ok(report.issues.iter().map(IssueRecord::trimmed).collect())
}

/// Record from a positional row of `(issue, function, filename)` cells.
///
/// Cells past the third are ignored. Rows with every field blank (trailing
/// spreadsheet rows) yield nothing; partially blank rows are kept so the
/// pipeline can report them.
fn record_from_row<I>(cells: I) -> Option<IssueRecord>
where
    I: IntoIterator<Item = String>,
{
    let mut cells = cells.into_iter();
    let issue = cells.next().unwrap_or_default();
    let function = cells.next().unwrap_or_default();
    let filename = cells.next().unwrap_or_default();

    let record = IssueRecord::new(function, issue, filename).trimmed();
    let blank = record.function_name.is_empty()
        && record.issue_description.is_empty()
        && record.file_path.is_empty();
    (!blank).then_some(record)
}

/// Parse a CSV report. The first row is a header and is skipped.
pub fn parse_csv(input: &str) -> Result<Vec<IssueRecord>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_bytes());

    let mut issues = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| e.to_string())?;
        issues.extend(record_from_row(row.iter().map(str::to_string)));
    }
    Ok(issues)
}

/// Read the first sheet of a workbook, skipping its header row.
fn read_workbook(path: &Path) -> Result<Vec<IssueRecord>, IssueError> {
    let parse_error = |message: String| IssueError::Parse {
        path: path.to_path_buf(),
        message,
    };

    fs::metadata(path).map_err(|source| IssueError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut workbook = open_workbook_auto(path).map_err(|e| parse_error(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| parse_error("workbook has no sheets".to_string()))?
        .map_err(|e| parse_error(e.to_string()))?;

    Ok(range
        .rows()
        .skip(1)
        .filter_map(|row| record_from_row(row.iter().map(|cell| cell.to_string())))
        .collect())
}

fn read_text(
    path: &Path,
    parse: fn(&str) -> Result<Vec<IssueRecord>, String>,
) -> Result<Vec<IssueRecord>, IssueError> {
    let contents = fs::read_to_string(path).map_err(|source| IssueError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse(&contents).map_err(|message| IssueError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Load every record of a report, in file order.
///
/// Records are not validated here; the pipeline reports invalid ones
/// individually so that one bad row never hides the rest.
pub fn load_issues(path: impl AsRef<Path>) -> Result<Vec<IssueRecord>, IssueError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "json" => read_text(path, parse_json),
        "toml" => read_text(path, parse_toml),
        "csv" => read_text(path, parse_csv),
        "xlsx" | "xlsm" | "xls" | "ods" => read_workbook(path),
        _ => Err(IssueError::UnsupportedFormat { extension }),
    }
}
