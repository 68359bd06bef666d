//! Issue-by-issue orchestration: locate, ask for a fix, sanitize, apply,
//! persist.
//!
//! Issues run strictly in report order. Each issue sees the effects of every
//! earlier patch, including patches to the same file, because file text is
//! read through a per-run worktree that is updated after each successful
//! write. A failure in one issue never stops the run.

use crate::apply::{apply, MatchStrategy, SkipReason};
use crate::fix::{FixRequest, FixService};
use crate::issues::IssueRecord;
use crate::locate::FunctionLocator;
use crate::safety::WorkspaceGuard;
use crate::sanitize::sanitize_replacement;
use crate::sink::{PatchSink, SinkError};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const SUGGESTION_LIMIT: usize = 3;

/// What happened to one issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueResult {
    Patched {
        file: PathBuf,
        strategy: MatchStrategy,
    },
    /// The fix service returned the function unchanged.
    Unchanged { file: PathBuf },
    FunctionNotFound {
        file: PathBuf,
        error: String,
        suggestions: Vec<String>,
    },
    FailedToApply {
        file: PathBuf,
        reason: SkipReason,
        detail: Option<String>,
    },
    Invalid { reason: String },
    Errored {
        file: Option<PathBuf>,
        error: String,
    },
}

impl IssueResult {
    pub fn file(&self) -> Option<&Path> {
        match self {
            IssueResult::Patched { file, .. }
            | IssueResult::Unchanged { file }
            | IssueResult::FunctionNotFound { file, .. }
            | IssueResult::FailedToApply { file, .. } => Some(file),
            IssueResult::Errored { file, .. } => file.as_deref(),
            IssueResult::Invalid { .. } => None,
        }
    }
}

impl fmt::Display for IssueResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueResult::Patched { strategy, .. } => write!(f, "patched ({strategy} match)"),
            IssueResult::Unchanged { .. } => write!(f, "unchanged"),
            IssueResult::FunctionNotFound {
                error, suggestions, ..
            } => {
                write!(f, "{error}")?;
                if !suggestions.is_empty() {
                    write!(f, " (did you mean: {}?)", suggestions.join(", "))?;
                }
                Ok(())
            }
            IssueResult::FailedToApply { reason, detail, .. } => match detail {
                Some(detail) => write!(f, "{reason}: {detail}"),
                None => write!(f, "{reason}"),
            },
            IssueResult::Invalid { reason } => write!(f, "invalid issue: {reason}"),
            IssueResult::Errored { error, .. } => write!(f, "error: {error}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub unchanged: usize,
    pub skipped_not_found: usize,
    pub failed_to_apply: usize,
    pub invalid: usize,
    pub errored: usize,
}

impl RunSummary {
    pub fn record(&mut self, result: &IssueResult) {
        match result {
            IssueResult::Patched { .. } => self.succeeded += 1,
            IssueResult::Unchanged { .. } => self.unchanged += 1,
            IssueResult::FunctionNotFound { .. } => self.skipped_not_found += 1,
            IssueResult::FailedToApply { .. } => self.failed_to_apply += 1,
            IssueResult::Invalid { .. } => self.invalid += 1,
            IssueResult::Errored { .. } => self.errored += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded
            + self.unchanged
            + self.skipped_not_found
            + self.failed_to_apply
            + self.invalid
            + self.errored
    }

    /// Failures that should make the run exit non-zero. A function that is
    /// not in the file is a skip, not a failure.
    pub fn has_failures(&self) -> bool {
        self.failed_to_apply > 0 || self.errored > 0 || self.invalid > 0
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub results: Vec<(IssueRecord, IssueResult)>,
    pub summary: RunSummary,
    /// Set when the sink failed to finish (for example a rejected push).
    pub finish_error: Option<String>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.summary.has_failures() || self.finish_error.is_some()
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to prepare output: {0}")]
    Begin(#[source] SinkError),
}

pub struct Pipeline<F, S> {
    guard: WorkspaceGuard,
    locator: FunctionLocator,
    fixer: F,
    sink: S,
    commit_template: String,
    worktree: HashMap<PathBuf, String>,
}

impl<F: FixService, S: PatchSink> Pipeline<F, S> {
    pub fn new(guard: WorkspaceGuard, locator: FunctionLocator, fixer: F, sink: S) -> Self {
        Self {
            guard,
            locator,
            fixer,
            sink,
            commit_template: crate::config::schema::DEFAULT_COMMIT_MESSAGE.to_string(),
            worktree: HashMap::new(),
        }
    }

    /// Template with `{function}`, `{file}` and `{issue}` placeholders.
    pub fn with_commit_message(mut self, template: impl Into<String>) -> Self {
        self.commit_template = template.into();
        self
    }

    pub fn fixer(&self) -> &F {
        &self.fixer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Process every issue in order.
    pub fn run(&mut self, issues: &[IssueRecord]) -> Result<RunReport, PipelineError> {
        self.sink.begin().map_err(PipelineError::Begin)?;

        let mut summary = RunSummary::default();
        let mut results = Vec::with_capacity(issues.len());
        for (idx, issue) in issues.iter().enumerate() {
            info!(
                "[{}/{}] {} in {}",
                idx + 1,
                issues.len(),
                issue.function_name,
                issue.file_path
            );
            let result = self.process(issue);
            match &result {
                IssueResult::Patched { .. } | IssueResult::Unchanged { .. } => {
                    info!(function = %issue.function_name, "{result}")
                }
                _ => warn!(function = %issue.function_name, "{result}"),
            }
            summary.record(&result);
            results.push((issue.clone(), result));
        }

        let finish_error = match self.sink.finish() {
            Ok(()) => None,
            Err(e) => {
                warn!("failed to finish: {e}");
                Some(e.to_string())
            }
        };

        Ok(RunReport {
            results,
            summary,
            finish_error,
        })
    }

    /// Process a single issue against the current worktree.
    pub fn process(&mut self, issue: &IssueRecord) -> IssueResult {
        let issue = issue.trimmed();
        if let Err(e) = issue.validate() {
            return IssueResult::Invalid {
                reason: e.to_string(),
            };
        }

        let path = match self.guard.resolve(&issue.file_path) {
            Ok(path) => path,
            Err(e) => {
                return IssueResult::Errored {
                    file: None,
                    error: e.to_string(),
                }
            }
        };
        let display_path = self.guard.relative(&path).to_path_buf();

        let text = match self.read(&path) {
            Ok(text) => text,
            Err(e) => {
                return IssueResult::Errored {
                    file: Some(display_path),
                    error: format!("failed to read: {e}"),
                }
            }
        };

        let span = match self.locator.locate(&text, &issue.function_name) {
            Ok(span) => span,
            Err(e) => {
                return IssueResult::FunctionNotFound {
                    file: display_path,
                    error: e.to_string(),
                    suggestions: self.locator.suggest(
                        &text,
                        &issue.function_name,
                        SUGGESTION_LIMIT,
                    ),
                }
            }
        };
        let (first, last) = span.display_lines();
        debug!(function = %issue.function_name, first, last, "located function");

        let request = FixRequest {
            function_name: &issue.function_name,
            function_text: &span.text,
            issue: &issue.issue_description,
        };
        let raw = match self.fixer.suggest(&request) {
            Ok(raw) => raw,
            Err(e) => {
                return IssueResult::Errored {
                    file: Some(display_path),
                    error: e.to_string(),
                }
            }
        };

        let replacement = match sanitize_replacement(&raw, &issue.function_name, &self.locator) {
            Ok(replacement) => replacement,
            Err(e) => {
                return IssueResult::FailedToApply {
                    file: display_path,
                    reason: SkipReason::MalformedReplacement,
                    detail: Some(e.to_string()),
                }
            }
        };

        let (patched, outcome) = apply(&text, &span.text, &replacement);
        let strategy = match (outcome.applied, outcome.strategy, outcome.reason) {
            (true, Some(strategy), _) => strategy,
            (_, _, reason) => {
                return IssueResult::FailedToApply {
                    file: display_path,
                    reason: reason.unwrap_or(SkipReason::SpanNotFound),
                    detail: None,
                }
            }
        };

        if patched == text {
            return IssueResult::Unchanged { file: display_path };
        }

        if let Err(e) = self
            .guard
            .revalidate(&path)
            .map_err(|e| e.to_string())
            .and_then(|path| {
                self.sink
                    .write(&path, &text, &patched)
                    .map_err(|e| e.to_string())
            })
        {
            return IssueResult::Errored {
                file: Some(display_path),
                error: e,
            };
        }
        self.worktree.insert(path.clone(), patched);

        let message = self.commit_message(&issue, &display_path);
        if let Err(e) = self.sink.publish(&path, &message) {
            return IssueResult::Errored {
                file: Some(display_path),
                error: e.to_string(),
            };
        }

        IssueResult::Patched {
            file: display_path,
            strategy,
        }
    }

    fn read(&self, path: &Path) -> std::io::Result<String> {
        match self.worktree.get(path) {
            Some(text) => Ok(text.clone()),
            None => fs::read_to_string(path),
        }
    }

    fn commit_message(&self, issue: &IssueRecord, file: &Path) -> String {
        let summary = issue.issue_description.lines().next().unwrap_or_default();
        self.commit_template
            .replace("{function}", &issue.function_name)
            .replace("{file}", &file.display().to_string())
            .replace("{issue}", summary.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::FixError;
    use crate::sink::DryRunSink;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    const MATH: &str = "#include <cstdio>\n\nint add(int a, int b) {\n  return a - b;\n}\n\nint mul(int a, int b) {\n  return a + b;\n}\n";

    /// Replies in order; records the function text it was shown.
    struct Scripted {
        replies: RefCell<VecDeque<Result<String, FixError>>>,
        seen: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, FixError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn ok(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }
    }

    impl FixService for Scripted {
        fn suggest(&self, request: &FixRequest<'_>) -> Result<String, FixError> {
            self.seen.borrow_mut().push(request.function_text.to_string());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(FixError::EmptyResponse))
        }
    }

    fn workspace() -> tempfile::TempDir {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("math.cpp"), MATH).unwrap();
        temp_dir
    }

    fn pipeline(
        root: &Path,
        fixer: Scripted,
    ) -> Pipeline<Scripted, DryRunSink> {
        Pipeline::new(
            WorkspaceGuard::new(root).unwrap(),
            FunctionLocator::default(),
            fixer,
            DryRunSink::new(),
        )
    }

    #[test]
    fn patches_function_and_commits_message() {
        let temp_dir = workspace();
        let fixer = Scripted::ok(&["```cpp\nint add(int a, int b) {\n  return a + b;\n}\n```"]);
        let mut pipeline = pipeline(temp_dir.path(), fixer);

        let report = pipeline
            .run(&[IssueRecord::new("add", "Returns difference instead of sum", "math.cpp")])
            .unwrap();

        assert_eq!(report.summary.succeeded, 1);
        let sink = pipeline.into_sink();
        let (_, text) = sink.files().iter().next().unwrap();
        assert!(text.contains("return a + b;"));
        assert!(text.contains("int mul(int a, int b) {\n  return a + b;\n}"));
        assert_eq!(
            sink.messages()[0].1,
            "Fix add in math.cpp: Returns difference instead of sum"
        );
    }

    #[test]
    fn second_issue_sees_first_patch() {
        let temp_dir = workspace();
        let fixer = Scripted::ok(&[
            "int add(int a, int b) {\n  return a + b;\n}",
            "int mul(int a, int b) {\n  return a * b;\n}",
        ]);
        let mut pipeline = pipeline(temp_dir.path(), fixer);

        let report = pipeline
            .run(&[
                IssueRecord::new("add", "wrong operator", "math.cpp"),
                IssueRecord::new("mul", "wrong operator", "math.cpp"),
            ])
            .unwrap();

        assert_eq!(report.summary.succeeded, 2);
        let sink = pipeline.sink();
        let text = sink.files().values().next().unwrap();
        assert!(text.contains("return a + b;\n}\n\nint mul"));
        assert!(text.contains("return a * b;"));
        assert!(!text.contains("return a - b;"));
    }

    #[test]
    fn missing_function_is_skipped_with_suggestions() {
        let temp_dir = workspace();
        let fixer = Scripted::ok(&[]);
        let mut pipeline = pipeline(temp_dir.path(), fixer);

        let result = pipeline.process(&IssueRecord::new("ad", "bug", "math.cpp"));
        match result {
            IssueResult::FunctionNotFound { suggestions, .. } => {
                assert_eq!(suggestions, vec!["add".to_string()])
            }
            other => panic!("expected FunctionNotFound, got {other:?}"),
        }
        assert!(pipeline.fixer.seen.borrow().is_empty());
    }

    #[test]
    fn malformed_reply_leaves_file_alone() {
        let temp_dir = workspace();
        let fixer = Scripted::ok(&["int add(int a, int b) {\n  return a + b;\n"]);
        let mut pipeline = pipeline(temp_dir.path(), fixer);

        let result = pipeline.process(&IssueRecord::new("add", "bug", "math.cpp"));
        assert!(matches!(
            result,
            IssueResult::FailedToApply {
                reason: SkipReason::MalformedReplacement,
                ..
            }
        ));
        assert!(pipeline.sink().files().is_empty());
    }

    #[test]
    fn fix_service_error_does_not_stop_run() {
        let temp_dir = workspace();
        let fixer = Scripted::new(vec![
            Err(FixError::EmptyResponse),
            Ok("int mul(int a, int b) {\n  return a * b;\n}".to_string()),
        ]);
        let mut pipeline = pipeline(temp_dir.path(), fixer);

        let report = pipeline
            .run(&[
                IssueRecord::new("add", "bug", "math.cpp"),
                IssueRecord::new("mul", "bug", "math.cpp"),
            ])
            .unwrap();

        assert_eq!(report.summary.errored, 1);
        assert_eq!(report.summary.succeeded, 1);
        assert!(report.has_failures());
    }

    #[test]
    fn identical_reply_is_unchanged() {
        let temp_dir = workspace();
        let fixer = Scripted::ok(&["int add(int a, int b) {\n  return a - b;\n}"]);
        let mut pipeline = pipeline(temp_dir.path(), fixer);

        let result = pipeline.process(&IssueRecord::new("add", "bug", "math.cpp"));
        assert!(matches!(result, IssueResult::Unchanged { .. }));
        assert!(pipeline.sink().messages().is_empty());
    }

    #[test]
    fn invalid_and_missing_file_issues() {
        let temp_dir = workspace();
        let mut pipeline = pipeline(temp_dir.path(), Scripted::ok(&[]));

        let report = pipeline
            .run(&[
                IssueRecord::new("", "bug", "math.cpp"),
                IssueRecord::new("add", "bug", "missing.cpp"),
            ])
            .unwrap();

        assert_eq!(report.summary.invalid, 1);
        assert_eq!(report.summary.errored, 1);
        assert_eq!(report.summary.total(), 2);
    }

    #[test]
    fn commit_message_uses_first_issue_line() {
        let temp_dir = workspace();
        let pipeline = pipeline(temp_dir.path(), Scripted::ok(&[]))
            .with_commit_message("{function}@{file}: {issue}");
        let issue = IssueRecord::new("add", "Wrong operator\nDetails follow", "math.cpp");
        assert_eq!(
            pipeline.commit_message(&issue, Path::new("src/math.cpp")),
            "add@src/math.cpp: Wrong operator"
        );
    }
}
