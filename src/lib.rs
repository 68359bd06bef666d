//! Func Patcher: automated repair of reported defects in C++ functions
//!
//! Takes an issue report (function name, issue description, file), finds
//! each function's textual span in its source file, asks a fix service for
//! a corrected version, and substitutes the result back into the file.
//!
//! # Architecture
//!
//! - [`locate`] finds a function definition by signature matching and brace
//!   depth tracking. No parsing is involved.
//! - [`apply`] substitutes replacement text for the located original, first
//!   by exact match, then with per-line whitespace tolerance.
//! - Writes go through an [`Edit`] that checks the file still holds the text
//!   the patch was computed from.
//! - [`pipeline`] runs issues strictly in order, threading patched file text
//!   from one issue to the next.
//!
//! # Safety
//!
//! - Edits verify the expected before-text before applying
//! - A failed match leaves the file text untouched
//! - Atomic file writes (tempfile + fsync + rename)
//! - Issue paths must resolve inside the repository root
//!
//! # Example
//!
//! ```
//! use func_patcher::{apply, FunctionLocator};
//!
//! let file = "int add(int a, int b) {\n  return a - b;\n}\n";
//! let span = FunctionLocator::default().locate(file, "add").unwrap();
//!
//! let fixed = "int add(int a, int b) {\n  return a + b;\n}";
//! let (patched, outcome) = apply(file, &span.text, fixed);
//! assert!(outcome.applied);
//! assert_eq!(patched, format!("{fixed}\n"));
//! ```

pub mod apply;
pub mod config;
pub mod edit;
pub mod fix;
pub mod issues;
pub mod locate;
pub mod pipeline;
pub mod safety;
pub mod sanitize;
pub mod sink;
pub mod source;

// Re-exports
pub use apply::{apply, MatchStrategy, PatchOutcome, SkipReason};
pub use config::{load_from_path, load_from_str, ConfigError, RunConfig};
pub use edit::{rewrite_file, Edit, EditError, EditResult, EditVerification};
pub use fix::{
    build_prompt, ChatCompletionService, CommandFixService, FixError, FixRequest, FixService,
};
pub use issues::{load_issues, IssueError, IssueRecord};
pub use locate::{FunctionLocator, LocateError, Span, TypeKeywords};
pub use pipeline::{IssueResult, Pipeline, PipelineError, RunReport, RunSummary};
pub use safety::{SafetyError, WorkspaceGuard};
pub use sanitize::{sanitize_replacement, MalformedReplacement};
pub use sink::{DryRunSink, FsSink, GitSink, PatchSink, SinkError};
pub use source::{FunctionQuery, SourceFile};
