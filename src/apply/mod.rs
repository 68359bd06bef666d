//! Patch applicator: substitute one located function for its replacement.
//!
//! Matching is layered and stops at the first success:
//!
//! 1. exact substring match of the (blank-line trimmed) original,
//! 2. line-window match with per-line leading/trailing whitespace ignored,
//! 3. otherwise report [`SkipReason::SpanNotFound`] and leave the text alone.
//!
//! Only the first occurrence is ever replaced. Everything here works on
//! in-memory strings; persistence belongs to [`crate::sink`].

pub mod errors;
pub mod matcher;
pub mod replacer;

pub use errors::SkipReason;
pub use matcher::{find_region, trim_blank_lines, MatchStrategy, Region};
pub use replacer::{apply, PatchOutcome};
