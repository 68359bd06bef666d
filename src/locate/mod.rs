//! Lexical function locator for C++ sources.
//!
//! Finds the textual span of a named function definition without parsing:
//! a signature line is recognized from a small enumerated rule set, and the
//! body is delimited by brace-depth tracking from that line onward.
//!
//! # Known limitations
//!
//! - Braces inside string/character literals, and inside comments once the
//!   body has opened, are counted like any other brace. A body containing
//!   `"{"` may close early or never close. Comments between the signature
//!   and the opening brace are skipped.
//! - Overloads are not disambiguated. The first textual match wins.

pub mod errors;
pub mod locator;
pub mod signature;

pub use errors::LocateError;
pub use locator::{FunctionLocator, Span};
pub use signature::{is_signature_candidate, TypeKeywords, DEFAULT_TYPE_KEYWORDS};
