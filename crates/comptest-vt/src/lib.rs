//! comptest-vt: turns raw terminal output into matchable text.
//!
//! Shell output arrives as bytes interleaved with control sequences from the
//! line editor. This crate runs the bytes through a `vte` parser and keeps only
//! what a reader of the session would see as text, so patterns can be matched
//! against it as plain strings.

pub mod sanitize;

pub use sanitize::{sanitize, Sanitizer};
