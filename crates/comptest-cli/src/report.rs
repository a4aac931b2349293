use std::collections::BTreeSet;

use comptest_core::CompletionResult;
use serde::Serialize;

/// Process exit codes.
pub const EXIT_OK: i32 = 0;
pub const EXIT_MISMATCH: i32 = 1;
pub const EXIT_STARTUP: i32 = 2;
pub const EXIT_DESYNC: i32 = 3;

/// What one completion query produced, as printed with `--json`.
#[derive(Debug, Serialize)]
pub struct Report {
    pub command: String,
    pub kind: &'static str,
    pub candidates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
}

impl Report {
    pub fn new(command: &str, result: &CompletionResult) -> Self {
        Self {
            command: command.to_string(),
            kind: result.kind(),
            candidates: result.candidates().into_iter().collect(),
            matched: None,
        }
    }

    /// Report for a strict single-candidate check, where only the verdict is known.
    pub fn single_check(command: &str, expected: &str, matched: bool) -> Self {
        Self {
            command: command.to_string(),
            kind: "single",
            candidates: if matched {
                vec![expected.to_string()]
            } else {
                Vec::new()
            },
            matched: Some(matched),
        }
    }

    pub fn with_verdict(mut self, matched: bool) -> Self {
        self.matched = Some(matched);
        self
    }

    /// Candidates one per line, sorted.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for candidate in &self.candidates {
            text.push_str(candidate);
            text.push('\n');
        }
        text
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Human readable difference between expected and actual candidate sets.
pub fn describe_mismatch(expected: &BTreeSet<String>, actual: &BTreeSet<String>) -> String {
    let missing: Vec<_> = expected.difference(actual).map(String::as_str).collect();
    let extra: Vec<_> = actual.difference(expected).map(String::as_str).collect();
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing: {}", missing.join(" ")));
    }
    if !extra.is_empty() {
        parts.push(format!("unexpected: {}", extra.join(" ")));
    }
    parts.join("; ")
}
