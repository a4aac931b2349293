use std::collections::BTreeSet;

/// What the shell offered for one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    /// Exactly one candidate.
    Single(String),
    /// Two or more candidates. Kept sorted so output is stable; the order
    /// carries no meaning.
    Multiple(BTreeSet<String>),
    /// Nothing was offered.
    None,
}

impl CompletionResult {
    /// Collapse a candidate set to the variant matching its size.
    pub fn from_candidates(mut candidates: BTreeSet<String>) -> Self {
        match candidates.len() {
            0 => CompletionResult::None,
            1 => match candidates.pop_first() {
                Some(only) => CompletionResult::Single(only),
                None => CompletionResult::None,
            },
            _ => CompletionResult::Multiple(candidates),
        }
    }

    /// Interpret the text printed between the echoed `input` and the prompt
    /// coming back.
    ///
    /// When readline lists candidates it first inserts their common prefix
    /// inline, then starts a new line for the listing. That inline part is
    /// not a candidate and is skipped.
    pub fn from_listing(input: &str, captured: &str) -> Self {
        match captured.split_once('\n') {
            Some((_inserted, listing)) => Self::from_candidates(
                listing
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from)
                    .collect(),
            ),
            None => Self::from_inline(input, captured),
        }
    }

    /// Interpret the text printed after the echoed `input` when the prompt
    /// did not come back, i.e. readline inserted a completion into the line.
    pub fn from_inline(input: &str, captured: &str) -> Self {
        if captured.contains('\n') {
            return Self::from_listing(input, captured);
        }
        let inserted = captured.trim();
        if inserted.is_empty() {
            return CompletionResult::None;
        }
        let word = format!("{}{inserted}", current_word(input));
        CompletionResult::Single(printable_part(&word).to_string())
    }

    /// The candidates as a set; empty for [`CompletionResult::None`].
    pub fn candidates(&self) -> BTreeSet<String> {
        match self {
            CompletionResult::Single(text) => BTreeSet::from([text.clone()]),
            CompletionResult::Multiple(set) => set.clone(),
            CompletionResult::None => BTreeSet::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, CompletionResult::None)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CompletionResult::Single(_) => "single",
            CompletionResult::Multiple(_) => "multiple",
            CompletionResult::None => "none",
        }
    }
}

/// The word the cursor sits at the end of.
fn current_word(input: &str) -> &str {
    if input.ends_with(char::is_whitespace) {
        return "";
    }
    input.rsplit(char::is_whitespace).next().unwrap_or(input)
}

/// The part of a completed word readline shows in a listing: the last path
/// component, keeping a trailing slash on directories.
fn printable_part(word: &str) -> &str {
    let stem = word.strip_suffix('/').unwrap_or(word);
    match stem.rfind('/') {
        Some(slash) => &word[slash + 1..],
        None => word,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_listing_skips_inline_prefix() {
        let result = CompletionResult::from_listing("ls /etc/pas", "swd\r\npasswd\r\npasswd-\r\n");
        assert_eq!(result, CompletionResult::Multiple(set(&["passwd", "passwd-"])));
    }

    #[test]
    fn test_listing_without_inserted_prefix() {
        let result = CompletionResult::from_listing("git ", "\r\nadd\r\nbisect\r\ncommit\r\n");
        assert_eq!(result.candidates(), set(&["add", "bisect", "commit"]));
    }

    #[test]
    fn test_listing_with_single_line() {
        let result = CompletionResult::from_listing("x", "\r\nonly\r\n");
        assert_eq!(result, CompletionResult::Single("only".to_string()));
    }

    #[test]
    fn test_listing_deduplicates() {
        let result = CompletionResult::from_listing("x", "\r\na\r\nb\r\na\r\n");
        assert_eq!(result, CompletionResult::Multiple(set(&["a", "b"])));
    }

    #[test]
    fn test_empty_capture_is_none() {
        assert!(CompletionResult::from_listing("ls /etc/zzz", "").is_none());
        assert!(CompletionResult::from_inline("ls /etc/zzz", "").is_none());
        assert!(CompletionResult::from_inline("ls /etc/zzz", "  ").is_none());
    }

    #[test]
    fn test_inline_file_completion_reports_basename() {
        let result = CompletionResult::from_inline("ls /etc/pas", "swd ");
        assert_eq!(result, CompletionResult::Single("passwd".to_string()));
    }

    #[test]
    fn test_inline_subcommand() {
        let result = CompletionResult::from_inline("git chec", "kout ");
        assert_eq!(result, CompletionResult::Single("checkout".to_string()));
    }

    #[test]
    fn test_inline_directory_keeps_slash() {
        let result = CompletionResult::from_inline("cd /et", "c/");
        assert_eq!(result, CompletionResult::Single("etc/".to_string()));
    }

    #[test]
    fn test_inline_after_space_completes_new_word() {
        let result = CompletionResult::from_inline("mygit ", "checkout ");
        assert_eq!(result, CompletionResult::Single("checkout".to_string()));
    }

    #[test]
    fn test_inline_with_line_break_is_a_listing() {
        let result = CompletionResult::from_inline("ls a", "\r\nab\r\nac\r\n");
        assert_eq!(result, CompletionResult::Multiple(set(&["ab", "ac"])));
    }

    #[test]
    fn test_candidates_and_kind() {
        assert_eq!(CompletionResult::None.candidates(), BTreeSet::new());
        assert_eq!(CompletionResult::Single("a".into()).candidates(), set(&["a"]));
        assert_eq!(CompletionResult::None.kind(), "none");
        assert_eq!(CompletionResult::Multiple(set(&["a", "b"])).kind(), "multiple");
    }

    #[test]
    fn test_from_candidates_sizes() {
        assert!(CompletionResult::from_candidates(BTreeSet::new()).is_none());
        assert_eq!(
            CompletionResult::from_candidates(set(&["x"])),
            CompletionResult::Single("x".to_string())
        );
    }

    #[test]
    fn test_printable_part() {
        assert_eq!(printable_part("/etc/passwd"), "passwd");
        assert_eq!(printable_part("/etc/"), "etc/");
        assert_eq!(printable_part("/"), "/");
        assert_eq!(printable_part("checkout"), "checkout");
    }
}
