use std::sync::LazyLock;

use regex::Regex;

static NEWLINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n+").unwrap());

/// Split extracted page text into trimmed tokens on runs of newlines.
/// Blank pieces are kept: row offsets are positional.
pub fn tokenize(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    NEWLINES_RE
        .split(text)
        .map(|piece| piece.trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_newline_runs() {
        assert_eq!(tokenize("a\nb\n\n\nc"), vec!["a", "b", "c"]);
    }

    #[test]
    fn trims_pieces() {
        assert_eq!(tokenize("  CSCE-181-500 \n\t10\r\n Smith, J. "), vec!["CSCE-181-500", "10", "Smith, J."]);
    }

    #[test]
    fn keeps_blank_tokens() {
        assert_eq!(tokenize("a\n   \nb"), vec!["a", "", "b"]);
        assert_eq!(tokenize("\na\n"), vec!["", "a", ""]);
    }

    #[test]
    fn inner_spaces_survive() {
        assert_eq!(tokenize("COURSE TOTAL:\n12"), vec!["COURSE TOTAL:", "12"]);
    }

    #[test]
    fn empty_text() {
        assert!(tokenize("").is_empty());
        assert_eq!(tokenize("   "), vec![""]);
    }
}
