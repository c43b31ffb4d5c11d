//! Patterns the expect engine can wait for.

use std::fmt;
use std::ops::Range;

use memchr::memmem;
use regex::bytes::Regex;

/// Something to match against received bytes.
#[derive(Clone)]
pub enum Pattern {
    /// Regular expression over raw bytes.
    Regex(Regex),

    /// Exact byte sequence.
    Literal(memmem::Finder<'static>),

    /// Matches as soon as any unconsumed output exists, consuming all of it.
    Any,
}

impl Pattern {
    /// Compile a regular expression pattern.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Regex(Regex::new(pattern)?))
    }

    /// Compile a prompt pattern, anchoring it to the end of the output.
    ///
    /// A prompt is only a prompt when nothing follows it, so patterns that
    /// do not already end in `$` get `\s*$` appended.
    pub fn prompt(pattern: &str) -> Result<Self, regex::Error> {
        if pattern.ends_with('$') {
            Self::regex(pattern)
        } else {
            Self::regex(&format!("{}\\s*$", pattern))
        }
    }

    /// Exact text pattern.
    pub fn literal(text: impl AsRef<[u8]>) -> Self {
        Pattern::Literal(memmem::Finder::new(text.as_ref()).into_owned())
    }

    /// Span of the first match in `haystack`, if any.
    pub fn find(&self, haystack: &[u8]) -> Option<Range<usize>> {
        match self {
            Pattern::Regex(regex) => regex.find(haystack).map(|m| m.range()),
            Pattern::Literal(finder) => finder
                .find(haystack)
                .map(|start| start..start + finder.needle().len()),
            Pattern::Any => (!haystack.is_empty()).then(|| 0..haystack.len()),
        }
    }

    /// Check if the pattern matches anywhere in `haystack`.
    pub fn is_match(&self, haystack: &[u8]) -> bool {
        self.find(haystack).is_some()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
            Pattern::Literal(finder) => {
                write!(f, "{:?}", String::from_utf8_lossy(finder.needle()))
            }
            Pattern::Any => f.write_str("<any>"),
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({})", self)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern::Regex(regex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_prompt_matcher() {
        let pattern = Pattern::regex(r"router#\s*$").unwrap();
        assert!(pattern.is_match(b"router# "));
        assert!(pattern.is_match(b"some output\nrouter#"));
        assert!(!pattern.is_match(b"router> "));
    }

    #[test]
    fn test_prompt_anchoring() {
        // Pattern without anchor gets one added
        let pattern = Pattern::prompt(r"router#").unwrap();
        assert!(pattern.is_match(b"router# "));
        assert!(!pattern.is_match(b"router# show run"));

        // Pattern with anchor stays as-is
        let pattern = Pattern::prompt(r"router#$").unwrap();
        assert!(pattern.is_match(b"router#"));
        assert!(!pattern.is_match(b"router# "));
    }

    #[test]
    fn test_literal_span() {
        let pattern = Pattern::literal("--More--");
        assert_eq!(pattern.find(b"line\n --More-- "), Some(6..14));
        assert_eq!(pattern.find(b"nothing"), None);
    }

    #[test]
    fn test_any_matches_whatever_is_there() {
        assert_eq!(Pattern::Any.find(b"x"), Some(0..1));
        assert_eq!(Pattern::Any.find(b""), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Pattern::regex("a+").unwrap().to_string(), "/a+/");
        assert_eq!(Pattern::literal("login:").to_string(), "\"login:\"");
        assert_eq!(Pattern::Any.to_string(), "<any>");
    }
}
