//! Body-text validation
//!
//! Word and pattern matching over fetched page text, the building blocks
//! for success-word and fail-word checks.

use regex::Regex;

use crate::error::Result;

/// Case-insensitive substring search against each word in order
///
/// Returns the index of the first word contained in `body`, or `None`
/// when nothing matches.
pub fn contains_any(body: &str, words: &[String]) -> Option<usize> {
    if words.is_empty() {
        return None;
    }
    let haystack = body.to_lowercase();
    words
        .iter()
        .position(|word| haystack.contains(&word.to_lowercase()))
}

/// Same semantics as [`contains_any`] over compiled regular expressions
///
/// A pattern that matches zero times counts as absent. Patterns are
/// compiled case-insensitively to mirror the plain word check.
pub fn contains_any_regex(body: &str, patterns: &[String]) -> Result<Option<usize>> {
    for (i, pattern) in patterns.iter().enumerate() {
        let re = Regex::new(&format!("(?i){}", pattern))?;
        if re.is_match(body) {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// A configured word check: plain words plus regex patterns
///
/// The check is enabled when either list is non-empty; pages with an
/// enabled success check must match at least once, pages with an enabled
/// fail check are rejected on any match.
#[derive(Debug, Clone, Default)]
pub struct WordChecks {
    words: Vec<String>,
    patterns: Vec<String>,
}

impl WordChecks {
    pub fn new(words: Vec<String>, patterns: Vec<String>) -> Self {
        Self { words, patterns }
    }

    pub fn is_enabled(&self) -> bool {
        !self.words.is_empty() || !self.patterns.is_empty()
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// First matching word or pattern, if any
    pub fn find_match(&self, body: &str) -> Result<Option<String>> {
        if let Some(i) = contains_any(body, &self.words) {
            return Ok(Some(self.words[i].clone()));
        }
        if let Some(i) = contains_any_regex(body, &self.patterns)? {
            return Ok(Some(self.patterns[i].clone()));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_contains_any_case_insensitive() {
        assert_eq!(contains_any("The QUICK fox", &words(&["quick"])), Some(0));
        assert_eq!(contains_any("abc", &words(&["zzz"])), None);
        assert_eq!(
            contains_any("Access Denied by gateway", &words(&["captcha", "denied"])),
            Some(1)
        );
    }

    #[test]
    fn test_contains_any_empty_word_list() {
        assert_eq!(contains_any("anything", &[]), None);
    }

    #[test]
    fn test_contains_any_reports_first_matching_word() {
        // Both words occur; the word list order decides, not body order.
        let body = "rate limited, please sign in";
        assert_eq!(
            contains_any(body, &words(&["sign in", "rate limited"])),
            Some(0)
        );
    }

    #[test]
    fn test_contains_any_regex() {
        let patterns = words(&[r"captcha", r"error\s+\d+"]);
        assert_eq!(
            contains_any_regex("Error   503 from upstream", &patterns).unwrap(),
            Some(1)
        );
        assert_eq!(contains_any_regex("all good", &patterns).unwrap(), None);
    }

    #[test]
    fn test_contains_any_regex_invalid_pattern() {
        let patterns = words(&["(unclosed"]);
        assert!(contains_any_regex("body", &patterns).is_err());
    }

    #[test]
    fn test_word_checks_combined() {
        let checks = WordChecks::new(words(&["denied"]), words(&[r"robot\s+check"]));
        assert!(checks.is_enabled());

        assert_eq!(
            checks.find_match("Access DENIED").unwrap(),
            Some("denied".to_string())
        );
        assert_eq!(
            checks.find_match("Robot  Check page").unwrap(),
            Some(r"robot\s+check".to_string())
        );
        assert_eq!(checks.find_match("welcome").unwrap(), None);

        assert!(!WordChecks::default().is_enabled());
    }
}
