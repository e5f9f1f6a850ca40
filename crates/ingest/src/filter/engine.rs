use grep_matcher::Matcher;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),
}

/// Compiled exclusion filter.
///
/// Source exclusion lists are joined into one alternation so each raw line
/// is scanned once, whatever the number of patterns. Drops are counted by
/// the owning source.
pub struct FilterEngine {
    matcher: RegexMatcher,
    pattern: String,
}

impl FilterEngine {
    pub fn new(pattern: &str, case_sensitive: bool) -> Result<Self, FilterError> {
        let matcher = RegexMatcherBuilder::new()
            .case_insensitive(!case_sensitive)
            .multi_line(false)
            .build(pattern)
            .map_err(|e| FilterError::InvalidRegex(e.to_string()))?;

        Ok(Self {
            matcher,
            pattern: pattern.to_string(),
        })
    }

    /// Filter dropping lines that match **any** of `patterns`.
    ///
    /// Each pattern is validated on its own first so the error names the
    /// offending one.
    pub fn exclude_any<S: AsRef<str>>(patterns: &[S], case_sensitive: bool) -> Result<Self, FilterError> {
        if patterns.is_empty() {
            return Err(FilterError::InvalidRegex("at least one pattern required".into()));
        }
        for pattern in patterns {
            RegexMatcherBuilder::new()
                .build(pattern.as_ref())
                .map_err(|e| FilterError::InvalidRegex(format!("{}: {}", pattern.as_ref(), e)))?;
        }
        let combined = if patterns.len() == 1 {
            patterns[0].as_ref().to_string()
        } else {
            patterns
                .iter()
                .map(|p| format!("(?:{})", p.as_ref()))
                .collect::<Vec<_>>()
                .join("|")
        };
        Self::new(&combined, case_sensitive)
    }

    /// True when `line` matches and must be dropped.
    #[inline]
    pub fn excludes(&self, line: &str) -> bool {
        self.matcher.is_match(line.as_bytes()).unwrap_or(false)
    }
}

impl std::fmt::Debug for FilterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEngine")
            .field("pattern", &self.pattern)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pattern() {
        let filter = FilterEngine::new("healthcheck", true).expect("Failed to create filter");

        assert!(filter.excludes("healthcheck: ok"));
        assert!(!filter.excludes("Processing request"));
        assert!(filter.excludes("Running healthcheck now"));
    }

    #[test]
    fn test_case_sensitive() {
        let filter = FilterEngine::new("Error", true).expect("Failed to create filter");
        assert!(filter.excludes("Error: something"));
        assert!(!filter.excludes("error: something"));

        let loose = FilterEngine::new("Error", false).expect("Failed to create filter");
        assert!(loose.excludes("ERROR: something"));
    }

    #[test]
    fn test_exclude_any() {
        let filter = FilterEngine::exclude_any(&["GET /health", r"user=monitor\b"], false)
            .expect("Failed to create filter");

        assert!(filter.excludes(r#"10.0.0.1 - - [01/Jan/2025:00:00:00 +0000] "get /health HTTP/1.1" 200 2"#));
        assert!(filter.excludes("login ok user=monitor"));
        assert!(!filter.excludes("login ok user=monitoring2"));
        assert!(!filter.excludes("login ok user=alice"));
    }

    #[test]
    fn test_exclude_any_names_bad_pattern() {
        let err = FilterEngine::exclude_any(&["ok", "[invalid"], false).unwrap_err();
        let FilterError::InvalidRegex(msg) = err;
        assert!(msg.starts_with("[invalid"));

        let empty: [&str; 0] = [];
        assert!(FilterEngine::exclude_any(&empty, false).is_err());
    }
}
