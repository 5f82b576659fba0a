//! Path whitelist for requests that may pass the auth gate without a token.
//!
//! A pattern is a literal path with optional wildcard tokens:
//!
//! | Token   | Matches                                  |
//! |---------|------------------------------------------|
//! | `*:d`   | one or more digits                       |
//! | `*:all` | one or more of `[A-Za-z0-9_-]`           |
//! | `*`     | one or more of `[A-Za-z_-]` (no digits)  |
//!
//! Patterns are anchored at both ends, so `/login` never matches `/login/x`.

use std::fmt;

use regex::Regex;

use super::{AuthError, AUTH_TAG};

const DIGITS: &str = "[0-9]+";
const ALPHANUMERIC: &str = "[a-zA-Z0-9_-]+";
const ALPHABETIC: &str = "[a-zA-Z_-]+";

/// One compiled whitelist entry
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> Result<Self, AuthError> {
        let expr = translate(pattern);
        let regex = Regex::new(&expr).map_err(|e| AuthError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.source, self.regex.as_str())
    }
}

/// Typed wildcards are recognised before the bare `*`.
fn translate(pattern: &str) -> String {
    let mut expr = String::with_capacity(pattern.len() * 2 + 8);
    expr.push_str("^(?:");

    let mut rest = pattern;
    while let Some(star) = rest.find('*') {
        expr.push_str(&regex::escape(&rest[..star]));
        let after = &rest[star + 1..];

        if let Some(tail) = after.strip_prefix(":all") {
            expr.push_str(ALPHANUMERIC);
            rest = tail;
        } else if let Some(tail) = after.strip_prefix(":d") {
            expr.push_str(DIGITS);
            rest = tail;
        } else {
            expr.push_str(ALPHABETIC);
            rest = after;
        }
    }
    expr.push_str(&regex::escape(rest));

    expr.push_str(")$");
    expr
}

/// Set of compiled path patterns. Immutable after construction.
#[derive(Debug, Clone, Default)]
pub struct AuthWhitelist {
    list: Vec<PathPattern>,
}

impl AuthWhitelist {
    pub fn new<I, S>(patterns: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = patterns
            .into_iter()
            .map(|p| PathPattern::compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::trace!(
            target: AUTH_TAG,
            "Whitelist Pattern: \n\t{}",
            list.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n\t")
        );

        Ok(Self { list })
    }

    /// True if any pattern accepts the whole path. Empty paths never match.
    pub fn verify(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        self.list.iter().any(|pattern| pattern.matches(path))
    }

    pub fn patterns(&self) -> &[PathPattern] {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(patterns: &[&str]) -> AuthWhitelist {
        AuthWhitelist::new(patterns).expect("valid patterns")
    }

    #[test]
    fn test_validate_urls() {
        let list = list(&["/about", "/login"]);
        assert!(list.verify("/login"));
        assert!(!list.verify("/l0gin"));
        assert!(!list.verify("/login-test"));
        assert!(list.verify("/about"));
        assert!(!list.verify("/user"));
        assert!(!list.verify("/login/test"));
    }

    #[test]
    fn test_validate_wildcards() {
        let list = list(&["/text/*", "/text/*/details"]);
        assert!(!list.verify("/text/12"));
        assert!(list.verify("/text/test"));
        assert!(list.verify("/text/test-info"));
        assert!(!list.verify("/text/4711/details"));
        assert!(list.verify("/text/test/details"));
        assert!(list.verify("/text/test-info/details"));
        assert!(list.verify("/text/test_more/details"));
    }

    #[test]
    fn test_validate_numeric_wildcards() {
        let list = list(&["/text/*:d", "/text/*:d/details"]);
        assert!(list.verify("/text/12"));
        assert!(!list.verify("/text/test"));
        assert!(!list.verify("/text/12a"));
        assert!(list.verify("/text/4711/details"));
        assert!(!list.verify("/text/test/details"));
    }

    #[test]
    fn test_validate_alphanumeric_wildcards() {
        let list = list(&["/text/*:all", "/text/*:all/*:d"]);
        assert!(list.verify("/text/3393a499-423f-11e8-969d-0242ac1a0002"));
        assert!(list.verify("/text/3393a499-423f-11e8-969d-0242ac1a0002/4711"));
        assert!(!list.verify("/text/3393a499-423f-11e8-969d-0242ac1a0002/next"));
        assert!(list.verify("/text/4711"));
    }

    #[test]
    fn test_literal_patterns_are_anchored() {
        for pattern in ["/", "/about", "/api/v1/status", "/a.b", "/x+y"] {
            let list = list(&[pattern]);
            assert!(list.verify(pattern), "{} should match itself", pattern);
            assert!(!list.verify(&format!("{}x", pattern)), "{} must be anchored", pattern);
        }
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let list = list(&["/a.b"]);
        assert!(list.verify("/a.b"));
        assert!(!list.verify("/aXb"));
    }

    #[test]
    fn test_empty_path_never_matches() {
        assert!(!list(&[""]).verify(""));
        assert!(!list(&["/about"]).verify(""));
        assert!(!AuthWhitelist::default().verify("/about"));
    }

    #[test]
    fn test_empty_pattern_only_matches_empty() {
        let pattern = PathPattern::compile("").unwrap();
        assert!(pattern.matches(""));
        assert!(!pattern.matches("/"));
    }

    #[test]
    fn test_bare_wildcard_rejects_digits() {
        let pattern = PathPattern::compile("/user/*").unwrap();
        assert!(pattern.matches("/user/anna"));
        assert!(!pattern.matches("/user/anna2"));
        assert!(!pattern.matches("/user/"));
    }

    #[test]
    fn test_verify_is_idempotent() {
        let list = list(&["/text/*:d"]);
        for _ in 0..5 {
            assert!(list.verify("/text/42"));
            assert!(!list.verify("/text/abc"));
        }
    }

    #[test]
    fn test_patterns_keep_insertion_order() {
        let list = list(&["/b", "/a", "/c"]);
        let sources: Vec<&str> = list.patterns().iter().map(|p| p.source()).collect();
        assert_eq!(sources, vec!["/b", "/a", "/c"]);
        assert_eq!(list.len(), 3);
    }
}
