//! Route pattern safety checks and compilation.
//!
//! # Responsibilities
//! - Reject patterns that are too long, too deep or have too many placeholders
//! - Compile `{name}` placeholders into anchored named captures
//! - Extract parameters from a normalized path
//!
//! # Design Decisions
//! - Literal text is escaped, so a route path can never inject regex syntax
//! - Captures are bounded (1-255 chars, no `/`)
//! - The `regex` crate matches in linear time; the limits here keep the
//!   compiled programs small

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use thiserror::Error;

pub const MAX_PATTERN_LENGTH: usize = 512;
pub const MAX_PLACEHOLDERS: usize = 10;
pub const MAX_PATH_SEGMENTS: usize = 32;

const CAPTURE: &str = "[^/]{1,255}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern is {0} bytes long (limit 512)")]
    TooLong(usize),

    #[error("pattern has {0} placeholders (limit 10)")]
    TooManyPlaceholders(usize),

    #[error("pattern has {0} separators (limit 32)")]
    TooManySegments(usize),

    #[error("pattern contains nested braces")]
    NestedBraces,

    #[error("pattern has unbalanced braces")]
    UnbalancedBraces,

    #[error("placeholder name `{0}` is not an identifier")]
    InvalidName(String),

    #[error("placeholder `{0}` appears twice")]
    DuplicateName(String),

    #[error("pattern failed to compile: {0}")]
    Compile(String),
}

/// Strip the query string and surrounding slashes.
pub fn normalize(path: &str) -> &str {
    let path = match path.find('?') {
        Some(i) => &path[..i],
        None => path,
    };
    path.trim_matches('/')
}

/// Count of `/` separators in an already trimmed path.
pub fn separator_count(trimmed: &str) -> usize {
    trimmed.bytes().filter(|b| *b == b'/').count()
}

/// Structural limits a pattern must satisfy before it is compiled.
pub fn check_safety(pattern: &str) -> Result<(), PatternError> {
    if pattern.len() > MAX_PATTERN_LENGTH {
        return Err(PatternError::TooLong(pattern.len()));
    }

    let mut depth = 0usize;
    let mut placeholders = 0usize;
    for c in pattern.chars() {
        match c {
            '{' => {
                depth += 1;
                if depth > 1 {
                    return Err(PatternError::NestedBraces);
                }
                placeholders += 1;
            }
            '}' => {
                if depth == 0 {
                    return Err(PatternError::UnbalancedBraces);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(PatternError::UnbalancedBraces);
    }
    if placeholders > MAX_PLACEHOLDERS {
        return Err(PatternError::TooManyPlaceholders(placeholders));
    }

    let separators = separator_count(pattern.trim_matches('/'));
    if separators > MAX_PATH_SEGMENTS {
        return Err(PatternError::TooManySegments(separators));
    }

    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A dynamic route pattern compiled once at registration.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
    names: Vec<String>,
}

impl CompiledPattern {
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        check_safety(pattern)?;

        let trimmed = normalize(pattern);
        let mut expr = String::with_capacity(trimmed.len() * 2 + 2);
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut rest = trimmed;

        expr.push('^');
        while let Some(open) = rest.find('{') {
            expr.push_str(&regex::escape(&rest[..open]));
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or(PatternError::UnbalancedBraces)?;
            let name = &after[..close];

            if !is_identifier(name) {
                return Err(PatternError::InvalidName(name.to_string()));
            }
            if !seen.insert(name) {
                return Err(PatternError::DuplicateName(name.to_string()));
            }
            expr.push_str(&format!("(?P<{name}>{CAPTURE})"));
            names.push(name.to_string());
            rest = &after[close + 1..];
        }
        expr.push_str(&regex::escape(rest));
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| PatternError::Compile(e.to_string()))?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            names,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Match a normalized path and return its named parameters.
    pub fn captures(&self, normalized_path: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.regex.captures(normalized_path)?;
        Some(
            self.names
                .iter()
                .filter_map(|name| {
                    caps.name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/login/"), "login");
        assert_eq!(normalize("/a/b?x=1&y=/"), "a/b");
        assert_eq!(normalize("/"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_safety_limits() {
        assert_eq!(check_safety(&"a".repeat(513)), Err(PatternError::TooLong(513)));
        assert_eq!(check_safety("/a/{b{c}}"), Err(PatternError::NestedBraces));
        assert_eq!(check_safety("/a/{b"), Err(PatternError::UnbalancedBraces));
        assert_eq!(check_safety("/a/b}"), Err(PatternError::UnbalancedBraces));

        let eleven: String = (0..11).map(|i| format!("/{{p{i}}}")).collect();
        assert_eq!(check_safety(&eleven), Err(PatternError::TooManyPlaceholders(11)));

        let deep = "/x".repeat(34);
        assert_eq!(check_safety(&deep), Err(PatternError::TooManySegments(33)));

        assert!(check_safety("/api/{id}/get").is_ok());
    }

    #[test]
    fn test_compile_and_capture() {
        let p = CompiledPattern::compile("/api/public/contact_form/{id}/get").unwrap();
        assert_eq!(p.names(), &["id".to_string()]);

        let params = p.captures("api/public/contact_form/42/get").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));

        // Anchored at both ends
        assert!(p.captures("api/public/contact_form/42/get/extra").is_none());
        assert!(p.captures("v1/api/public/contact_form/42/get").is_none());
        // A capture never spans a separator
        assert!(p.captures("api/public/contact_form/4/2/get").is_none());
    }

    #[test]
    fn test_literals_are_escaped() {
        let p = CompiledPattern::compile("/files/{name}.json").unwrap();
        assert!(p.captures("files/report.json").is_some());
        assert!(p.captures("files/reportXjson").is_none());
    }

    #[test]
    fn test_capture_length_bound() {
        let p = CompiledPattern::compile("/u/{id}").unwrap();
        assert!(p.captures(&format!("u/{}", "a".repeat(255))).is_some());
        assert!(p.captures(&format!("u/{}", "a".repeat(256))).is_none());
    }

    #[test]
    fn test_rejects_bad_names() {
        assert_eq!(
            CompiledPattern::compile("/u/{1id}").unwrap_err(),
            PatternError::InvalidName("1id".to_string())
        );
        assert_eq!(
            CompiledPattern::compile("/u/{id}/{id}").unwrap_err(),
            PatternError::DuplicateName("id".to_string())
        );
        assert!(CompiledPattern::compile("/u/{}").is_err());
    }
}
