//! Content-Security-Policy header.

use std::collections::BTreeMap;

use crate::config::schema::CspConfig;

const NONCE_PLACEHOLDER: &str = "{nonce}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    directives: BTreeMap<String, Vec<String>>,
}

impl ContentSecurityPolicy {
    /// `None` when CSP is disabled.
    pub fn from_config(config: &CspConfig) -> Option<Self> {
        config.enabled.then(|| Self {
            directives: config.directives.clone(),
        })
    }

    pub fn add_source(&mut self, directive: &str, source: &str) {
        let sources = self.directives.entry(directive.to_string()).or_default();
        if !sources.iter().any(|s| s == source) {
            sources.push(source.to_string());
        }
    }

    /// Header value with `{nonce}` replaced. Empty directives are left out.
    pub fn header_value(&self, nonce: &str) -> String {
        self.directives
            .iter()
            .filter(|(_, sources)| !sources.is_empty())
            .map(|(directive, sources)| {
                let sources: Vec<String> = sources
                    .iter()
                    .map(|s| s.replace(NONCE_PLACEHOLDER, nonce))
                    .collect();
                format!("{} {}", directive, sources.join(" "))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled() {
        let config = CspConfig {
            enabled: false,
            ..CspConfig::default()
        };
        assert!(ContentSecurityPolicy::from_config(&config).is_none());
    }

    #[test]
    fn test_header_value() {
        let mut directives = BTreeMap::new();
        directives.insert("default-src".to_string(), vec!["'self'".to_string()]);
        directives.insert("script-src".to_string(), vec!["'nonce-{nonce}'".to_string()]);
        directives.insert("frame-src".to_string(), Vec::new());
        let mut csp = ContentSecurityPolicy::from_config(&CspConfig {
            enabled: true,
            directives,
        })
        .unwrap();

        assert_eq!(
            csp.header_value("abc"),
            "default-src 'self'; script-src 'nonce-abc'"
        );

        csp.add_source("script-src", "'self'");
        csp.add_source("script-src", "'self'");
        assert_eq!(
            csp.header_value("n"),
            "default-src 'self'; script-src 'nonce-n' 'self'"
        );
    }
}
