//! Configuration schema and loader.
//!
//! The file is JSON with `//`-prefixed line comments allowed, stripped
//! before handing the rest to `serde_json`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SocksEntry {
    pub addr: String,
    #[serde(default, rename = "userPass")]
    pub user_pass: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TunnelEntry {
    pub addr: String,
    pub method: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: Option<LogConfig>,
    #[serde(default)]
    pub socks: Vec<SocksEntry>,
    #[serde(default)]
    pub tunnels: Vec<TunnelEntry>,
    #[serde(default, rename = "directSuffixes")]
    pub direct_suffixes: Vec<String>,
    #[serde(default, rename = "directSites")]
    pub direct_sites: Vec<String>,
    #[serde(default, rename = "tunnelSites")]
    pub tunnel_sites: Vec<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        let stripped = strip_line_comments(&raw);
        let config: Config = serde_json::from_str(&stripped)
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        Ok(config)
    }
}

/// Strips `//` to end-of-line, respecting double-quoted strings (with
/// backslash escapes) so a literal `//` inside a value survives.
fn strip_line_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }

        if c == '/' && chars.peek() == Some(&'/') {
            for c in chars.by_ref() {
                if c == '\n' {
                    out.push('\n');
                    break;
                }
            }
            continue;
        }

        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_comments_outside_strings() {
        let src = "{\n  // a comment\n  \"a\": 1, // trailing\n  \"b\": \"http://x\"\n}";
        let stripped = strip_line_comments(src);
        assert!(!stripped.contains("a comment"));
        assert!(!stripped.contains("trailing"));
        assert!(stripped.contains("http://x"));
    }

    #[test]
    fn parses_full_schema() {
        let json = r#"
        {
          "log": { "debug": true, "file": "/var/log/splittun.log" },
          // local socks fronts
          "socks": [ { "addr": "127.0.0.1:1080", "userPass": { "alice": "wonderland" } } ],
          "tunnels": [ { "addr": "1.2.3.4:9000", "method": "aes-128-cfb", "key": "k" } ],
          "directSuffixes": [".cn"],
          "directSites": ["a.com"],
          "tunnelSites": ["b.com"]
        }
        "#;
        let stripped = strip_line_comments(json);
        let config: Config = serde_json::from_str(&stripped).unwrap();
        assert_eq!(config.socks.len(), 1);
        assert_eq!(config.tunnels[0].method, "aes-128-cfb");
        assert_eq!(config.direct_suffixes, vec![".cn".to_string()]);
        assert!(config.log.unwrap().debug);
    }

    #[test]
    fn missing_optional_sections_default_empty() {
        let json = "{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.socks.is_empty());
        assert!(config.tunnels.is_empty());
        assert!(config.log.is_none());
    }
}
