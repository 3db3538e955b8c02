//! URL 匹配模式（`*` 通配）

use regex::Regex;

use crate::error::ConfigError;

/// 形如 `https://*.mheducation.com/*` 的模式
#[derive(Debug, Clone)]
pub struct UrlPattern {
    raw: String,
    regex: Regex,
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex =
            Regex::new(&format!("^{}$", body)).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    /// 解析一组模式
    pub fn parse_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Self>, ConfigError> {
        patterns.iter().map(|p| Self::new(p.as_ref())).collect()
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// 任意一个模式匹配即可
pub fn matches_any(patterns: &[UrlPattern], url: &str) -> bool {
    patterns.iter().any(|p| p.matches(url))
}
