//! Response text normalization.
//!
//! Models tend to append boilerplate trailer phrases ("If you have any
//! questions, feel free to ask!"). The normalizer strips a configurable
//! list of regex patterns from reply text before it is cached or returned.

use deva_core::error::{Error, Result};
use regex::Regex;

#[derive(Debug)]
pub struct ResponseNormalizer {
    patterns: Vec<Regex>,
}

impl ResponseNormalizer {
    /// Compile the configured pattern list. An invalid pattern is a
    /// configuration error.
    pub fn from_patterns(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| Error::Config {
                    message: format!("invalid normalize pattern '{p}': {e}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// A normalizer that passes text through untouched.
    pub fn noop() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Strip all configured patterns and trim surrounding whitespace.
    pub fn apply(&self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in &self.patterns {
            out = pattern.replace_all(&out, "").into_owned();
        }
        out.trim().to_string()
    }
}
