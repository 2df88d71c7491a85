//! Cache key derivation
//!
//! A key is `<PROVIDER>_<value>_<value>..._<digest>`. Values are trimmed,
//! lower-cased and made path-safe; absent optional attributes are left out.
//! The trailing digest covers the unescaped attribute names and values, so
//! two requests that escape to the same readable text still get different
//! keys.

use crate::core::error::{CacheError, Result};
use sha2::{Digest, Sha256};

/// Replacement for characters that cannot appear in a path segment
const INERT: char = '.';

/// Longest readable part kept before the digest
const MAX_READABLE_CHARS: usize = 120;

/// Hex digits of the attribute digest appended to every key
const DIGEST_CHARS: usize = 8;

/// Builds deterministic, filesystem-safe cache keys.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    provider: String,
    attributes: Vec<(String, String)>,
    missing: Option<String>,
}

impl CacheKeyBuilder {
    pub fn new(provider: &str) -> Self {
        Self {
            provider: provider.trim().to_uppercase(),
            attributes: Vec::new(),
            missing: None,
        }
    }

    /// Add an attribute that must be present and non-blank.
    pub fn required(mut self, name: &str, value: Option<&str>) -> Self {
        match normalize(value) {
            Some(v) => self.attributes.push((name.to_owned(), v)),
            None => {
                if self.missing.is_none() {
                    self.missing = Some(name.to_owned());
                }
            }
        }
        self
    }

    /// Add an attribute that is omitted from the key when absent or blank.
    pub fn optional(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(v) = normalize(value) {
            self.attributes.push((name.to_owned(), v));
        }
        self
    }

    pub fn build(self) -> Result<String> {
        if let Some(attribute) = self.missing {
            return Err(CacheError::MissingAttribute {
                provider: self.provider,
                attribute,
            });
        }
        if self.provider.is_empty() {
            return Err(CacheError::Configuration(
                "cache key needs a provider id".to_owned(),
            ));
        }

        let mut readable = escape_segment(&self.provider);
        for (_, value) in &self.attributes {
            readable.push('_');
            readable.push_str(&escape_segment(value));
        }
        if readable.chars().count() > MAX_READABLE_CHARS {
            readable = readable.chars().take(MAX_READABLE_CHARS).collect();
        }

        let digest = attribute_digest(&self.provider, &self.attributes);
        Ok(format!("{readable}_{}", &digest[..DIGEST_CHARS]))
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// Replace reserved, control and whitespace characters with [`INERT`].
pub fn escape_segment(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => INERT,
            c if c.is_control() || c.is_whitespace() => INERT,
            c => c,
        })
        .collect()
}

/// Length-prefixed encoding keeps `("ab", "c")` and `("a", "bc")` apart.
fn attribute_digest(provider: &str, attributes: &[(String, String)]) -> String {
    let mut hasher = Sha256::new();
    let mut feed = |s: &str| {
        hasher.update((s.len() as u64).to_be_bytes());
        hasher.update(s.as_bytes());
    };
    feed(provider);
    for (name, value) in attributes {
        feed(name);
        feed(value);
    }
    hex::encode(hasher.finalize())
}
