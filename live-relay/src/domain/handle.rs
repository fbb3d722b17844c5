//! Account handle value object.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Maximum accepted handle length after normalization.
const MAX_HANDLE_LEN: usize = 64;

/// A normalized account handle.
///
/// Handles are lowercased and stripped of the leading `@`. Profile URLs such as
/// `https://example.com/@Alice/live` are reduced to the `@`-prefixed path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Parse and normalize a handle from operator input.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, Error> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(Error::InvalidHandle("handle cannot be empty".to_string()));
        }

        let candidate = if raw.contains("://") {
            Self::extract_from_url(raw)
                .ok_or_else(|| Error::InvalidHandle(format!("no handle in URL: {}", raw)))?
        } else {
            raw
        };

        let normalized = candidate.trim_start_matches('@').to_lowercase();
        Self::validate(&normalized)?;
        Ok(Self(normalized))
    }

    /// Create a Handle without validation (for trusted sources like DB).
    pub fn from_trusted(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get the handle as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn extract_from_url(url: &str) -> Option<&str> {
        let path = url.split_once("://")?.1;
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let segments: Vec<&str> = path.split('/').skip(1).filter(|s| !s.is_empty()).collect();

        // Prefer the `@name` segment, fall back to the first path segment.
        segments
            .iter()
            .find(|s| s.starts_with('@'))
            .or_else(|| segments.first())
            .copied()
    }

    fn validate(handle: &str) -> Result<(), Error> {
        if handle.is_empty() {
            return Err(Error::InvalidHandle("handle cannot be empty".to_string()));
        }

        if handle.len() > MAX_HANDLE_LEN {
            return Err(Error::InvalidHandle(format!(
                "handle exceeds {} characters",
                MAX_HANDLE_LEN
            )));
        }

        if let Some(c) = handle
            .chars()
            .find(|c| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '-')))
        {
            return Err(Error::InvalidHandle(format!(
                "invalid character '{}' in handle {}",
                c, handle
            )));
        }

        Ok(())
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
