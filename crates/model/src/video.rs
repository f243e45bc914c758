use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Validated video reference.
///
/// External references are opaque 11-character tokens drawn from
/// `[A-Za-z0-9_-]`. Anything else coming off the wire is dropped before it
/// reaches the timeline authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoRef(String);

impl VideoRef {
    /// Parses an externally supplied token.
    ///
    /// # Example
    /// ```
    /// use model::VideoRef;
    ///
    /// assert!(VideoRef::parse("dQw4w9WgXcQ").is_ok());
    /// assert!(VideoRef::parse("not a token").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = raw.len() == 11
            && raw
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');
        if !valid {
            return Err(ModelError::InvalidVideoRef {
                raw: raw.to_owned(),
            });
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VideoRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
