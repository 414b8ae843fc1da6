//! URI property values
//!
//! The original text is kept verbatim; the `url` crate is only used to check
//! that the text is a valid absolute or relative reference.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{CodecError, CodecResult};

/// Base used to validate relative references
const VALIDATION_BASE: &str = "http://relative.invalid/";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri(String);

impl Uri {
    pub fn parse(s: &str) -> CodecResult<Self> {
        match Url::parse(s) {
            Ok(_) => Ok(Self(s.to_string())),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse(VALIDATION_BASE)
                    .map_err(|e| CodecError::format("uri", s, e.to_string()))?;
                base.join(s)
                    .map(|_| Self(s.to_string()))
                    .map_err(|e| CodecError::format("uri", s, e.to_string()))
            }
            Err(e) => Err(CodecError::format("uri", s, e.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Uri {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
