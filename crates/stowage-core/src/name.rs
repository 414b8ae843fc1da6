//! Qualified item names
//!
//! Names are stored in their expanded form `{namespace-uri}local`. The
//! namespace part may itself contain `/` and `:` (it is usually a URI), so the
//! braces are the only delimiter that is looked for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CodecError, CodecResult};

/// Characters that may not appear in the local part of a name
const ILLEGAL_LOCAL_CHARS: &[char] = &['/', ':', '[', ']', '|', '*', '{', '}', '\t'];

/// An expanded qualified name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name {
    namespace: String,
    local: String,
}

impl Name {
    /// Create a name, validating the local part
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> CodecResult<Self> {
        let namespace = namespace.into();
        let local = local.into();
        validate_local(&local, &format!("{{{}}}{}", namespace, local))?;
        if namespace.contains('\t') || namespace.contains('}') {
            return Err(CodecError::format(
                "name",
                format!("{{{}}}{}", namespace, local),
                "namespace contains an illegal character",
            ));
        }
        Ok(Self { namespace, local })
    }

    /// Build a name from parts already known to be valid
    pub(crate) fn from_static(namespace: &'static str, local: &'static str) -> Self {
        Self {
            namespace: namespace.to_string(),
            local: local.to_string(),
        }
    }

    /// Create a name in the empty namespace
    pub fn local(local: impl Into<String>) -> CodecResult<Self> {
        Self::new(String::new(), local)
    }

    /// Parse `{uri}local` or a bare `local`
    pub fn parse(s: &str) -> CodecResult<Self> {
        match s.strip_prefix('{') {
            Some(rest) => {
                let close = rest
                    .find('}')
                    .ok_or_else(|| CodecError::format("name", s, "unterminated namespace"))?;
                let (namespace, local) = (&rest[..close], &rest[close + 1..]);
                validate_local(local, s)?;
                if namespace.contains('\t') {
                    return Err(CodecError::format("name", s, "namespace contains a tab"));
                }
                Ok(Self {
                    namespace: namespace.to_string(),
                    local: local.to_string(),
                })
            }
            None => {
                validate_local(s, s)?;
                Ok(Self {
                    namespace: String::new(),
                    local: s.to_string(),
                })
            }
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }
}

fn validate_local(local: &str, original: &str) -> CodecResult<()> {
    if local.is_empty() {
        return Err(CodecError::format("name", original, "empty local name"));
    }
    if let Some(c) = local.chars().find(|c| ILLEGAL_LOCAL_CHARS.contains(c)) {
        return Err(CodecError::format(
            "name",
            original,
            format!("illegal character {:?} in local name", c),
        ));
    }
    Ok(())
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local)
    }
}

impl FromStr for Name {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
