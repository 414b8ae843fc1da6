//! Repository paths
//!
//! Canonical form: elements joined by TAB. A leading `{}` element marks an
//! absolute path. Named elements carry an optional `[n]` same-name-sibling
//! index, n >= 1.

use std::fmt;
use std::str::FromStr;

use crate::error::{CodecError, CodecResult};
use crate::name::Name;

const DELIMITER: char = '\t';
const ROOT: &str = "{}";

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    Root,
    Current,
    Parent,
    Named { name: Name, index: Option<u32> },
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Root => f.write_str(ROOT),
            PathElement::Current => f.write_str("."),
            PathElement::Parent => f.write_str(".."),
            PathElement::Named { name, index: None } => write!(f, "{}", name),
            PathElement::Named {
                name,
                index: Some(i),
            } => write!(f, "{}[{}]", name, i),
        }
    }
}

/// A relative or absolute repository path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    elements: Vec<PathElement>,
}

impl Path {
    /// The root path
    pub fn root() -> Self {
        Self {
            elements: vec![PathElement::Root],
        }
    }

    /// Build a path from elements; `Root` is only legal in first position
    pub fn from_elements(elements: Vec<PathElement>) -> CodecResult<Self> {
        if elements.is_empty() {
            return Err(CodecError::format("path", "", "empty path"));
        }
        if elements
            .iter()
            .skip(1)
            .any(|e| matches!(e, PathElement::Root))
        {
            let joined = join(&elements);
            return Err(CodecError::format("path", joined, "root element not first"));
        }
        Ok(Self { elements })
    }

    /// Append a named element
    pub fn child(mut self, name: Name) -> Self {
        self.elements.push(PathElement::Named { name, index: None });
        self
    }

    pub fn is_absolute(&self) -> bool {
        matches!(self.elements.first(), Some(PathElement::Root))
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    /// Parse the canonical form
    pub fn parse(s: &str) -> CodecResult<Self> {
        if s.is_empty() {
            return Err(CodecError::format("path", s, "empty path"));
        }
        let mut elements = Vec::new();
        for (position, raw) in s.split(DELIMITER).enumerate() {
            let element = match raw {
                ROOT if position == 0 => PathElement::Root,
                ROOT => return Err(CodecError::format("path", s, "root element not first")),
                "." => PathElement::Current,
                ".." => PathElement::Parent,
                "" => return Err(CodecError::format("path", s, "empty path element")),
                named => parse_named(named, s)?,
            };
            elements.push(element);
        }
        Ok(Self { elements })
    }
}

fn parse_named(raw: &str, original: &str) -> CodecResult<PathElement> {
    let (name_part, index) = match raw.strip_suffix(']') {
        Some(without) => {
            let open = without
                .rfind('[')
                .ok_or_else(|| CodecError::format("path", original, "unbalanced index"))?;
            let index: u32 = without[open + 1..].parse().map_err(|_| {
                CodecError::format("path", original, "index is not a positive integer")
            })?;
            if index == 0 {
                return Err(CodecError::format("path", original, "index must be >= 1"));
            }
            (&without[..open], Some(index))
        }
        None => (raw, None),
    };
    let name =
        Name::parse(name_part).map_err(|e| CodecError::format("path", original, e.to_string()))?;
    Ok(PathElement::Named { name, index })
}

fn join(elements: &[PathElement]) -> String {
    elements
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\t")
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join(&self.elements))
    }
}

impl FromStr for Path {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_path() {
        let root = Path::root();
        assert!(root.is_absolute());
        assert_eq!(root.to_string(), "{}");
        assert_eq!(Path::parse("{}").unwrap(), root);
    }

    #[test]
    fn test_absolute_path_with_index() {
        let s = "{}\t{http://www.jcp.org/jcr/1.0}content\t{}item[2]";
        let path = Path::parse(s).unwrap();
        assert!(path.is_absolute());
        assert_eq!(path.elements().len(), 3);
        assert_eq!(
            path.elements()[2],
            PathElement::Named {
                name: Name::local("item").unwrap(),
                index: Some(2)
            }
        );
        assert_eq!(path.to_string(), s);
    }

    #[test]
    fn test_relative_path() {
        let path = Path::parse("..\t.\t{}a").unwrap();
        assert!(!path.is_absolute());
        assert_eq!(path.elements()[0], PathElement::Parent);
        assert_eq!(path.elements()[1], PathElement::Current);
    }

    #[test]
    fn test_rejects_malformed_paths() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse("{}a\t{}").is_err());
        assert!(Path::parse("{}a\t\t{}b").is_err());
        assert!(Path::parse("{}a[0]").is_err());
        assert!(Path::parse("{}a[x]").is_err());
        assert!(Path::parse("{}a]").is_err());
    }

    #[test]
    fn test_builder_matches_parser() {
        let built = Path::root()
            .child(Name::local("australia").unwrap())
            .child(Name::local("canberra").unwrap());
        assert_eq!(Path::parse(&built.to_string()).unwrap(), built);
    }
}
