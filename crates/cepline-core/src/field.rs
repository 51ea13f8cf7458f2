//! Attribute addressing: flat names and nested paths

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a nested attribute path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl PathSegment {
    pub fn key(key: impl Into<String>) -> Self {
        PathSegment::Key(key.into())
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(idx: usize) -> Self {
        PathSegment::Index(idx)
    }
}

/// An attribute reference: either a top-level name or a path into nested values.
///
/// Every numeric and spatial operator resolves its attribute through this
/// type, so `"speed"` and `["gps", "speed"]` are interchangeable at call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Name(String),
    Path(Vec<PathSegment>),
}

impl Field {
    pub fn name(name: impl Into<String>) -> Self {
        Field::Name(name.into())
    }

    pub fn path<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PathSegment>,
    {
        Field::Path(segments.into_iter().map(Into::into).collect())
    }

    /// The top-level attribute name the field starts from, if any.
    pub fn root(&self) -> Option<&str> {
        match self {
            Field::Name(name) => Some(name),
            Field::Path(segments) => match segments.first() {
                Some(PathSegment::Key(key)) => Some(key),
                _ => None,
            },
        }
    }

    /// Resolve the field against a top-level attribute lookup.
    ///
    /// A path must start with a key; an empty path or a leading index
    /// resolves to `None`.
    pub fn resolve_in<'a, F>(&self, lookup: F) -> Option<&'a Value>
    where
        F: FnOnce(&str) -> Option<&'a Value>,
    {
        match self {
            Field::Name(name) => lookup(name),
            Field::Path(segments) => {
                let (first, rest) = segments.split_first()?;
                let PathSegment::Key(root) = first else {
                    return None;
                };
                rest.iter()
                    .try_fold(lookup(root)?, |value, segment| value.at(segment))
            }
        }
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Field::Name(name.to_string())
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Field::Name(name)
    }
}

impl From<Vec<PathSegment>> for Field {
    fn from(segments: Vec<PathSegment>) -> Self {
        Field::Path(segments)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Name(name) => write!(f, "{}", name),
            Field::Path(segments) => {
                for (i, segment) in segments.iter().enumerate() {
                    match segment {
                        PathSegment::Key(key) if i == 0 => write!(f, "{}", key)?,
                        PathSegment::Key(key) => write!(f, ".{}", key)?,
                        PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle() -> Value {
        Value::map([(
            "sensors",
            Value::Array(vec![
                Value::map([("speed", 12.5)]),
                Value::map([("speed", 14.0)]),
            ]),
        )])
    }

    #[test]
    fn test_flat_name_resolves_top_level() {
        let speed = Value::Float(3.0);
        let field = Field::from("speed");
        let got = field.resolve_in(|name| (name == "speed").then_some(&speed));
        assert_eq!(got, Some(&Value::Float(3.0)));
    }

    #[test]
    fn test_path_walks_keys_and_indices() {
        let root = vehicle();
        let field = Field::path([
            PathSegment::key("vehicle"),
            PathSegment::key("sensors"),
            PathSegment::Index(1),
            PathSegment::key("speed"),
        ]);
        let got = field.resolve_in(|name| (name == "vehicle").then_some(&root));
        assert_eq!(got.and_then(Value::as_float), Some(14.0));
    }

    #[test]
    fn test_path_out_of_structure_is_none() {
        let root = vehicle();
        let field = Field::path([
            PathSegment::key("vehicle"),
            PathSegment::key("sensors"),
            PathSegment::Index(7),
        ]);
        assert!(field
            .resolve_in(|name| (name == "vehicle").then_some(&root))
            .is_none());
    }

    #[test]
    fn test_empty_or_index_rooted_path_is_none() {
        let root = vehicle();
        assert!(Field::Path(vec![]).resolve_in(|_| Some(&root)).is_none());
        assert!(Field::path([PathSegment::Index(0)])
            .resolve_in(|_| Some(&root))
            .is_none());
    }

    #[test]
    fn test_display() {
        let field = Field::path([
            PathSegment::key("gps"),
            PathSegment::Index(0),
            PathSegment::key("lat"),
        ]);
        assert_eq!(field.to_string(), "gps[0].lat");
        assert_eq!(field.root(), Some("gps"));
    }

    #[test]
    fn test_deserialize_name_or_path() {
        let name: Field = serde_json::from_str(r#""speed""#).unwrap();
        assert_eq!(name, Field::name("speed"));
        let path: Field = serde_json::from_str(r#"["gps", 0, "lat"]"#).unwrap();
        assert_eq!(
            path,
            Field::path([
                PathSegment::key("gps"),
                PathSegment::Index(0),
                PathSegment::key("lat")
            ])
        );
    }
}
