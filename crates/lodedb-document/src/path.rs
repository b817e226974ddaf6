//! Paths into nested documents and arrays.

use std::fmt;
use std::str::FromStr;

use crate::array::Array;
use crate::document::Document;
use crate::error::Error;
use crate::value::Value;

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathFragment {
    /// Field of a document.
    Field(String),
    /// Element of an array.
    Index(usize),
}

/// A path such as `address.city` or `tags[1]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path(Vec<PathFragment>);

impl Path {
    /// Create a path from fragments.
    pub fn new(fragments: Vec<PathFragment>) -> Self {
        Self(fragments)
    }

    /// A single-field path.
    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![PathFragment::Field(name.into())])
    }

    /// Parse the textual form, e.g. `a.b[0].c`.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let mut fragments = Vec::new();
        for segment in s.split('.') {
            let (name, mut rest) = match segment.find('[') {
                Some(pos) => segment.split_at(pos),
                None => (segment, ""),
            };
            if name.is_empty() {
                return Err(Error::InvalidPath(s.to_string()));
            }
            fragments.push(PathFragment::Field(name.to_string()));
            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .filter(|_| rest.starts_with('['))
                    .ok_or_else(|| Error::InvalidPath(s.to_string()))?;
                let index = rest[1..close]
                    .parse::<usize>()
                    .map_err(|_| Error::InvalidPath(s.to_string()))?;
                fragments.push(PathFragment::Index(index));
                rest = &rest[close + 1..];
            }
        }
        Ok(Self(fragments))
    }

    /// The fragments of this path.
    pub fn fragments(&self) -> &[PathFragment] {
        &self.0
    }

    /// Check if the path has no fragments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolve the path against a document.
    pub fn get_value_from_document(&self, document: &dyn Document) -> Result<Value, Error> {
        let mut fragments = self.0.iter();
        let mut current = match fragments.next() {
            Some(PathFragment::Field(name)) => document.get_by_field(name)?,
            Some(PathFragment::Index(_)) => return Err(Error::FieldNotFound),
            None => return Err(Error::InvalidPath("empty path".into())),
        };
        for fragment in fragments {
            current = step(&current, fragment)?;
        }
        Ok(current)
    }

    /// Resolve the path against an array.
    pub fn get_value_from_array(&self, array: &dyn Array) -> Result<Value, Error> {
        let mut fragments = self.0.iter();
        let mut current = match fragments.next() {
            Some(PathFragment::Index(idx)) => array.get_by_index(*idx)?,
            Some(PathFragment::Field(_)) => return Err(Error::ValueNotFound),
            None => return Err(Error::InvalidPath("empty path".into())),
        };
        for fragment in fragments {
            current = step(&current, fragment)?;
        }
        Ok(current)
    }
}

fn step(current: &Value, fragment: &PathFragment) -> Result<Value, Error> {
    match (fragment, current) {
        (PathFragment::Field(name), Value::Document(doc)) => doc.get_by_field(name),
        (PathFragment::Index(idx), Value::Array(arr)) => arr.get_by_index(*idx),
        (PathFragment::Field(_), _) => Err(Error::FieldNotFound),
        (PathFragment::Index(_), _) => Err(Error::ValueNotFound),
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, fragment) in self.0.iter().enumerate() {
            match fragment {
                PathFragment::Field(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathFragment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}
