//! Type-safe prim paths and the prim record exposed by documents.
//!
//! [`PrimPath`] is a newtype around an absolute scene-graph path such as
//! `/World/box_0`. The scene data itself belongs to the document
//! implementation; callers only hold paths into it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SampleError;

/// Prim type name of polygon meshes.
pub const MESH_TYPE: &str = "Mesh";

/// Prim type name of transform groups.
pub const XFORM_TYPE: &str = "Xform";

/// Absolute path of a prim in a document.
///
/// Always starts with `/`, has no empty segments, and every segment is a
/// valid identifier (`[A-Za-z_][A-Za-z0-9_]*`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrimPath(String);

impl PrimPath {
    /// Parses and validates a prim path.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidArgument`] for relative paths, empty
    /// segments or segments that are not identifiers.
    pub fn parse(text: &str) -> Result<Self, SampleError> {
        let Some(rest) = text.strip_prefix('/') else {
            return Err(SampleError::InvalidArgument(format!(
                "prim path must be absolute: {text}"
            )));
        };
        if rest.is_empty() {
            return Err(SampleError::InvalidArgument(
                "the pseudo-root cannot be edited".to_string(),
            ));
        }
        for segment in rest.split('/') {
            if !is_identifier(segment) {
                return Err(SampleError::InvalidArgument(format!(
                    "invalid prim name {segment:?} in {text}"
                )));
            }
        }
        Ok(Self(text.to_string()))
    }

    /// Returns the child path `self/name`.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidArgument`] if `name` is not a valid
    /// identifier.
    pub fn child(&self, name: &str) -> Result<Self, SampleError> {
        if !is_identifier(name) {
            return Err(SampleError::InvalidArgument(format!(
                "invalid prim name {name:?}"
            )));
        }
        Ok(Self(format!("{}/{name}", self.0)))
    }

    /// Returns the sibling path with the last segment replaced by `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError::InvalidArgument`] if `name` is not a valid
    /// identifier.
    pub fn with_name(&self, name: &str) -> Result<Self, SampleError> {
        match self.parent() {
            Some(parent) => parent.child(name),
            None => Self::parse(&format!("/{name}")),
        }
    }

    /// Returns `true` if `other` is this path or lies below it.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other.0 == self.0
            || other
                .0
                .strip_prefix(&self.0)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Moves `self` from under `from` to under `to`. Returns `None` if
    /// `from` does not cover `self`.
    #[must_use]
    pub fn rebase(&self, from: &Self, to: &Self) -> Option<Self> {
        let rest = self.0.strip_prefix(&from.0)?;
        (rest.is_empty() || rest.starts_with('/')).then(|| Self(format!("{}{rest}", to.0)))
    }

    /// Returns the parent path, or `None` for a top-level prim.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let idx = self.0.rfind('/')?;
        if idx == 0 {
            return None;
        }
        self.0.get(..idx).map(|p| Self(p.to_string()))
    }

    /// Last path segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PrimPath {
    type Error = SampleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PrimPath> for String {
    fn from(path: PrimPath) -> Self {
        path.0
    }
}

/// Turns an arbitrary label into a valid prim name, replacing invalid
/// characters with `_` and prefixing a leading digit.
#[must_use]
pub fn valid_prim_name(label: &str) -> String {
    let mut name: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A typed prim with its authored properties.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Prim {
    /// Schema type name such as `Mesh` or `Xform`; empty for typeless.
    pub type_name: String,
    /// Authored property values keyed by property name.
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Prim {
    /// Creates a prim of the given type with no properties.
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            properties: BTreeMap::new(),
        }
    }

    /// Returns `true` if the prim is a mesh.
    #[must_use]
    pub fn is_mesh(&self) -> bool {
        self.type_name == MESH_TYPE
    }
}
