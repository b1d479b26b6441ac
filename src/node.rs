//! Node addressing and value types for the device node tree.
//!
//! Every addressable value on the instrument is identified by a hierarchical
//! string path (e.g. `/dev12004/qachannels/0/generator/ready`). Paths are
//! opaque to this library: two equal strings denote the same node, and no
//! structure beyond `/`-joining is assumed.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Hierarchical path of one addressable node on the device.
///
/// Immutable once constructed; equality and hashing are structural.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(String);

impl NodePath {
    /// Creates a path from its string form.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns a new path with `leaf` appended below this one.
    pub fn join(&self, leaf: impl AsRef<str>) -> Self {
        Self(format!("{}/{}", self.0, leaf.as_ref()))
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for NodePath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

/// Scalar value stored at a node.
///
/// Comparison uses the concrete variant's natural equality; there is no
/// implicit coercion between integer and floating-point nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeValue {
    /// Integer node (enable flags, status codes, counts).
    Int(i64),
    /// Floating-point node (frequencies, delays).
    Double(f64),
    /// String node (source aliases, status messages).
    Str(String),
}

impl NodeValue {
    /// Returns the integer value, if this is an integer node.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            NodeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string value, if this is a string node.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NodeValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Name of the variant, used in type-mismatch diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeValue::Int(_) => "Int",
            NodeValue::Double(_) => "Double",
            NodeValue::Str(_) => "Str",
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Int(v) => write!(f, "{v}"),
            NodeValue::Double(v) => write!(f, "{v}"),
            NodeValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for NodeValue {
    fn from(v: i64) -> Self {
        NodeValue::Int(v)
    }
}

impl From<f64> for NodeValue {
    fn from(v: f64) -> Self {
        NodeValue::Double(v)
    }
}

impl From<&str> for NodeValue {
    fn from(v: &str) -> Self {
        NodeValue::Str(v.to_string())
    }
}

impl From<String> for NodeValue {
    fn from(v: String) -> Self {
        NodeValue::Str(v)
    }
}

/// Payload written to a vector node.
#[derive(Clone, Debug, PartialEq)]
pub enum VectorData {
    /// IQ samples (waveforms, integration weights).
    Complex(Vec<Complex64>),
    /// Text blob (command tables).
    Text(String),
}

impl VectorData {
    /// The defined "empty" value used by clear phases of batch writes.
    pub fn empty() -> Self {
        VectorData::Complex(Vec::new())
    }
}

/// A vector read from the device: raw samples plus device-supplied metadata.
///
/// The metadata keys depend on the node; scope waves carry `scaling` and
/// `averagecount`, which callers need to derive the physical scale.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct VectorRead {
    /// Raw IQ samples.
    pub samples: Vec<Complex64>,
    /// Metadata returned alongside the samples.
    pub properties: HashMap<String, f64>,
}
