use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::name::Name;

/// Type tag of a property.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    String,
    Binary,
    Long,
    Double,
    Date,
    Boolean,
    Name,
    Path,
    Reference,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "String",
            Self::Binary => "Binary",
            Self::Long => "Long",
            Self::Double => "Double",
            Self::Date => "Date",
            Self::Boolean => "Boolean",
            Self::Name => "Name",
            Self::Path => "Path",
            Self::Reference => "Reference",
        };
        f.write_str(s)
    }
}

/// A single typed property value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InternalValue {
    String(String),
    Binary(Vec<u8>),
    Long(i64),
    Double(f64),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Boolean(bool),
    Name(Name),
    Path(String),
    Reference(NodeId),
}

impl InternalValue {
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::String,
            Self::Binary(_) => PropertyType::Binary,
            Self::Long(_) => PropertyType::Long,
            Self::Double(_) => PropertyType::Double,
            Self::Date(_) => PropertyType::Date,
            Self::Boolean(_) => PropertyType::Boolean,
            Self::Name(_) => PropertyType::Name,
            Self::Path(_) => PropertyType::Path,
            Self::Reference(_) => PropertyType::Reference,
        }
    }

    /// Approximate in-memory footprint in bytes.
    pub fn memory_size(&self) -> usize {
        let payload = match self {
            Self::String(s) | Self::Path(s) => s.len(),
            Self::Binary(b) => b.len(),
            Self::Name(n) => n.memory_size(),
            Self::Long(_) | Self::Double(_) | Self::Date(_) | Self::Boolean(_) => 0,
            Self::Reference(_) => 16,
        };
        std::mem::size_of::<Self>() + payload
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for InternalValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for InternalValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for InternalValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<bool> for InternalValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<Name> for InternalValue {
    fn from(n: Name) -> Self {
        Self::Name(n)
    }
}

impl From<NodeId> for InternalValue {
    fn from(id: NodeId) -> Self {
        Self::Reference(id)
    }
}

impl fmt::Display for InternalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Path(s) => f.write_str(s),
            Self::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Date(ms) => write!(f, "@{ms}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Name(n) => write!(f, "{n}"),
            Self::Reference(id) => write!(f, "{id}"),
        }
    }
}
