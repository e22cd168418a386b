use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;
use crate::name::Name;

/// Stable identifier of a node.
///
/// A `NodeId` is a 128-bit value rendered canonically as lowercase hex with
/// `-` separators (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`). It never changes
/// once assigned to a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Generate a fresh random identifier for a new node.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from the raw 16 bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Create from a 128-bit integer (most significant byte first).
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Parse the canonical text form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidNodeId(format!("{s}: {e}")))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for NodeId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identifier of a property: the owning node plus the property name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyId {
    parent: NodeId,
    name: Name,
}

impl PropertyId {
    pub fn new(parent: NodeId, name: Name) -> Self {
        Self { parent, name }
    }

    /// The node owning this property.
    pub fn parent_id(&self) -> NodeId {
        self.parent
    }

    pub fn name(&self) -> &Name {
        &self.name
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyId({self})")
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent, self.name)
    }
}

impl FromStr for PropertyId {
    type Err = TypeError;

    /// Parse `<uuid>/<expanded name>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node, name) = s
            .split_once('/')
            .ok_or_else(|| TypeError::InvalidPropertyId(s.to_string()))?;
        Ok(Self::new(node.parse()?, name.parse()?))
    }
}

/// Identifier of either kind of item.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemId {
    Node(NodeId),
    Property(PropertyId),
}

impl ItemId {
    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node(_))
    }

    /// The node whose bundle stores this item.
    pub fn bundle_id(&self) -> NodeId {
        match self {
            Self::Node(id) => *id,
            Self::Property(id) => id.parent_id(),
        }
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => fmt::Debug::fmt(id, f),
            Self::Property(id) => fmt::Debug::fmt(id, f),
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => fmt::Display::fmt(id, f),
            Self::Property(id) => fmt::Display::fmt(id, f),
        }
    }
}

impl From<NodeId> for ItemId {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<PropertyId> for ItemId {
    fn from(id: PropertyId) -> Self {
        Self::Property(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::names;

    #[test]
    fn display_is_canonical_uuid() {
        let id = NodeId::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        assert_eq!(id.to_string(), "01234567-89ab-cdef-0123-456789abcdef");
    }

    #[test]
    fn parse_roundtrip() {
        let id = NodeId::random();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            NodeId::parse("not-a-uuid"),
            Err(TypeError::InvalidNodeId(_))
        ));
    }

    #[test]
    fn random_ids_are_unique() {
        assert_ne!(NodeId::random(), NodeId::random());
    }

    #[test]
    fn property_id_display_and_parse() {
        let node = NodeId::from_u128(7);
        let id = PropertyId::new(node, names::jcr_primary_type());
        let text = id.to_string();
        assert_eq!(
            text,
            "00000000-0000-0000-0000-000000000007/{http://www.jcp.org/jcr/1.0}primaryType"
        );
        let parsed: PropertyId = text.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn item_bundle_id_maps_property_to_parent() {
        let node = NodeId::from_u128(42);
        let prop = ItemId::from(PropertyId::new(node, Name::new("", "title")));
        assert_eq!(prop.bundle_id(), node);
        assert!(!prop.is_node());
        assert_eq!(ItemId::from(node).bundle_id(), node);
    }

    #[test]
    fn serde_roundtrip() {
        let id = NodeId::random();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn ordering_is_consistent() {
        assert!(NodeId::from_u128(1) < NodeId::from_u128(2));
    }
}
