use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Qualified name: a namespace URI plus a local name.
///
/// The text form is the expanded notation `{uri}local`; names in the empty
/// namespace render as the bare local name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Name {
    namespace_uri: String,
    local_name: String,
}

impl Name {
    pub fn new(namespace_uri: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            local_name: local_name.into(),
        }
    }

    pub fn namespace_uri(&self) -> &str {
        &self.namespace_uri
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Approximate heap footprint, used for cache weighting.
    pub fn memory_size(&self) -> usize {
        self.namespace_uri.len() + self.local_name.len() + 2 * std::mem::size_of::<String>()
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_uri.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace_uri, self.local_name)
        }
    }
}

impl FromStr for Name {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix('{') {
            let (uri, local) = rest
                .split_once('}')
                .ok_or_else(|| TypeError::InvalidName(s.to_string()))?;
            if local.is_empty() {
                return Err(TypeError::InvalidName(s.to_string()));
            }
            Ok(Self::new(uri, local))
        } else if s.is_empty() || s.contains(['{', '}', '/']) {
            Err(TypeError::InvalidName(s.to_string()))
        } else {
            Ok(Self::new("", s))
        }
    }
}

/// Well-known namespace URIs.
pub mod namespaces {
    /// The empty (default) namespace.
    pub const EMPTY: &str = "";
    pub const JCR: &str = "http://www.jcp.org/jcr/1.0";
    pub const NT: &str = "http://www.jcp.org/jcr/nt/1.0";
    pub const MIX: &str = "http://www.jcp.org/jcr/mix/1.0";

    /// Prefix/URI pairs every repository knows about.
    pub const BUILTIN: [(&str, &str); 4] = [("", EMPTY), ("jcr", JCR), ("nt", NT), ("mix", MIX)];
}

/// Well-known names.
pub mod names {
    use super::{namespaces, Name};

    /// `jcr:uuid`, the node's own identifier as a string.
    pub fn jcr_uuid() -> Name {
        Name::new(namespaces::JCR, "uuid")
    }

    /// `jcr:primaryType`.
    pub fn jcr_primary_type() -> Name {
        Name::new(namespaces::JCR, "primaryType")
    }

    /// `jcr:mixinTypes`.
    pub fn jcr_mixin_types() -> Name {
        Name::new(namespaces::JCR, "mixinTypes")
    }

    /// `nt:unstructured`.
    pub fn nt_unstructured() -> Name {
        Name::new(namespaces::NT, "unstructured")
    }

    /// `mix:referenceable`.
    pub fn mix_referenceable() -> Name {
        Name::new(namespaces::MIX, "referenceable")
    }

    /// Returns `true` for the three properties derived from a node's own
    /// header fields (`jcr:uuid`, `jcr:primaryType`, `jcr:mixinTypes`).
    pub fn is_identity_property(name: &Name) -> bool {
        name.namespace_uri() == namespaces::JCR
            && matches!(name.local_name(), "uuid" | "primaryType" | "mixinTypes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_expanded_form() {
        assert_eq!(names::jcr_uuid().to_string(), "{http://www.jcp.org/jcr/1.0}uuid");
        assert_eq!(Name::new("", "title").to_string(), "title");
    }

    #[test]
    fn parse_expanded_and_bare() {
        let name: Name = "{http://www.jcp.org/jcr/mix/1.0}referenceable".parse().unwrap();
        assert_eq!(name, names::mix_referenceable());
        let bare: Name = "title".parse().unwrap();
        assert_eq!(bare.namespace_uri(), "");
        assert_eq!(bare.local_name(), "title");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("{unterminated".parse::<Name>().is_err());
        assert!("{uri}".parse::<Name>().is_err());
        assert!("".parse::<Name>().is_err());
        assert!("a/b".parse::<Name>().is_err());
    }

    #[test]
    fn identity_properties() {
        assert!(names::is_identity_property(&names::jcr_uuid()));
        assert!(names::is_identity_property(&names::jcr_primary_type()));
        assert!(names::is_identity_property(&names::jcr_mixin_types()));
        assert!(!names::is_identity_property(&Name::new(namespaces::JCR, "created")));
        assert!(!names::is_identity_property(&Name::new("", "uuid")));
    }
}
