// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

/// Namespace for identifiers derived from relation tuples.
const DERIVED_ID_NAMESPACE: uuid::Uuid = uuid::Uuid::from_u128(0x6b1f_3d0e_52a4_4c8e_9a41_7d2c_0f58_e913);

/// Globally unique, immutable identifier of a node or edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(cuid2::create_id())
    }

    /// Derive a stable identifier from an ordered list of parts.
    ///
    /// The same parts always yield the same identifier, on any host.
    pub fn derive(parts: &[&str]) -> Self {
        let name = parts.join("\u{1f}");
        Self(uuid::Uuid::new_v5(&DERIVED_ID_NAMESPACE, name.as_bytes()).to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Identifier {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&Identifier> for Identifier {
    fn from(id: &Identifier) -> Self {
        id.clone()
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<Identifier> for &str {
    fn eq(&self, other: &Identifier) -> bool {
        *self == other.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Identifier::generate();
        let b = Identifier::generate();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_derived_ids_are_stable() {
        let a = Identifier::derive(&["eth0", "veth1", "layer2"]);
        let b = Identifier::derive(&["eth0", "veth1", "layer2"]);
        let c = Identifier::derive(&["veth1", "eth0", "layer2"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_part_boundaries_matter() {
        let a = Identifier::derive(&["ab", "c"]);
        let b = Identifier::derive(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = Identifier::from("host-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"host-1\"");
        assert_eq!(id, "host-1");
    }
}
