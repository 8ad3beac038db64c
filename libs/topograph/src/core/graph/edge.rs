// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use super::{Identifier, Metadata};

/// Metadata key holding the relation type of an edge.
pub const RELATION_TYPE: &str = "RelationType";

/// Well-known relation types.
pub mod relation_types {
    /// Parent owns child (host owns interface, bridge owns port).
    /// Subgraph deletion follows these edges.
    pub const OWNERSHIP: &str = "ownership";

    /// Inferred layer-2 adjacency. Undirected in meaning.
    pub const LAYER2: &str = "layer2";
}

/// Typed relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: Identifier,
    pub parent: Identifier,
    pub child: Identifier,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Edge {
    pub fn new(
        id: impl Into<Identifier>,
        parent: impl Into<Identifier>,
        child: impl Into<Identifier>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: id.into(),
            parent: parent.into(),
            child: child.into(),
            metadata,
        }
    }

    /// Identifier derived from `(parent, child, relation type)`.
    pub fn derive_id(parent: &Identifier, child: &Identifier, metadata: &Metadata) -> Identifier {
        let relation = metadata.get_str(RELATION_TYPE).unwrap_or_default();
        Identifier::derive(&[parent.as_str(), child.as_str(), relation])
    }

    pub fn relation_type(&self) -> Option<&str> {
        self.metadata.get_str(RELATION_TYPE)
    }

    pub fn matches(&self, filter: &Metadata) -> bool {
        self.metadata.matches(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_id_depends_on_relation() {
        let a = Identifier::from("a");
        let b = Identifier::from("b");
        let own = Metadata::new().with(RELATION_TYPE, "ownership");
        let l2 = Metadata::new().with(RELATION_TYPE, "layer2");

        assert_eq!(Edge::derive_id(&a, &b, &own), Edge::derive_id(&a, &b, &own));
        assert_ne!(Edge::derive_id(&a, &b, &own), Edge::derive_id(&a, &b, &l2));
        assert_ne!(Edge::derive_id(&a, &b, &own), Edge::derive_id(&b, &a, &own));
    }
}
