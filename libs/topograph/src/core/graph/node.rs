// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Identifier, Metadata};

/// Vertex of the topology graph (host, interface, namespace, bridge, ...).
///
/// Nodes handed out by the graph are snapshots; mutate through the
/// [`Graph`](super::Graph) API so listeners are notified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Identifier,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Node {
    pub fn new(id: impl Into<Identifier>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            metadata,
        }
    }

    pub fn get_field(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// String field, treating an empty string as unset.
    pub fn get_field_string(&self, key: &str) -> Option<&str> {
        self.metadata.get_str(key).filter(|s| !s.is_empty())
    }

    pub fn matches(&self, filter: &Metadata) -> bool {
        self.metadata.matches(filter)
    }
}
