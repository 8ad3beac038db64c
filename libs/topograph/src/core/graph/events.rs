// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use crate::core::error::Result;

use super::{Edge, Identifier, Node};

/// Position of an event in a graph's mutation sequence.
pub type Revision = u64;

/// A single accepted mutation, carrying the affected entity.
///
/// Added/updated events carry the post-mutation snapshot, deleted events
/// the pre-mutation snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeAdded(Node),
    NodeUpdated(Node),
    NodeDeleted(Node),
    EdgeAdded(Edge),
    EdgeUpdated(Edge),
    EdgeDeleted(Edge),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Added,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Node,
    Edge,
}

impl GraphEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GraphEvent::NodeAdded(_) | GraphEvent::EdgeAdded(_) => EventKind::Added,
            GraphEvent::NodeUpdated(_) | GraphEvent::EdgeUpdated(_) => EventKind::Updated,
            GraphEvent::NodeDeleted(_) | GraphEvent::EdgeDeleted(_) => EventKind::Deleted,
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            GraphEvent::NodeAdded(_) | GraphEvent::NodeUpdated(_) | GraphEvent::NodeDeleted(_) => {
                EntityKind::Node
            }
            _ => EntityKind::Edge,
        }
    }

    pub fn entity_id(&self) -> &Identifier {
        match self {
            GraphEvent::NodeAdded(n) | GraphEvent::NodeUpdated(n) | GraphEvent::NodeDeleted(n) => {
                &n.id
            }
            GraphEvent::EdgeAdded(e) | GraphEvent::EdgeUpdated(e) | GraphEvent::EdgeDeleted(e) => {
                &e.id
            }
        }
    }
}

/// Receiver of graph mutation notifications.
///
/// Every callback defaults to a no-op, so a listener implements only the
/// event kinds it cares about. Callbacks run synchronously on the thread
/// that performed the mutation and must not block. They may read or mutate
/// the graph; see [`Graph`](super::Graph) for the ordering guarantees.
pub trait GraphListener: Send {
    fn on_node_added(&mut self, _node: &Node) -> Result<()> {
        Ok(())
    }

    fn on_node_updated(&mut self, _node: &Node) -> Result<()> {
        Ok(())
    }

    fn on_node_deleted(&mut self, _node: &Node) -> Result<()> {
        Ok(())
    }

    fn on_edge_added(&mut self, _edge: &Edge) -> Result<()> {
        Ok(())
    }

    fn on_edge_updated(&mut self, _edge: &Edge) -> Result<()> {
        Ok(())
    }

    fn on_edge_deleted(&mut self, _edge: &Edge) -> Result<()> {
        Ok(())
    }

    /// Entry point used by the dispatcher. Override to observe the raw
    /// event stream together with its revision.
    fn on_graph_event(&mut self, _revision: Revision, event: &GraphEvent) -> Result<()> {
        match event {
            GraphEvent::NodeAdded(n) => self.on_node_added(n),
            GraphEvent::NodeUpdated(n) => self.on_node_updated(n),
            GraphEvent::NodeDeleted(n) => self.on_node_deleted(n),
            GraphEvent::EdgeAdded(e) => self.on_edge_added(e),
            GraphEvent::EdgeUpdated(e) => self.on_edge_updated(e),
            GraphEvent::EdgeDeleted(e) => self.on_edge_deleted(e),
        }
    }
}

/// Registration token returned by [`Graph::add_listener`](super::Graph::add_listener).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub(crate) u64);
