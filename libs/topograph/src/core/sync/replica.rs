// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Receiving side of graph replication.

use std::collections::{HashMap, HashSet};

use crate::core::error::{GraphError, Result};
use crate::core::graph::{Edge, Graph, GraphEvent, Identifier, Node, Revision};

use super::SyncMessage;

/// Position in one origin's stream.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Revision of the last applied event (or of the reset).
    last: Revision,
    /// Snapshot entries, all stamped with the reset revision, are still
    /// allowed.
    in_snapshot: bool,
}

/// Identifies one reset-to-reset session of an origin.
pub type SessionId = u64;

#[derive(Debug, Default)]
struct OriginState {
    root: Option<Identifier>,
    /// Session opened by the latest reset; 0 before the first one.
    session: SessionId,
    /// `None` until a reset opens a session.
    cursor: Option<Cursor>,
    nodes: HashSet<Identifier>,
    edges: HashSet<Identifier>,
}

/// Applies replication streams from any number of origins to a local graph.
///
/// Mutations go through the regular graph API, so the replica graph's own
/// listeners (a peering resolver over the global graph, for instance) see
/// remote changes like local ones.
pub struct Replica {
    graph: Graph,
    origins: HashMap<String, OriginState>,
    last_session: SessionId,
}

impl Replica {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            origins: HashMap::new(),
            last_session: 0,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Revision the next live event from `origin` must carry, if a session
    /// is open.
    pub fn expected_revision(&self, origin: &str) -> Option<Revision> {
        self.origins
            .get(origin)
            .and_then(|state| state.cursor)
            .map(|cursor| cursor.last + 1)
    }

    /// Session opened by the latest reset of `origin`, while it is open.
    pub fn session(&self, origin: &str) -> Option<SessionId> {
        self.origins
            .get(origin)
            .filter(|state| state.cursor.is_some())
            .map(|state| state.session)
    }

    /// Origins this replica has state for.
    pub fn origins(&self) -> Vec<String> {
        self.origins.keys().cloned().collect()
    }

    /// Apply one message.
    ///
    /// A `RevisionGap` error means the origin must resync; until its next
    /// reset, further events from it are rejected too.
    pub fn apply(&mut self, message: &SyncMessage) -> Result<()> {
        match message {
            SyncMessage::Reset {
                origin,
                revision,
                root,
            } => {
                self.reset(origin, *revision, root);
                Ok(())
            }
            SyncMessage::Event {
                origin,
                revision,
                event,
            } => self.apply_event(origin, *revision, event),
            SyncMessage::ResyncRequest { origin, .. } => {
                tracing::debug!("[Replica] Ignoring resync request for {}", origin);
                Ok(())
            }
        }
    }

    /// Close `session` of `origin`; its next message must be a reset.
    /// The replicated entities stay until then.
    ///
    /// Does nothing if the origin has reset since, so a stale connection
    /// going away cannot close the session of its successor. Returns
    /// whether the session was closed.
    pub fn end_session(&mut self, origin: &str, session: SessionId) -> bool {
        let Some(state) = self.origins.get_mut(origin) else {
            return false;
        };
        if state.session != session {
            tracing::debug!(
                "[Replica] Session {} of {} already superseded by {}",
                session,
                origin,
                state.session
            );
            return false;
        }
        state.cursor.take().is_some()
    }

    fn reset(&mut self, origin: &str, revision: Revision, root: &Identifier) {
        let state = self.origins.entry(origin.to_string()).or_default();

        let mut removed = 0;
        let roots = [Some(root.clone()), state.root.take()];
        for root in roots.iter().flatten() {
            if self.graph.has_node(root) {
                match self.graph.del_subgraph(root) {
                    Ok(count) => removed += count,
                    Err(e) => tracing::warn!("[Replica] Failed to clear {}: {}", root, e),
                }
            }
        }
        // Entities of this origin not reachable from its root
        for id in state.nodes.drain() {
            if !self.graph.has_node(&id) {
                continue;
            }
            match self.graph.del_node(&id) {
                Ok(_) => removed += 1,
                Err(e) => tracing::warn!("[Replica] Failed to remove node {}: {}", id, e),
            }
        }
        for id in state.edges.drain() {
            if self.graph.edge(&id).is_none() {
                continue;
            }
            if let Err(e) = self.graph.del_edge(&id) {
                tracing::warn!("[Replica] Failed to remove edge {}: {}", id, e);
            }
        }

        self.last_session += 1;
        state.session = self.last_session;
        state.root = Some(root.clone());
        state.cursor = Some(Cursor {
            last: revision,
            in_snapshot: true,
        });
        tracing::info!(
            "[Replica] Reset from {} at revision {}, session {} ({} stale nodes removed)",
            origin,
            revision,
            state.session,
            removed
        );
    }

    fn apply_event(&mut self, origin: &str, revision: Revision, event: &GraphEvent) -> Result<()> {
        let state = self.origins.entry(origin.to_string()).or_default();
        let Some(cursor) = state.cursor else {
            return Err(GraphError::RevisionGap {
                origin: origin.to_string(),
                expected: 0,
                received: revision,
            });
        };

        let next = if cursor.in_snapshot && revision == cursor.last {
            cursor
        } else if revision == cursor.last + 1 {
            Cursor {
                last: revision,
                in_snapshot: false,
            }
        } else {
            state.cursor = None;
            return Err(GraphError::RevisionGap {
                origin: origin.to_string(),
                expected: cursor.last + 1,
                received: revision,
            });
        };

        if let Err(e) = apply_to_graph(&self.graph, event) {
            // Diverged; only a reset can repair it
            state.cursor = None;
            return Err(e);
        }
        state.cursor = Some(next);

        match event {
            GraphEvent::NodeAdded(node) | GraphEvent::NodeUpdated(node) => {
                state.nodes.insert(node.id.clone());
            }
            GraphEvent::NodeDeleted(node) => {
                state.nodes.remove(&node.id);
            }
            GraphEvent::EdgeAdded(edge) | GraphEvent::EdgeUpdated(edge) => {
                state.edges.insert(edge.id.clone());
            }
            GraphEvent::EdgeDeleted(edge) => {
                state.edges.remove(&edge.id);
            }
        }
        Ok(())
    }
}

/// Apply an event idempotently: adding an existing entity updates it,
/// deleting a missing one does nothing.
fn apply_to_graph(graph: &Graph, event: &GraphEvent) -> Result<()> {
    match event {
        GraphEvent::NodeAdded(node) | GraphEvent::NodeUpdated(node) => upsert_node(graph, node),
        GraphEvent::NodeDeleted(node) => {
            if graph.has_node(&node.id) {
                graph.del_node(&node.id)?;
            }
            Ok(())
        }
        GraphEvent::EdgeAdded(edge) | GraphEvent::EdgeUpdated(edge) => upsert_edge(graph, edge),
        GraphEvent::EdgeDeleted(edge) => {
            if graph.edge(&edge.id).is_some() {
                graph.del_edge(&edge.id)?;
            }
            Ok(())
        }
    }
}

fn upsert_node(graph: &Graph, node: &Node) -> Result<()> {
    if graph.has_node(&node.id) {
        graph.update_metadata(&node.id, node.metadata.clone())?;
    } else {
        graph.new_node(node.id.clone(), node.metadata.clone())?;
    }
    Ok(())
}

fn upsert_edge(graph: &Graph, edge: &Edge) -> Result<()> {
    if graph.edge(&edge.id).is_some() {
        graph.update_edge_metadata(&edge.id, edge.metadata.clone())?;
    } else {
        graph.new_edge_with_id(
            edge.id.clone(),
            &edge.parent,
            &edge.child,
            edge.metadata.clone(),
        )?;
    }
    Ok(())
}
