// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{Bfs, EdgeFiltered, EdgeRef};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{GraphError, Result};

use super::edge::relation_types;
use super::{Edge, GraphEvent, GraphListener, Identifier, ListenerHandle, Metadata, Node, Revision};

type SharedListener = Arc<Mutex<dyn GraphListener>>;

struct ListenerEntry {
    handle: ListenerHandle,
    listener: Weak<Mutex<dyn GraphListener>>,
}

/// Consistent copy of the whole graph at one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub revision: Revision,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Everything behind the store lock.
struct GraphState {
    topology: StableDiGraph<Node, Edge>,
    node_index: HashMap<Identifier, NodeIndex>,
    edge_index: HashMap<Identifier, EdgeIndex>,
    revision: Revision,
    listeners: Vec<ListenerEntry>,
    next_listener_id: u64,
    /// Committed events not yet delivered to listeners.
    pending: VecDeque<(Revision, GraphEvent)>,
    dispatching: bool,
}

struct GraphInner {
    host_id: String,
    state: ReentrantMutex<RefCell<GraphState>>,
}

/// Attributed topology graph shared by every probe on a host.
///
/// `Graph` is a cheap handle; clones share the same store. All reads and
/// writes go through one re-entrant lock, so concurrent producers are
/// serialized and every accepted mutation gets the next revision.
///
/// Listeners run synchronously on the mutating thread while the lock is
/// held. A listener may call back into the graph: reads see the current
/// state, and mutations are committed immediately, but their events are
/// queued behind the event being delivered. The outermost mutating call
/// drains the queue before returning, so every listener observes events
/// in exactly revision order.
#[derive(Clone)]
pub struct Graph {
    inner: Arc<GraphInner>,
}

impl Graph {
    /// Create an empty graph owned by `host_id`.
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(GraphInner {
                host_id: host_id.into(),
                state: ReentrantMutex::new(RefCell::new(GraphState::new())),
            }),
        }
    }

    /// Identity of the host this graph originates from.
    pub fn host_id(&self) -> &str {
        &self.inner.host_id
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Register a listener. Listeners are called in registration order.
    ///
    /// The graph keeps only a weak reference: dropping every strong
    /// reference unregisters the listener on the next dispatch.
    pub fn add_listener(&self, listener: SharedListener) -> ListenerHandle {
        self.modify(|state| {
            let handle = ListenerHandle(state.next_listener_id);
            state.next_listener_id += 1;
            state.listeners.push(ListenerEntry {
                handle,
                listener: Arc::downgrade(&listener),
            });
            handle
        })
    }

    /// Unregister a listener. Returns false if the handle was unknown.
    ///
    /// Takes effect from the next event; an event already being delivered
    /// still reaches the remaining listeners of its snapshot.
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.modify(|state| {
            let before = state.listeners.len();
            state.listeners.retain(|entry| entry.handle != handle);
            state.listeners.len() != before
        })
    }

    pub fn listener_count(&self) -> usize {
        self.read(|state| {
            state
                .listeners
                .iter()
                .filter(|entry| entry.listener.strong_count() > 0)
                .count()
        })
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Insert a new node. Emits `NodeAdded`.
    pub fn new_node(&self, id: impl Into<Identifier>, metadata: Metadata) -> Result<Node> {
        let id = id.into();
        self.write(|state| {
            if state.node_index.contains_key(&id) {
                return Err(GraphError::DuplicateId(id));
            }
            let node = Node::new(id.clone(), metadata);
            let idx = state.topology.add_node(node.clone());
            state.node_index.insert(id, idx);
            state.emit(GraphEvent::NodeAdded(node.clone()));
            Ok(node)
        })
    }

    /// Set one metadata field. Emits `NodeUpdated` unless the value is unchanged.
    pub fn set_field(
        &self,
        id: &Identifier,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Node> {
        let key = key.into();
        let value = value.into();
        self.update_node_with(id, |metadata| {
            if metadata.get(&key) == Some(&value) {
                return false;
            }
            metadata.insert(key, value);
            true
        })
    }

    /// Remove one metadata field. Emits `NodeUpdated` if the field existed.
    pub fn del_field(&self, id: &Identifier, key: &str) -> Result<Node> {
        self.update_node_with(id, |metadata| metadata.remove(key).is_some())
    }

    /// Replace the whole metadata of a node. Emits `NodeUpdated` unless equal.
    pub fn update_metadata(&self, id: &Identifier, metadata: Metadata) -> Result<Node> {
        self.update_node_with(id, |current| {
            if *current == metadata {
                return false;
            }
            *current = metadata;
            true
        })
    }

    fn update_node_with(
        &self,
        id: &Identifier,
        apply: impl FnOnce(&mut Metadata) -> bool,
    ) -> Result<Node> {
        self.write(|state| {
            let idx = state.node_idx(id)?;
            let node = &mut state.topology[idx];
            let changed = apply(&mut node.metadata);
            let node = node.clone();
            if changed {
                state.emit(GraphEvent::NodeUpdated(node.clone()));
            }
            Ok(node)
        })
    }

    /// Remove a node and its incident edges.
    ///
    /// Emits `NodeDeleted`, then `EdgeDeleted` for each removed edge.
    pub fn del_node(&self, id: &Identifier) -> Result<Node> {
        self.write(|state| {
            let idx = state.node_idx(id)?;
            let (node, edges) = state.remove_node_at(idx);
            state.emit(GraphEvent::NodeDeleted(node.clone()));
            for edge in edges {
                state.emit(GraphEvent::EdgeDeleted(edge));
            }
            Ok(node)
        })
    }

    /// Remove `root` and every node reachable from it through ownership
    /// edges, as one batch. Returns the number of removed nodes.
    ///
    /// Nodes are removed in breadth-first order from the root; each removal
    /// emits `NodeDeleted` followed by the `EdgeDeleted` of its remaining
    /// incident edges.
    pub fn del_subgraph(&self, root: &Identifier) -> Result<usize> {
        self.write(|state| {
            let root_idx = state.node_idx(root)?;
            let doomed = state.owned_subgraph(root_idx);
            for &idx in &doomed {
                let (node, edges) = state.remove_node_at(idx);
                state.emit(GraphEvent::NodeDeleted(node));
                for edge in edges {
                    state.emit(GraphEvent::EdgeDeleted(edge));
                }
            }
            tracing::debug!("[Graph] Deleted subgraph of {} ({} nodes)", root, doomed.len());
            Ok(doomed.len())
        })
    }

    pub fn node(&self, id: &Identifier) -> Option<Node> {
        self.read(|state| {
            state
                .node_index
                .get(id)
                .map(|&idx| state.topology[idx].clone())
        })
    }

    pub fn has_node(&self, id: &Identifier) -> bool {
        self.read(|state| state.node_index.contains_key(id))
    }

    /// All nodes whose metadata matches `filter` exactly on every key.
    pub fn get_nodes(&self, filter: &Metadata) -> Vec<Node> {
        self.read(|state| {
            state
                .topology
                .node_indices()
                .map(|idx| &state.topology[idx])
                .filter(|node| node.matches(filter))
                .cloned()
                .collect()
        })
    }

    /// Children of `parent` reached through edges matching `edge_filter`.
    pub fn children(&self, parent: &Identifier, edge_filter: &Metadata) -> Vec<Node> {
        self.read(|state| {
            let Some(&idx) = state.node_index.get(parent) else {
                return Vec::new();
            };
            state
                .topology
                .edges_directed(idx, Direction::Outgoing)
                .filter(|e| e.weight().matches(edge_filter))
                .map(|e| state.topology[e.target()].clone())
                .collect()
        })
    }

    pub fn node_count(&self) -> usize {
        self.read(|state| state.topology.node_count())
    }

    // =========================================================================
    // Edges
    // =========================================================================

    /// Insert an edge whose identifier is derived from
    /// `(parent, child, RelationType)`. Emits `EdgeAdded`.
    pub fn new_edge(
        &self,
        parent: &Identifier,
        child: &Identifier,
        metadata: Metadata,
    ) -> Result<Edge> {
        let id = Edge::derive_id(parent, child, &metadata);
        self.new_edge_with_id(id, parent, child, metadata)
    }

    /// Insert an edge with an explicit identifier. Emits `EdgeAdded`.
    pub fn new_edge_with_id(
        &self,
        id: impl Into<Identifier>,
        parent: &Identifier,
        child: &Identifier,
        metadata: Metadata,
    ) -> Result<Edge> {
        let id = id.into();
        self.write(|state| {
            if state.edge_index.contains_key(&id) {
                return Err(GraphError::DuplicateId(id));
            }
            let parent_idx = state
                .node_index
                .get(parent)
                .copied()
                .ok_or_else(|| GraphError::UnknownEndpoint(parent.clone()))?;
            let child_idx = state
                .node_index
                .get(child)
                .copied()
                .ok_or_else(|| GraphError::UnknownEndpoint(child.clone()))?;

            let edge = Edge::new(id.clone(), parent.clone(), child.clone(), metadata);
            let idx = state.topology.add_edge(parent_idx, child_idx, edge.clone());
            state.edge_index.insert(id, idx);
            state.emit(GraphEvent::EdgeAdded(edge.clone()));
            Ok(edge)
        })
    }

    /// Replace the metadata of an edge. Emits `EdgeUpdated` unless equal.
    pub fn update_edge_metadata(&self, id: &Identifier, metadata: Metadata) -> Result<Edge> {
        self.write(|state| {
            let idx = state.edge_idx(id)?;
            let edge = &mut state.topology[idx];
            if edge.metadata == metadata {
                return Ok(edge.clone());
            }
            edge.metadata = metadata;
            let edge = edge.clone();
            state.emit(GraphEvent::EdgeUpdated(edge.clone()));
            Ok(edge)
        })
    }

    /// Remove an edge. Emits `EdgeDeleted`.
    pub fn del_edge(&self, id: &Identifier) -> Result<Edge> {
        self.write(|state| {
            let idx = state.edge_idx(id)?;
            let edge = state
                .topology
                .remove_edge(idx)
                .ok_or_else(|| GraphError::EdgeNotFound(id.clone()))?;
            state.edge_index.remove(id);
            state.emit(GraphEvent::EdgeDeleted(edge.clone()));
            Ok(edge)
        })
    }

    pub fn edge(&self, id: &Identifier) -> Option<Edge> {
        self.read(|state| {
            state
                .edge_index
                .get(id)
                .map(|&idx| state.topology[idx].clone())
        })
    }

    /// All edges whose metadata matches `filter`.
    pub fn get_edges(&self, filter: &Metadata) -> Vec<Edge> {
        self.read(|state| {
            state
                .topology
                .edge_indices()
                .map(|idx| &state.topology[idx])
                .filter(|edge| edge.matches(filter))
                .cloned()
                .collect()
        })
    }

    /// Edges joining `a` and `b` in either direction.
    pub fn edges_between(&self, a: &Identifier, b: &Identifier) -> Vec<Edge> {
        self.read(|state| {
            let (Some(&ia), Some(&ib)) = (state.node_index.get(a), state.node_index.get(b)) else {
                return Vec::new();
            };
            let mut edges: Vec<Edge> = state
                .topology
                .edges_connecting(ia, ib)
                .map(|e| e.weight().clone())
                .collect();
            if ia != ib {
                edges.extend(
                    state
                        .topology
                        .edges_connecting(ib, ia)
                        .map(|e| e.weight().clone()),
                );
            }
            edges
        })
    }

    pub fn edge_count(&self) -> usize {
        self.read(|state| state.topology.edge_count())
    }

    // =========================================================================
    // Whole-graph views
    // =========================================================================

    /// Revision of the last accepted event.
    pub fn revision(&self) -> Revision {
        self.read(|state| state.revision)
    }

    /// Copy of every node and edge, consistent with [`Snapshot::revision`].
    pub fn snapshot(&self) -> Snapshot {
        self.read(|state| Snapshot {
            revision: state.revision,
            nodes: state
                .topology
                .node_indices()
                .map(|idx| state.topology[idx].clone())
                .collect(),
            edges: state
                .topology
                .edge_indices()
                .map(|idx| state.topology[idx].clone())
                .collect(),
        })
    }

    // =========================================================================
    // Locking and dispatch
    // =========================================================================

    fn read<T>(&self, f: impl FnOnce(&GraphState) -> T) -> T {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        f(&state)
    }

    /// Mutate bookkeeping that never produces events.
    fn modify<T>(&self, f: impl FnOnce(&mut GraphState) -> T) -> T {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    fn write<T>(&self, f: impl FnOnce(&mut GraphState) -> Result<T>) -> Result<T> {
        let guard = self.inner.state.lock();
        let result = {
            let mut state = guard.borrow_mut();
            f(&mut state)
        };
        Self::dispatch_pending(&guard);
        result
    }

    /// Deliver queued events to listeners, unless an outer frame on this
    /// thread is already doing so.
    fn dispatch_pending(guard: &ReentrantMutexGuard<'_, RefCell<GraphState>>) {
        {
            let mut state = guard.borrow_mut();
            if state.dispatching || state.pending.is_empty() {
                return;
            }
            state.dispatching = true;
        }

        loop {
            let next = {
                let mut state = guard.borrow_mut();
                let event = state.pending.pop_front();
                event.map(|event| (event, state.live_listeners()))
            };
            let Some(((revision, event), listeners)) = next else {
                break;
            };

            for (handle, listener) in listeners {
                deliver(handle, &listener, revision, &event);
            }
        }

        guard.borrow_mut().dispatching = false;
    }
}

/// Invoke one listener, containing its failures. The mutation is already
/// committed; a failing listener only affects its own derived state.
fn deliver(handle: ListenerHandle, listener: &SharedListener, revision: Revision, event: &GraphEvent) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        listener.lock().on_graph_event(revision, event)
    }));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(
            "[Graph] Listener {:?} failed on revision {} ({:?} {}): {}",
            handle,
            revision,
            event.kind(),
            event.entity_id(),
            e
        ),
        Err(_) => tracing::error!(
            "[Graph] Listener {:?} panicked on revision {} ({:?} {})",
            handle,
            revision,
            event.kind(),
            event.entity_id()
        ),
    }
}

impl GraphState {
    fn new() -> Self {
        Self {
            topology: StableDiGraph::new(),
            node_index: HashMap::new(),
            edge_index: HashMap::new(),
            revision: 0,
            listeners: Vec::new(),
            next_listener_id: 0,
            pending: VecDeque::new(),
            dispatching: false,
        }
    }

    fn emit(&mut self, event: GraphEvent) {
        self.revision += 1;
        tracing::debug!(
            "[Graph] r{} {:?} {:?} {}",
            self.revision,
            event.kind(),
            event.entity_kind(),
            event.entity_id()
        );
        self.pending.push_back((self.revision, event));
    }

    fn live_listeners(&mut self) -> Vec<(ListenerHandle, SharedListener)> {
        self.listeners
            .retain(|entry| entry.listener.strong_count() > 0);
        self.listeners
            .iter()
            .filter_map(|entry| entry.listener.upgrade().map(|l| (entry.handle, l)))
            .collect()
    }

    fn node_idx(&self, id: &Identifier) -> Result<NodeIndex> {
        self.node_index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    fn edge_idx(&self, id: &Identifier) -> Result<EdgeIndex> {
        self.edge_index
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::EdgeNotFound(id.clone()))
    }

    /// Nodes reachable from `root` over ownership edges, root first.
    fn owned_subgraph(&self, root: NodeIndex) -> Vec<NodeIndex> {
        let owned = EdgeFiltered::from_fn(&self.topology, |e| {
            e.weight().relation_type() == Some(relation_types::OWNERSHIP)
        });
        let mut bfs = Bfs::new(&owned, root);
        let mut order = Vec::new();
        while let Some(idx) = bfs.next(&owned) {
            order.push(idx);
        }
        order
    }

    /// Remove a node and its incident edges from the store.
    fn remove_node_at(&mut self, idx: NodeIndex) -> (Node, Vec<Edge>) {
        let mut incident: Vec<EdgeIndex> = self
            .topology
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.topology.edges_directed(idx, Direction::Incoming))
            .map(|e| e.id())
            .collect();
        incident.sort();
        incident.dedup();

        let mut edges = Vec::with_capacity(incident.len());
        for edge_idx in incident {
            if let Some(edge) = self.topology.remove_edge(edge_idx) {
                self.edge_index.remove(&edge.id);
                edges.push(edge);
            }
        }

        let node = self.topology[idx].clone();
        self.topology.remove_node(idx);
        self.node_index.remove(&node.id);
        (node, edges)
    }
}
