// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! MAC-based layer-2 peering.
//!
//! Interfaces that know the MAC of the interface on the other end of their
//! link (veth pairs, patch ports, ...) publish it as `PeerIntfMAC`. The
//! resolver links them to whichever node carries that `MAC`, whether the
//! peer is already in the graph or shows up later.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::error::Result;
use crate::core::graph::{Graph, GraphListener, Identifier, ListenerHandle, Metadata, Node};
use crate::core::topology::{self, keys};

use super::Probe;

/// What the resolver did for one node event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeeringOutcome {
    /// The node's own MAC completed a pending pairing with `peer`.
    Paired { peer: Identifier, linked: bool },
    /// The node's declared peer MAC matched exactly one node. The node is
    /// also registered as pending under that MAC.
    Matched { peer: Identifier, linked: bool },
    /// No node carries the declared peer MAC yet; the node waits for it.
    Registered,
    /// Several nodes carry the declared peer MAC; nothing changed.
    Ambiguous { candidates: usize },
    /// The node carries neither a pending MAC nor a peer MAC.
    Ignored,
}

/// Listener maintaining the pending-peer index and inferring layer-2 links.
pub struct PeeringResolver {
    graph: Graph,
    /// MAC -> node waiting to be peered under it.
    peers: HashMap<String, Identifier>,
}

impl PeeringResolver {
    pub fn new(graph: Graph) -> Self {
        Self {
            graph,
            peers: HashMap::new(),
        }
    }

    pub fn pending_peer(&self, mac: &str) -> Option<&Identifier> {
        self.peers.get(mac)
    }

    pub fn pending_count(&self) -> usize {
        self.peers.len()
    }

    /// Handle a node that appeared or changed.
    pub fn resolve(&mut self, node: &Node) -> Result<PeeringOutcome> {
        if let Some(mac) = node.get_field_string(keys::MAC) {
            if let Some(peer) = self.peers.get(mac).cloned() {
                let linked = self.link(&peer, &node.id)?;
                return Ok(PeeringOutcome::Paired { peer, linked });
            }
        }

        let Some(peer_mac) = node.get_field_string(keys::PEER_INTF_MAC) else {
            return Ok(PeeringOutcome::Ignored);
        };

        let candidates = self
            .graph
            .get_nodes(&Metadata::new().with(keys::MAC, peer_mac));
        match candidates.as_slice() {
            [peer] => {
                let linked = self.link(&node.id, &peer.id)?;
                self.peers.insert(peer_mac.to_string(), node.id.clone());
                Ok(PeeringOutcome::Matched {
                    peer: peer.id.clone(),
                    linked,
                })
            }
            [] => {
                tracing::debug!("[Peering] {} waiting for peer MAC {}", node.id, peer_mac);
                self.peers.insert(peer_mac.to_string(), node.id.clone());
                Ok(PeeringOutcome::Registered)
            }
            many => {
                tracing::error!(
                    "[Peering] Multiple peer MAC found: {} ({} nodes, wanted by {})",
                    peer_mac,
                    many.len(),
                    node.id
                );
                Ok(PeeringOutcome::Ambiguous {
                    candidates: many.len(),
                })
            }
        }
    }

    /// Drop every pending entry held by a deleted node.
    pub fn forget(&mut self, id: &Identifier) -> usize {
        let before = self.peers.len();
        self.peers.retain(|_, pending| pending != id);
        before - self.peers.len()
    }

    fn link(&self, a: &Identifier, b: &Identifier) -> Result<bool> {
        if a == b {
            return Ok(false);
        }
        let created = topology::ensure_layer2_link(&self.graph, a, b, None)?;
        if let Some(edge) = &created {
            tracing::debug!("[Peering] Linked {} <-> {} ({})", a, b, edge.id);
        }
        Ok(created.is_some())
    }
}

impl GraphListener for PeeringResolver {
    fn on_node_added(&mut self, node: &Node) -> Result<()> {
        self.resolve(node).map(|_| ())
    }

    fn on_node_updated(&mut self, node: &Node) -> Result<()> {
        self.resolve(node).map(|_| ())
    }

    fn on_node_deleted(&mut self, node: &Node) -> Result<()> {
        self.forget(&node.id);
        Ok(())
    }
}

/// Probe owning a [`PeeringResolver`] registered on a graph.
///
/// The resolver is registered on construction so that it sees every node
/// event from then on; `stop` unregisters it.
pub struct PeeringProbe {
    graph: Graph,
    resolver: Arc<Mutex<PeeringResolver>>,
    handle: Option<ListenerHandle>,
}

impl PeeringProbe {
    pub fn new(graph: Graph) -> Self {
        let resolver = Arc::new(Mutex::new(PeeringResolver::new(graph.clone())));
        let handle = graph.add_listener(resolver.clone());
        Self {
            graph,
            resolver,
            handle: Some(handle),
        }
    }

    /// Node currently pending under `mac`, if any.
    pub fn pending_peer(&self, mac: &str) -> Option<Identifier> {
        self.resolver.lock().pending_peer(mac).cloned()
    }

    pub fn is_registered(&self) -> bool {
        self.handle.is_some()
    }
}

impl Probe for PeeringProbe {
    fn name(&self) -> &str {
        "peering"
    }

    fn start(&mut self) -> Result<()> {
        tracing::info!("[Peering] Started on graph {}", self.graph.host_id());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            self.graph.remove_listener(handle);
            tracing::info!(
                "[Peering] Stopped ({} peers pending)",
                self.resolver.lock().pending_count()
            );
        }
        Ok(())
    }
}
