// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Topology conventions layered on the generic graph: well-known metadata
//! keys, the host root node, and ownership / layer-2 link helpers.

use crate::core::error::Result;
use crate::core::graph::{relation_types, Edge, Graph, Identifier, Metadata, Node, RELATION_TYPE};

/// Node metadata keys shared by probes and resolvers.
pub mod keys {
    pub const NAME: &str = "Name";
    pub const TYPE: &str = "Type";
    pub const MAC: &str = "MAC";
    /// MAC address of the interface a node expects to be peered with.
    pub const PEER_INTF_MAC: &str = "PeerIntfMAC";
}

/// `Type` value of a host root node.
pub const HOST_TYPE: &str = "host";

fn relation(relation_type: &str, extra: Option<&Metadata>) -> Metadata {
    let mut metadata = extra.cloned().unwrap_or_default();
    metadata.insert(RELATION_TYPE, relation_type);
    metadata
}

/// Create the root node representing host `host`.
///
/// Its identifier is the host identity, so every session of the same host
/// reuses it.
pub fn new_root_node(graph: &Graph, host: &str) -> Result<Node> {
    graph.new_node(
        host,
        Metadata::new()
            .with(keys::NAME, host)
            .with(keys::TYPE, HOST_TYPE),
    )
}

/// Link `parent` to `child` with an ownership edge.
pub fn add_ownership_link(
    graph: &Graph,
    parent: &Identifier,
    child: &Identifier,
    extra: Option<&Metadata>,
) -> Result<Edge> {
    graph.new_edge(parent, child, relation(relation_types::OWNERSHIP, extra))
}

/// True if a layer-2 edge joins `a` and `b` in either direction and its
/// metadata matches `filter`.
pub fn have_layer2_link(
    graph: &Graph,
    a: &Identifier,
    b: &Identifier,
    filter: Option<&Metadata>,
) -> bool {
    let filter = relation(relation_types::LAYER2, filter);
    graph
        .edges_between(a, b)
        .iter()
        .any(|edge| edge.matches(&filter))
}

/// Identifier of the layer-2 edge between `a` and `b`.
///
/// Layer-2 adjacency has no direction, so the endpoints are ordered before
/// deriving the identifier: whichever side infers the link first, every
/// graph agrees on its identity.
pub fn layer2_link_id(a: &Identifier, b: &Identifier) -> Identifier {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    Identifier::derive(&[low.as_str(), high.as_str(), relation_types::LAYER2])
}

/// Create a layer-2 edge from `a` to `b`.
pub fn add_layer2_link(
    graph: &Graph,
    a: &Identifier,
    b: &Identifier,
    extra: Option<&Metadata>,
) -> Result<Edge> {
    graph.new_edge_with_id(
        layer2_link_id(a, b),
        a,
        b,
        relation(relation_types::LAYER2, extra),
    )
}

/// Create a layer-2 edge between `a` and `b` unless one already exists.
///
/// A pair has at most one layer-2 link, whatever its extra metadata:
/// `extra` only applies when the link is created. Returns the new edge, or
/// `None` if the pair was already linked.
pub fn ensure_layer2_link(
    graph: &Graph,
    a: &Identifier,
    b: &Identifier,
    extra: Option<&Metadata>,
) -> Result<Option<Edge>> {
    if have_layer2_link(graph, a, b, None) {
        return Ok(None);
    }
    add_layer2_link(graph, a, b, extra).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interfaces(graph: &Graph) -> (Identifier, Identifier) {
        let a = graph.new_node("veth0", Metadata::new()).unwrap();
        let b = graph.new_node("veth1", Metadata::new()).unwrap();
        (a.id, b.id)
    }

    #[test]
    fn test_root_node() {
        let graph = Graph::new("host-1");
        let root = new_root_node(&graph, "host-1").unwrap();
        assert_eq!(root.id, "host-1");
        assert_eq!(root.get_field_string(keys::NAME), Some("host-1"));
        assert_eq!(root.get_field_string(keys::TYPE), Some(HOST_TYPE));
    }

    #[test]
    fn test_layer2_link_seen_from_both_sides() {
        let graph = Graph::new("host");
        let (a, b) = interfaces(&graph);

        assert!(!have_layer2_link(&graph, &a, &b, None));
        add_layer2_link(&graph, &a, &b, None).unwrap();
        assert!(have_layer2_link(&graph, &a, &b, None));
        assert!(have_layer2_link(&graph, &b, &a, None));
    }

    #[test]
    fn test_ownership_is_not_layer2() {
        let graph = Graph::new("host");
        let (a, b) = interfaces(&graph);

        add_ownership_link(&graph, &a, &b, None).unwrap();
        assert!(!have_layer2_link(&graph, &a, &b, None));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_ensure_layer2_link_is_idempotent() {
        let graph = Graph::new("host");
        let (a, b) = interfaces(&graph);

        assert!(ensure_layer2_link(&graph, &a, &b, None).unwrap().is_some());
        assert!(ensure_layer2_link(&graph, &a, &b, None).unwrap().is_none());
        assert!(ensure_layer2_link(&graph, &b, &a, None).unwrap().is_none());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_layer2_id_ignores_direction() {
        let a = Identifier::from("a");
        let b = Identifier::from("b");
        assert_eq!(layer2_link_id(&a, &b), layer2_link_id(&b, &a));
    }

    #[test]
    fn test_filter_on_extra_metadata() {
        let graph = Graph::new("host");
        let (a, b) = interfaces(&graph);
        let extra = Metadata::new().with("Probe", "peering");

        add_layer2_link(&graph, &a, &b, Some(&extra)).unwrap();
        assert!(have_layer2_link(&graph, &a, &b, Some(&extra)));
        assert!(!have_layer2_link(
            &graph,
            &a,
            &b,
            Some(&Metadata::new().with("Probe", "netlink"))
        ));
    }

    #[test]
    fn test_ensure_keeps_the_first_link_metadata() {
        let graph = Graph::new("host");
        let (a, b) = interfaces(&graph);
        let netlink = Metadata::new().with("Probe", "netlink");
        let peering = Metadata::new().with("Probe", "peering");

        add_layer2_link(&graph, &a, &b, Some(&netlink)).unwrap();
        assert!(ensure_layer2_link(&graph, &a, &b, Some(&peering))
            .unwrap()
            .is_none());
        assert!(ensure_layer2_link(&graph, &b, &a, Some(&peering))
            .unwrap()
            .is_none());

        assert_eq!(graph.edge_count(), 1);
        assert!(have_layer2_link(&graph, &a, &b, Some(&netlink)));
    }
}
