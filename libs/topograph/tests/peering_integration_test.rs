// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Peering probe driven by real graph events, locally and on a replica.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use topograph::core::sync::{memory_transport, serve_connection};
use topograph::topology::{self, have_layer2_link, keys};
use topograph::{
    relation_types, Forwarder, ForwarderOptions, Graph, Identifier, Metadata, Node, PeeringProbe,
    Probe, Replica, RELATION_TYPE,
};

fn with_mac(graph: &Graph, id: &str, mac: &str) -> Node {
    graph
        .new_node(id, Metadata::new().with(keys::TYPE, "veth").with(keys::MAC, mac))
        .unwrap()
}

fn wanting(graph: &Graph, id: &str, peer_mac: &str) -> Node {
    graph
        .new_node(
            id,
            Metadata::new()
                .with(keys::TYPE, "veth")
                .with(keys::PEER_INTF_MAC, peer_mac),
        )
        .unwrap()
}

fn layer2_links(graph: &Graph) -> usize {
    graph
        .get_edges(&Metadata::new().with(RELATION_TYPE, relation_types::LAYER2))
        .len()
}

#[test]
fn test_peer_present_before_declaration() {
    let graph = Graph::new("h1");
    let probe = PeeringProbe::new(graph.clone());

    let a = with_mac(&graph, "A", "m1");
    let b = wanting(&graph, "B", "m1");

    assert!(have_layer2_link(&graph, &a.id, &b.id, None));
    // Linked and pending at the same time
    assert_eq!(probe.pending_peer("m1"), Some(b.id));
}

#[test]
fn test_peer_appears_after_declaration() {
    let graph = Graph::new("h1");
    let probe = PeeringProbe::new(graph.clone());

    let b = wanting(&graph, "B", "m1");
    assert_eq!(layer2_links(&graph), 0);
    assert_eq!(probe.pending_peer("m1"), Some(b.id.clone()));

    let a = with_mac(&graph, "A", "m1");
    assert!(have_layer2_link(&graph, &a.id, &b.id, None));

    with_mac(&graph, "C", "m2");
    assert_eq!(layer2_links(&graph), 1);
    assert_eq!(probe.pending_peer("m1"), Some(b.id));
}

#[test]
fn test_declaration_resolved_by_update() {
    let graph = Graph::new("h1");
    let _probe = PeeringProbe::new(graph.clone());

    let b = wanting(&graph, "B", "m1");
    let a = graph.new_node("A", Metadata::new()).unwrap();
    assert_eq!(layer2_links(&graph), 0);

    // The MAC shows up later, e.g. once the interface is fully configured
    graph.set_field(&a.id, keys::MAC, "m1").unwrap();
    assert!(have_layer2_link(&graph, &a.id, &b.id, None));

    // Further updates keep the single link
    graph.set_field(&a.id, "MTU", 1500).unwrap();
    graph.set_field(&b.id, "MTU", 1500).unwrap();
    assert_eq!(layer2_links(&graph), 1);
}

#[test]
fn test_ambiguous_mac_creates_nothing() {
    let graph = Graph::new("h1");
    let probe = PeeringProbe::new(graph.clone());

    with_mac(&graph, "A1", "m1");
    with_mac(&graph, "A2", "m1");
    wanting(&graph, "B", "m1");

    assert_eq!(layer2_links(&graph), 0);
    assert!(probe.pending_peer("m1").is_none());
}

#[test]
fn test_deleted_declaration_is_forgotten() {
    let graph = Graph::new("h1");
    let probe = PeeringProbe::new(graph.clone());

    let b = wanting(&graph, "B", "m1");
    graph.del_node(&b.id).unwrap();
    assert!(probe.pending_peer("m1").is_none());

    with_mac(&graph, "A", "m1");
    assert_eq!(layer2_links(&graph), 0);
}

#[test]
fn test_subgraph_delete_clears_pending_peers() {
    let graph = Graph::new("h1");
    let probe = PeeringProbe::new(graph.clone());

    let root = topology::new_root_node(&graph, "h1").unwrap();
    let b = wanting(&graph, "B", "m1");
    topology::add_ownership_link(&graph, &root.id, &b.id, None).unwrap();

    graph.del_subgraph(&root.id).unwrap();
    assert!(probe.pending_peer("m1").is_none());
}

#[test]
fn test_stopped_probe_leaves_graph_alone() {
    let graph = Graph::new("h1");
    let mut probe = PeeringProbe::new(graph.clone());
    probe.stop().unwrap();

    wanting(&graph, "B", "m1");
    with_mac(&graph, "A", "m1");
    assert_eq!(layer2_links(&graph), 0);
}

// =============================================================================
// Replica side
// =============================================================================

async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_analyzer_links_across_hosts() {
    let h1 = Graph::new("h1");
    let h2 = Graph::new("h2");
    with_mac(&h1, "h1-tap0", "m1");
    wanting(&h2, "h2-eth0", "m1");

    let analyzer = Graph::new("analyzer");
    let _analyzer_peering = PeeringProbe::new(analyzer.clone());
    let replica = Arc::new(Mutex::new(Replica::new(analyzer.clone())));

    let mut forwarders = Vec::new();
    for origin in [&h1, &h2] {
        let (connector, mut acceptor) = memory_transport();
        forwarders.push(Forwarder::start(
            origin.clone(),
            connector,
            ForwarderOptions::default(),
        ));
        let (writer, reader) = acceptor.accept().await.unwrap();
        tokio::spawn(serve_connection(replica.clone(), writer, reader));
    }

    let tap = Identifier::from("h1-tap0");
    let eth = Identifier::from("h2-eth0");
    eventually("cross-host link", || have_layer2_link(&analyzer, &tap, &eth, None)).await;

    // Neither origin could see the other host
    assert_eq!(layer2_links(&h1), 0);
    assert_eq!(layer2_links(&h2), 0);
}

#[tokio::test]
async fn test_link_inferred_on_both_sides_is_not_duplicated() {
    let origin = Graph::new("h1");
    let _origin_peering = PeeringProbe::new(origin.clone());
    with_mac(&origin, "veth0", "m1");
    wanting(&origin, "veth1", "m1");
    assert_eq!(layer2_links(&origin), 1);

    let analyzer = Graph::new("analyzer");
    let _analyzer_peering = PeeringProbe::new(analyzer.clone());
    let replica = Arc::new(Mutex::new(Replica::new(analyzer.clone())));

    let (connector, mut acceptor) = memory_transport();
    let mut forwarder = Forwarder::start(origin.clone(), connector, ForwarderOptions::default());
    let (writer, reader) = acceptor.accept().await.unwrap();
    tokio::spawn(serve_connection(replica.clone(), writer, reader));

    // A live event after the snapshot; once it is applied, so is the
    // forwarded copy of the link.
    origin.set_field(&Identifier::from("veth0"), "MTU", 1500).unwrap();
    let last = origin.revision();
    eventually("replica caught up", || {
        replica.lock().expected_revision("h1") == Some(last + 1)
            && analyzer.node_count() == 2
            && layer2_links(&analyzer) > 0
    })
    .await;

    // Both resolvers derived the same edge identity
    assert_eq!(layer2_links(&analyzer), 1);
    let origin_links =
        origin.get_edges(&Metadata::new().with(RELATION_TYPE, relation_types::LAYER2));
    assert!(analyzer.edge(&origin_links[0].id).is_some());

    forwarder.stop().await;
}
