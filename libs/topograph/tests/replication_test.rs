// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Forwarder -> replica replication over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use topograph::core::sync::{
    memory_transport, serve_connection, MemoryAcceptor, MessageReader, MessageWriter,
};
use topograph::topology::{self, keys};
use topograph::{
    Forwarder, ForwarderOptions, Graph, GraphError, Identifier, Metadata, Replica, Snapshot,
    SyncMessage,
};

// =============================================================================
// Helpers
// =============================================================================

fn fast_options() -> ForwarderOptions {
    ForwarderOptions {
        queue_capacity: 1024,
        backoff_initial: Duration::from_millis(10),
        backoff_max: Duration::from_millis(50),
    }
}

async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Nodes and edges sorted by id, revision dropped.
fn content(snapshot: Snapshot) -> (Vec<topograph::Node>, Vec<topograph::Edge>) {
    let mut nodes = snapshot.nodes;
    let mut edges = snapshot.edges;
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    edges.sort_by(|a, b| a.id.cmp(&b.id));
    (nodes, edges)
}

fn same_content(a: &Graph, b: &Graph) -> bool {
    content(a.snapshot()) == content(b.snapshot())
}

async fn serve_next(acceptor: &mut MemoryAcceptor, replica: Arc<Mutex<Replica>>) -> JoinHandle<()> {
    let (writer, reader) = acceptor.accept().await.expect("forwarder connection");
    tokio::spawn(async move {
        let _ = serve_connection(replica, writer, reader).await;
    })
}

fn id(s: &str) -> Identifier {
    Identifier::from(s)
}

fn populate_host(graph: &Graph) {
    topology::new_root_node(graph, graph.host_id()).unwrap();
    let root = id(graph.host_id());
    for (name, mac) in [("eth0", "aa:00"), ("eth1", "aa:01")] {
        let node = graph
            .new_node(
                format!("{}-{}", graph.host_id(), name),
                Metadata::new()
                    .with(keys::NAME, name)
                    .with(keys::TYPE, "device")
                    .with(keys::MAC, mac),
            )
            .unwrap();
        topology::add_ownership_link(graph, &root, &node.id, None).unwrap();
    }
}

// =============================================================================
// Convergence
// =============================================================================

#[tokio::test]
async fn test_replica_converges_to_origin() {
    let origin = Graph::new("h1");
    populate_host(&origin);

    let replica_graph = Graph::new("analyzer");
    let replica = Arc::new(Mutex::new(Replica::new(replica_graph.clone())));
    let (connector, mut acceptor) = memory_transport();

    let mut forwarder = Forwarder::start(origin.clone(), connector, fast_options());
    let _serving = serve_next(&mut acceptor, replica.clone()).await;

    eventually("initial snapshot", || same_content(&origin, &replica_graph)).await;

    // Live mutations of every kind
    let eth0 = id("h1-eth0");
    let eth1 = id("h1-eth1");
    origin.set_field(&eth0, "MTU", 9000).unwrap();
    origin
        .update_metadata(&eth1, Metadata::new().with(keys::NAME, "eth1"))
        .unwrap();
    let link = topology::add_layer2_link(&origin, &eth0, &eth1, None).unwrap();
    origin
        .update_edge_metadata(
            &link.id,
            Metadata::new()
                .with(topograph::RELATION_TYPE, topograph::relation_types::LAYER2)
                .with("Speed", 10_000),
        )
        .unwrap();
    let bridge = origin
        .new_node("h1-br0", Metadata::new().with(keys::TYPE, "bridge"))
        .unwrap();
    topology::add_ownership_link(&origin, &id("h1"), &bridge.id, None).unwrap();
    origin.del_node(&eth1).unwrap();

    eventually("live events", || same_content(&origin, &replica_graph)).await;
    let last = origin.revision();
    eventually("last revision", || {
        replica.lock().expected_revision("h1") == Some(last + 1)
    })
    .await;

    forwarder.stop().await;
}

#[tokio::test]
async fn test_reset_on_reconnect_clears_stale_state() {
    let origin = Graph::new("h1");
    populate_host(&origin);

    let replica_graph = Graph::new("analyzer");
    let replica = Arc::new(Mutex::new(Replica::new(replica_graph.clone())));
    let (connector, mut acceptor) = memory_transport();

    let _forwarder = Forwarder::start(origin.clone(), connector, fast_options());
    let first = serve_next(&mut acceptor, replica.clone()).await;
    eventually("first session", || same_content(&origin, &replica_graph)).await;

    // Drop the connection
    first.abort();

    // Changes the replica cannot see while disconnected
    origin.del_node(&id("h1-eth0")).unwrap();
    let eth2 = origin.new_node("h1-eth2", Metadata::new()).unwrap();
    topology::add_ownership_link(&origin, &id("h1"), &eth2.id, None).unwrap();

    // Leftover on the replica under the origin's root
    replica_graph.new_node("h1-ghost", Metadata::new()).unwrap();
    topology::add_ownership_link(&replica_graph, &id("h1"), &id("h1-ghost"), None).unwrap();
    assert!(replica_graph.has_node(&id("h1-eth0")));

    let _second = serve_next(&mut acceptor, replica.clone()).await;
    eventually("second session", || same_content(&origin, &replica_graph)).await;

    assert!(!replica_graph.has_node(&id("h1-eth0")));
    assert!(!replica_graph.has_node(&id("h1-ghost")));
    assert!(replica_graph.has_node(&id("h1-eth2")));
}

#[tokio::test]
async fn test_other_origins_survive_a_reset() {
    let h1 = Graph::new("h1");
    let h2 = Graph::new("h2");
    populate_host(&h1);
    populate_host(&h2);

    let replica_graph = Graph::new("analyzer");
    let replica = Arc::new(Mutex::new(Replica::new(replica_graph.clone())));
    let (c1, mut a1) = memory_transport();
    let (c2, mut a2) = memory_transport();

    let _f1 = Forwarder::start(h1.clone(), c1, fast_options());
    let _f2 = Forwarder::start(h2.clone(), c2, fast_options());
    let s1 = serve_next(&mut a1, replica.clone()).await;
    let _s2 = serve_next(&mut a2, replica.clone()).await;

    eventually("both hosts", || replica_graph.node_count() == 6).await;

    s1.abort();
    // Only reachable through a new session of h1
    let eth9 = h1.new_node("h1-eth9", Metadata::new()).unwrap();
    topology::add_ownership_link(&h1, &id("h1"), &eth9.id, None).unwrap();

    let _s1 = serve_next(&mut a1, replica.clone()).await;
    eventually("h1 resynced", || replica_graph.has_node(&eth9.id)).await;
    assert_eq!(replica_graph.node_count(), 7);

    for host in ["h1", "h2"] {
        assert!(replica_graph.has_node(&id(host)));
        assert!(replica_graph.has_node(&id(&format!("{}-eth0", host))));
    }
}

// =============================================================================
// Gap detection
// =============================================================================

#[tokio::test]
async fn test_lost_event_triggers_resync() {
    let origin = Graph::new("h1");
    populate_host(&origin);

    let replica = Arc::new(Mutex::new(Replica::new(Graph::new("analyzer"))));
    let (connector, mut acceptor) = memory_transport();
    let _forwarder = Forwarder::start(origin.clone(), connector, fast_options());
    let (mut writer, mut reader) = acceptor.accept().await.unwrap();

    // Reset + 3 nodes + 2 edges
    for _ in 0..6 {
        let message = reader.recv().await.unwrap().unwrap();
        replica.lock().apply(&message).unwrap();
    }

    origin.set_field(&id("h1-eth0"), "MTU", 1500).unwrap();
    origin.set_field(&id("h1-eth1"), "MTU", 1500).unwrap();

    // Lose the first live event
    let lost = reader.recv().await.unwrap().unwrap();
    assert!(matches!(lost, SyncMessage::Event { .. }));
    let next = reader.recv().await.unwrap().unwrap();
    let err = replica.lock().apply(&next).unwrap_err();
    let GraphError::RevisionGap {
        expected, received, ..
    } = &err
    else {
        panic!("expected a revision gap, got {:?}", err);
    };
    assert_eq!(*received, *expected + 1);

    writer
        .send(&SyncMessage::ResyncRequest {
            origin: "h1".into(),
            reason: err.to_string(),
        })
        .await
        .unwrap();

    // Full resync follows
    let reset = reader.recv().await.unwrap().unwrap();
    assert!(matches!(reset, SyncMessage::Reset { revision, .. } if revision == origin.revision()));
    replica.lock().apply(&reset).unwrap();
    for _ in 0..5 {
        let message = reader.recv().await.unwrap().unwrap();
        replica.lock().apply(&message).unwrap();
    }

    let replica = replica.lock();
    assert!(same_content(&origin, replica.graph()));
    assert_eq!(
        replica
            .graph()
            .node(&id("h1-eth0"))
            .and_then(|n| n.get_field("MTU").cloned()),
        Some(serde_json::json!(1500))
    );
}
