// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Topograph - attributed network topology graph with live replication.
//!
//! Probes write nodes and edges into a shared [`Graph`]; listeners such as
//! the [`PeeringProbe`] and the [`Forwarder`] react to every mutation in
//! revision order. A [`Replica`] applies forwarded streams on an aggregator.

pub mod core;

pub use crate::core::{
    relation_types, topology, Edge, Forwarder, ForwarderOptions, Graph, GraphError, GraphEvent,
    GraphListener, Identifier, ListenerHandle, Metadata, Node, PeeringOutcome, PeeringProbe,
    PeeringResolver, Probe, Replica, ReplicaServer, Result, Revision, Snapshot, SyncMessage,
    TopographConfig, RELATION_TYPE,
};

/// Crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
