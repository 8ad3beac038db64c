// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;

use topograph::{Graph, PeeringProbe, Probe, Replica, ReplicaServer, TopographConfig};

pub async fn run(config: TopographConfig) -> anyhow::Result<()> {
    let graph = Graph::new(config.host_id());

    // Links between hosts can only be inferred here
    let mut peering = PeeringProbe::new(graph.clone());
    peering.start().context("Failed to start peering probe")?;

    let replica = Arc::new(Mutex::new(Replica::new(graph.clone())));
    let server = ReplicaServer::bind(&config.analyzer.listen, replica.clone())
        .await
        .with_context(|| format!("Failed to bind {}", config.analyzer.listen))?;
    tracing::info!("[Analyzer] Listening on {}", server.local_addr()?);

    let result = tokio::select! {
        result = server.serve() => result.context("Replica server failed"),
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("[Analyzer] Shutting down");
            signal.context("Failed to listen for shutdown signal")
        }
    };

    peering.stop()?;
    tracing::info!(
        "[Analyzer] Stopped with {} origin(s), {} nodes, {} edges",
        replica.lock().origins().len(),
        graph.node_count(),
        graph.edge_count()
    );
    result
}
