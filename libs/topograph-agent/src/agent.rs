// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use anyhow::Context;

use topograph::core::sync::TcpConnector;
use topograph::{topology, Forwarder, Graph, PeeringProbe, Probe, TopographConfig};

pub async fn run(config: TopographConfig) -> anyhow::Result<()> {
    let host_id = config.host_id();
    let address = config
        .analyzer_address()
        .context("Agent needs an analyzer address")?
        .to_string();

    let graph = Graph::new(host_id.clone());
    let root = topology::new_root_node(&graph, &host_id)
        .with_context(|| format!("Failed to create root node for {}", host_id))?;

    // Announce a clean slate for this host before populating
    let cleared = graph.del_subgraph(&root.id)?;
    let root = topology::new_root_node(&graph, &host_id)?;
    tracing::info!(
        "[Agent] Host {} (root {}, reset removed {} node(s))",
        host_id,
        root.id,
        cleared
    );

    let mut probes: Vec<Box<dyn Probe>> = vec![Box::new(PeeringProbe::new(graph.clone()))];
    for probe in probes.iter_mut() {
        probe
            .start()
            .with_context(|| format!("Failed to start probe {}", probe.name()))?;
        tracing::debug!("[Agent] Probe {} started", probe.name());
    }

    let mut forwarder = Forwarder::start(
        graph.clone(),
        TcpConnector::new(address.clone()),
        config.forwarder_options(),
    );
    tracing::info!("[Agent] Forwarding to {}", address);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("[Agent] Shutting down");

    for probe in probes.iter_mut().rev() {
        if let Err(e) = probe.stop() {
            tracing::warn!("[Agent] Probe {} failed to stop: {}", probe.name(), e);
        }
    }
    forwarder.stop().await;

    tracing::info!(
        "[Agent] Stopped at revision {} ({} nodes, {} edges)",
        graph.revision(),
        graph.node_count(),
        graph.edge_count()
    );
    Ok(())
}
