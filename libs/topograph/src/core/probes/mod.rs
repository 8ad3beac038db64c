// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Graph producers and derived-state listeners.

mod peering;

pub use peering::{PeeringOutcome, PeeringProbe, PeeringResolver};

use crate::core::error::Result;

/// Lifecycle of anything that feeds or watches a shared [`Graph`](crate::core::graph::Graph).
///
/// Stopping a probe releases what it registered on the graph and leaves
/// the graph itself running for the other probes.
pub trait Probe: Send {
    fn name(&self) -> &str;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}
