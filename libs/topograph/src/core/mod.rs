// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod probes;
pub mod sync;
pub mod topology;

pub use config::TopographConfig;
pub use error::*;
pub use graph::*;
pub use probes::{PeeringOutcome, PeeringProbe, PeeringResolver, Probe};
pub use sync::{Forwarder, ForwarderOptions, Replica, ReplicaServer, SyncMessage};
