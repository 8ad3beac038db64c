// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod edge;
mod events;
#[allow(clippy::module_inception)]
mod graph;
mod identifier;
mod metadata;
mod node;


pub use edge::{relation_types, Edge, RELATION_TYPE};
pub use events::{EntityKind, EventKind, GraphEvent, GraphListener, ListenerHandle, Revision};
pub use graph::{Graph, Snapshot};
pub use identifier::Identifier;
pub use metadata::Metadata;
pub use node::Node;
