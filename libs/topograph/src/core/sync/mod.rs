// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Replication of a graph to remote replicas.
//!
//! The origin runs a [`Forwarder`] on its graph; the aggregator runs a
//! [`Replica`] behind a [`ReplicaServer`]. Each origin stream is a reset
//! followed by a snapshot and then live events, every one stamped with the
//! origin revision so the replica can detect gaps.

mod forwarder;
mod message;
mod replica;
mod server;
pub mod transport;

pub use forwarder::{Backoff, Forwarder, ForwarderOptions};
pub use message::SyncMessage;
pub use replica::{Replica, SessionId};
pub use server::{serve_connection, ReplicaServer};
pub use transport::{
    memory_transport, Connector, MemoryAcceptor, MemoryConnector, MessageReader, MessageWriter,
    TcpConnector,
};
