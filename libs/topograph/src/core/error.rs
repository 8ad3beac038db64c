// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use super::graph::Identifier;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Identifier already exists: {0}")]
    DuplicateId(Identifier),

    #[error("Edge endpoint not found: {0}")]
    UnknownEndpoint(Identifier),

    #[error("Node not found: {0}")]
    NodeNotFound(Identifier),

    #[error("Edge not found: {0}")]
    EdgeNotFound(Identifier),

    #[error("Revision gap from origin '{origin}': expected {expected}, received {received}")]
    RevisionGap {
        origin: String,
        expected: u64,
        received: u64,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GraphError>;
