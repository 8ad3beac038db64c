// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::graph::{GraphEvent, Identifier, Revision};

/// One line of the replication stream.
///
/// Serialized as a single JSON object per line:
///
/// ```text
/// {"type":"reset","origin":"host-1","revision":42,"root":"host-1"}
/// {"type":"event","origin":"host-1","revision":43,"event":{"kind":"node_added","entity":{...}}}
/// {"type":"resync_request","origin":"host-1","reason":"..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Origin to replica: drop everything held for `origin`, then accept the
    /// snapshot that follows at `revision`.
    Reset {
        origin: String,
        revision: Revision,
        root: Identifier,
    },
    /// Origin to replica: one graph event.
    Event {
        origin: String,
        revision: Revision,
        event: GraphEvent,
    },
    /// Replica to origin: the replica lost track and needs a reset.
    ResyncRequest { origin: String, reason: String },
}

impl SyncMessage {
    pub fn origin(&self) -> &str {
        match self {
            SyncMessage::Reset { origin, .. }
            | SyncMessage::Event { origin, .. }
            | SyncMessage::ResyncRequest { origin, .. } => origin,
        }
    }

    /// Encode as one line, without the trailing newline.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}
