// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::core::error::Result;

use super::transport::{split_tcp, MessageReader, MessageWriter};
use super::{Replica, SyncMessage};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accepts forwarder connections and applies their streams to a replica.
pub struct ReplicaServer {
    listener: TcpListener,
    replica: Arc<Mutex<Replica>>,
}

impl ReplicaServer {
    pub async fn bind(addr: &str, replica: Arc<Mutex<Replica>>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("[Replica] Listening on {}", listener.local_addr()?);
        Ok(Self { listener, replica })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task per connection.
    ///
    /// Failed accepts (descriptor exhaustion, aborted handshakes) are
    /// logged and retried after a short pause.
    pub async fn serve(self) -> Result<()> {
        loop {
            let (stream, peer) = accept_next(|| self.listener.accept()).await;
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!("[Replica] set_nodelay failed for {}: {}", peer, e);
            }
            let replica = self.replica.clone();
            tokio::spawn(async move {
                tracing::info!("[Replica] Forwarder connected from {}", peer);
                let (writer, reader) = split_tcp(stream);
                match serve_connection(replica, writer, reader).await {
                    Ok(()) => tracing::info!("[Replica] Forwarder {} disconnected", peer),
                    Err(e) => tracing::warn!("[Replica] Connection from {} failed: {}", peer, e),
                }
            });
        }
    }
}

/// Wait for the next successful accept, pausing after each failure.
async fn accept_next<T, F, Fut>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                tracing::warn!("[Replica] Accept failed, retrying: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

/// Apply every message read from one connection.
///
/// Rejected events are answered with a single `ResyncRequest` per origin
/// until that origin resets. When the connection ends, the sessions it
/// opened are closed so a reconnecting origin has to reset first. Sessions
/// another connection has opened since are left alone.
pub async fn serve_connection<W, R>(
    replica: Arc<Mutex<Replica>>,
    mut writer: W,
    mut reader: R,
) -> Result<()>
where
    W: MessageWriter,
    R: MessageReader,
{
    let mut sessions = HashMap::new();
    let mut awaiting_reset = HashSet::new();

    let outcome = loop {
        let message = match reader.recv().await {
            Ok(Some(message)) => message,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        let origin = message.origin().to_string();
        let is_reset = matches!(message, SyncMessage::Reset { .. });
        if is_reset {
            awaiting_reset.remove(&origin);
        }

        let applied = {
            let mut replica = replica.lock();
            let applied = replica.apply(&message);
            if is_reset {
                if let Some(session) = replica.session(&origin) {
                    sessions.insert(origin.clone(), session);
                }
            }
            applied
        };
        let Err(e) = applied else {
            continue;
        };

        if awaiting_reset.contains(&origin) {
            continue;
        }
        tracing::warn!("[Replica] Requesting resync from {}: {}", origin, e);
        awaiting_reset.insert(origin.clone());
        let request = SyncMessage::ResyncRequest {
            origin,
            reason: e.to_string(),
        };
        if let Err(e) = writer.send(&request).await {
            break Err(e);
        }
    };

    let mut replica = replica.lock();
    for (origin, session) in &sessions {
        replica.end_session(origin, *session);
    }
    outcome
}
