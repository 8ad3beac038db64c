// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Origin side of graph replication.
//!
//! The forwarder listens on the local graph and queues every event into a
//! bounded channel; a background task owns the connection and drains the
//! queue. Graph producers therefore never wait on the network.
//!
//! Overflow policy: when the queue is full the event is dropped and the
//! next delivery is replaced by a full resync (reset + snapshot). Every
//! (re)connect also starts with a resync, so the replica never keeps state
//! from an earlier session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::core::error::{GraphError, Result};
use crate::core::graph::{Graph, GraphEvent, GraphListener, Identifier, ListenerHandle, Revision};

use super::transport::{Connector, MessageReader, MessageWriter};
use super::SyncMessage;

/// Tuning for [`Forwarder`].
#[derive(Debug, Clone, PartialEq)]
pub struct ForwarderOptions {
    /// Maximum number of events buffered while the connection is slow or down.
    pub queue_capacity: usize,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl Default for ForwarderOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            backoff_initial: Duration::from_millis(250),
            backoff_max: Duration::from_secs(30),
        }
    }
}

/// Capped exponential reconnect delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    /// Delay before the next attempt; doubles on every call until `max`.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        self.attempt = self.attempt.saturating_add(1);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Graph listener half: copies events into the outbound queue.
struct ForwarderListener {
    tx: mpsc::Sender<(Revision, GraphEvent)>,
    overflowed: Arc<AtomicBool>,
}

impl GraphListener for ForwarderListener {
    fn on_graph_event(&mut self, revision: Revision, event: &GraphEvent) -> Result<()> {
        match self.tx.try_send((revision, event.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if !self.overflowed.swap(true, Ordering::SeqCst) {
                    tracing::warn!(
                        "[Forwarder] Queue full at revision {}, scheduling resync",
                        revision
                    );
                }
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(
                    "[Forwarder] Task gone, dropping revision {} until stop()",
                    revision
                );
            }
        }
        Ok(())
    }
}

/// Replicates a graph to one remote replica.
pub struct Forwarder {
    graph: Graph,
    handle: Option<ListenerHandle>,
    // Keeps the listener alive; the graph only holds a weak reference.
    _listener: Arc<Mutex<ForwarderListener>>,
    task: Option<JoinHandle<()>>,
}

impl Forwarder {
    /// Register on `graph` and start replicating through `connector`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<C: Connector>(graph: Graph, connector: C, options: ForwarderOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let overflowed = Arc::new(AtomicBool::new(false));

        let listener = Arc::new(Mutex::new(ForwarderListener {
            tx,
            overflowed: overflowed.clone(),
        }));
        let handle = graph.add_listener(listener.clone());

        let session = Session {
            graph: graph.clone(),
            root: Identifier::from(graph.host_id()),
            origin: graph.host_id().to_string(),
            rx,
            overflowed,
        };
        let task = tokio::spawn(run(session, connector, options));

        Self {
            graph,
            handle: Some(handle),
            _listener: listener,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Unregister from the graph and close the connection.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.graph.remove_listener(handle);
        }
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!("[Forwarder] Task ended abnormally: {}", e);
                }
            }
            tracing::info!("[Forwarder] Stopped");
        }
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.graph.remove_listener(handle);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Session {
    graph: Graph,
    origin: String,
    root: Identifier,
    rx: mpsc::Receiver<(Revision, GraphEvent)>,
    overflowed: Arc<AtomicBool>,
}

enum SessionEnd {
    /// The listener side is gone; nothing left to forward.
    QueueClosed,
}

async fn run<C: Connector>(mut session: Session, connector: C, options: ForwarderOptions) {
    let mut backoff = Backoff::new(options.backoff_initial, options.backoff_max);
    let target = connector.describe();

    loop {
        match connector.connect().await {
            Ok((mut writer, mut reader)) => {
                backoff.reset();
                tracing::info!("[Forwarder] Connected to {}", target);
                match session.forward(&mut writer, &mut reader).await {
                    Ok(SessionEnd::QueueClosed) => {
                        tracing::debug!("[Forwarder] Event queue closed, exiting");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!("[Forwarder] Connection to {} lost: {}", target, e)
                    }
                }
            }
            Err(e) => {
                tracing::warn!("[Forwarder] Failed to connect to {}: {}", target, e);
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!("[Forwarder] Reconnecting in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}

impl Session {
    /// Drive one connection until it fails.
    async fn forward<W, R>(&mut self, writer: &mut W, reader: &mut R) -> Result<SessionEnd>
    where
        W: MessageWriter,
        R: MessageReader,
    {
        let mut synced = self.resync(writer).await?;

        loop {
            tokio::select! {
                queued = self.rx.recv() => {
                    let Some((revision, event)) = queued else {
                        return Ok(SessionEnd::QueueClosed);
                    };
                    if self.overflowed.load(Ordering::SeqCst) {
                        synced = self.resync(writer).await?;
                    }
                    if revision <= synced {
                        continue;
                    }
                    let message = SyncMessage::Event {
                        origin: self.origin.clone(),
                        revision,
                        event,
                    };
                    writer.send(&message).await?;
                }
                inbound = reader.recv() => {
                    match inbound? {
                        None => {
                            return Err(GraphError::Transport("connection closed by replica".into()));
                        }
                        Some(SyncMessage::ResyncRequest { reason, .. }) => {
                            tracing::warn!("[Forwarder] Replica requested resync: {}", reason);
                            synced = self.resync(writer).await?;
                        }
                        Some(other) => {
                            tracing::debug!(
                                "[Forwarder] Ignoring unexpected message from {}",
                                other.origin()
                            );
                        }
                    }
                }
            }
        }
    }

    /// Send a reset followed by the current graph at one revision.
    ///
    /// Returns the snapshot revision; queued events at or below it are
    /// already covered.
    async fn resync<W: MessageWriter>(&mut self, writer: &mut W) -> Result<Revision> {
        self.overflowed.store(false, Ordering::SeqCst);
        let snapshot = self.graph.snapshot();
        let revision = snapshot.revision;

        writer
            .send(&SyncMessage::Reset {
                origin: self.origin.clone(),
                revision,
                root: self.root.clone(),
            })
            .await?;

        let node_count = snapshot.nodes.len();
        let edge_count = snapshot.edges.len();
        let events = snapshot
            .nodes
            .into_iter()
            .map(GraphEvent::NodeAdded)
            .chain(snapshot.edges.into_iter().map(GraphEvent::EdgeAdded));
        for event in events {
            writer
                .send(&SyncMessage::Event {
                    origin: self.origin.clone(),
                    revision,
                    event,
                })
                .await?;
        }

        tracing::info!(
            "[Forwarder] Resynced at revision {} ({} nodes, {} edges)",
            revision,
            node_count,
            edge_count
        );
        Ok(revision)
    }
}
