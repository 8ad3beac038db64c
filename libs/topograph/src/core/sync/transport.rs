// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Message transports for the replication stream.
//!
//! Every transport carries [`SyncMessage`]s as newline-delimited JSON.

use std::future::Future;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::core::error::{GraphError, Result};

use super::SyncMessage;

/// Sending half of a connection.
pub trait MessageWriter: Send {
    fn send(&mut self, message: &SyncMessage) -> impl Future<Output = Result<()>> + Send;
}

/// Receiving half of a connection.
///
/// `recv` resolves to `None` once the peer has closed the connection. It
/// must be cancel safe: it is raced against other work in `select!`.
pub trait MessageReader: Send {
    fn recv(&mut self) -> impl Future<Output = Result<Option<SyncMessage>>> + Send;
}

/// Opens outbound connections to a replica.
pub trait Connector: Send + Sync + 'static {
    type Writer: MessageWriter + 'static;
    type Reader: MessageReader + 'static;

    fn connect(&self) -> impl Future<Output = Result<(Self::Writer, Self::Reader)>> + Send;

    /// Human-readable peer description for logs.
    fn describe(&self) -> String;
}

// =============================================================================
// TCP
// =============================================================================

/// Connects to a replica server over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Connector for TcpConnector {
    type Writer = TcpMessageWriter;
    type Reader = TcpMessageReader;

    async fn connect(&self) -> Result<(TcpMessageWriter, TcpMessageReader)> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(split_tcp(stream))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// Split an established stream into message halves.
pub fn split_tcp(stream: TcpStream) -> (TcpMessageWriter, TcpMessageReader) {
    let (reader, writer) = stream.into_split();
    (
        TcpMessageWriter { inner: writer },
        TcpMessageReader {
            lines: BufReader::new(reader).lines(),
        },
    )
}

pub struct TcpMessageWriter {
    inner: OwnedWriteHalf,
}

impl MessageWriter for TcpMessageWriter {
    async fn send(&mut self, message: &SyncMessage) -> Result<()> {
        let mut line = message.encode()?;
        line.push('\n');
        self.inner.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

pub struct TcpMessageReader {
    lines: Lines<BufReader<OwnedReadHalf>>,
}

impl MessageReader for TcpMessageReader {
    async fn recv(&mut self) -> Result<Option<SyncMessage>> {
        // next_line is cancel safe
        while let Some(line) = self.lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            return SyncMessage::decode(line).map(Some);
        }
        Ok(None)
    }
}

// =============================================================================
// In-memory
// =============================================================================

type Wire = (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>);

/// Create an in-process connector and the acceptor that receives its
/// connections. Messages still go through the line encoding.
pub fn memory_transport() -> (MemoryConnector, MemoryAcceptor) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryConnector { incoming: tx },
        MemoryAcceptor { incoming: rx },
    )
}

#[derive(Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<(MemoryWriter, MemoryReader)>,
}

impl Connector for MemoryConnector {
    type Writer = MemoryWriter;
    type Reader = MemoryReader;

    async fn connect(&self) -> Result<(MemoryWriter, MemoryReader)> {
        let (to_server, from_client): Wire = mpsc::unbounded_channel();
        let (to_client, from_server): Wire = mpsc::unbounded_channel();

        let server = (
            MemoryWriter { tx: to_client },
            MemoryReader { rx: from_client },
        );
        self.incoming
            .send(server)
            .map_err(|_| GraphError::Transport("memory acceptor closed".into()))?;

        Ok((
            MemoryWriter { tx: to_server },
            MemoryReader { rx: from_server },
        ))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Server side of [`memory_transport`].
pub struct MemoryAcceptor {
    incoming: mpsc::UnboundedReceiver<(MemoryWriter, MemoryReader)>,
}

impl MemoryAcceptor {
    /// Wait for the next connection. `None` once every connector is gone.
    pub async fn accept(&mut self) -> Option<(MemoryWriter, MemoryReader)> {
        self.incoming.recv().await
    }
}

pub struct MemoryWriter {
    tx: mpsc::UnboundedSender<String>,
}

impl MessageWriter for MemoryWriter {
    async fn send(&mut self, message: &SyncMessage) -> Result<()> {
        let line = message.encode()?;
        self.tx
            .send(line)
            .map_err(|_| GraphError::Transport("memory peer closed".into()))
    }
}

pub struct MemoryReader {
    rx: mpsc::UnboundedReceiver<String>,
}

impl MessageReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<SyncMessage>> {
        match self.rx.recv().await {
            Some(line) => SyncMessage::decode(&line).map(Some),
            None => Ok(None),
        }
    }
}
