//! ZeroMQ DEALER transport.
//!
//! The socket lives on a small owned tokio runtime. A background task moves
//! outbound messages onto the socket and inbound messages onto a channel;
//! the blocking [`MessageTransport`] methods talk to that task.

use crate::error::TransportError;
use crate::transport::MessageTransport;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

type Inbound = Result<ZmqMessage, String>;

struct Receiver {
    rx: mpsc::UnboundedReceiver<Inbound>,
    /// Frames of a partially consumed message.
    pending: VecDeque<Bytes>,
}

/// A DEALER socket connected to one XRAP server.
///
/// All methods block the calling thread on the transport's own runtime.
/// Calling them from a thread that is already driving a tokio runtime
/// panics; use `tokio::task::spawn_blocking` from async code.
pub struct ZmqTransport {
    runtime: Runtime,
    outbound: mpsc::UnboundedSender<ZmqMessage>,
    /// Frames of the message being assembled by `send`.
    parts: Mutex<Vec<Bytes>>,
    inbound: Mutex<Receiver>,
    timeout: Mutex<Option<Duration>>,
}

impl ZmqTransport {
    /// Connects a DEALER socket to `endpoint` (e.g. `tcp://127.0.0.1:5555`).
    pub fn connect(endpoint: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("xrapc-zmq")
            .enable_all()
            .build()?;

        tracing::debug!("Connecting to {}...", endpoint);
        let mut socket = DealerSocket::new();
        runtime
            .block_on(tokio::time::timeout(connect_timeout, socket.connect(endpoint)))
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("timed out connecting to {}", endpoint),
                )
            })?
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                TransportError::Zmq(e.to_string())
            })?;
        tracing::debug!("Connected to {}", endpoint);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        runtime.spawn(io_loop(socket, outbound_rx, inbound_tx));

        Ok(Self {
            runtime,
            outbound,
            parts: Mutex::new(Vec::new()),
            inbound: Mutex::new(Receiver {
                rx: inbound_rx,
                pending: VecDeque::new(),
            }),
            timeout: Mutex::new(None),
        })
    }
}

impl MessageTransport for ZmqTransport {
    fn send(&self, frame: Bytes, more: bool) -> Result<(), TransportError> {
        let mut parts = self.parts.lock();
        parts.push(frame);
        if more {
            return Ok(());
        }

        let message = ZmqMessage::try_from(std::mem::take(&mut *parts))
            .map_err(|e| TransportError::Zmq(e.to_string()))?;
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    fn set_receive_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.lock() = timeout;
    }

    fn recv(&self) -> Result<Option<Bytes>, TransportError> {
        let mut inbound = self.inbound.lock();
        if let Some(frame) = inbound.pending.pop_front() {
            return Ok(Some(frame));
        }

        let timeout = *self.timeout.lock();
        let received = match timeout {
            Some(timeout) => {
                match self
                    .runtime
                    .block_on(tokio::time::timeout(timeout, inbound.rx.recv()))
                {
                    Ok(received) => received,
                    Err(_) => return Ok(None),
                }
            }
            None => self.runtime.block_on(inbound.rx.recv()),
        };

        match received {
            Some(Ok(message)) => {
                let mut frames: VecDeque<Bytes> = message.into_vec().into();
                let first = frames.pop_front();
                inbound.pending = frames;
                Ok(first)
            }
            Some(Err(e)) => Err(TransportError::Zmq(e)),
            None => Err(TransportError::Closed),
        }
    }
}

async fn io_loop(
    mut socket: DealerSocket,
    mut outbound: mpsc::UnboundedReceiver<ZmqMessage>,
    inbound: mpsc::UnboundedSender<Inbound>,
) {
    tracing::debug!("io_loop started");
    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(message) => {
                    if let Err(e) = socket.send(message).await {
                        tracing::warn!("io_loop: send failed: {}", e);
                        let _ = inbound.send(Err(e.to_string()));
                        break;
                    }
                }
                None => {
                    tracing::debug!("io_loop: transport dropped");
                    break;
                }
            },
            received = socket.recv() => match received {
                Ok(message) => {
                    tracing::debug!("io_loop: received message with {} frames", message.len());
                    if inbound.send(Ok(message)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("io_loop: receive failed: {}", e);
                    let _ = inbound.send(Err(e.to_string()));
                    break;
                }
            },
        }
    }
}
