//! Request/reply dispatcher.
//!
//! Many threads share one transport. Sends are serialized by a send lock.
//! Receiving is serialized by a separate receive lock: whichever waiter holds
//! it reads the next frame, keeps it if the request ID is its own, and
//! otherwise parks the decoded reply in a shared cache for its owner.

use crate::error::{ClientError, TransportError};
use crate::transport::MessageTransport;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use xrapc_protocol::{Command, Decoder, FrameHeader, ProtocolError, Reply, Request, Verb};

/// Default reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type CachedReply = Result<(Command, Reply), ProtocolError>;

/// A dispatcher over one message transport.
pub struct Connection {
    transport: Box<dyn MessageTransport>,
    /// Held while writing the frames of one request.
    send_lock: Mutex<()>,
    /// Held by the single waiter currently reading the transport.
    recv_lock: Mutex<()>,
    /// Replies received on behalf of other waiters, keyed by request ID.
    replies: DashMap<i32, CachedReply>,
    /// Next request ID.
    next_id: AtomicI32,
    /// Reply timeout in milliseconds.
    timeout_ms: AtomicU64,
}

impl Connection {
    /// Creates a dispatcher that owns `transport`.
    pub fn new(transport: impl MessageTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            send_lock: Mutex::new(()),
            recv_lock: Mutex::new(()),
            replies: DashMap::new(),
            next_id: AtomicI32::new(1),
            timeout_ms: AtomicU64::new(DEFAULT_TIMEOUT.as_millis() as u64),
        }
    }

    /// Returns the reply timeout used by blocking sends.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Sets the reply timeout used by blocking sends.
    pub fn set_timeout(&self, timeout: Duration) {
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.timeout_ms.store(ms, Ordering::Relaxed);
    }

    /// Allocates the next request ID.
    ///
    /// IDs start at 1 and wrap from `i32::MAX` to `i32::MIN`; 0 is never
    /// handed out. An ID is reused only after 2^32 - 1 further allocations.
    pub fn next_request_id(&self) -> i32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            if id != 0 {
                return id;
            }
        }
    }

    /// Assigns a fresh request ID to `request` and sends it.
    ///
    /// Returns the assigned ID.
    pub fn send_request(&self, request: &mut Request) -> Result<i32, ClientError> {
        let id = self.next_request_id();
        request.set_request_id(id);
        let encoded = request.encode()?.freeze();

        tracing::debug!(
            "Sending request id={} {} {} ({} bytes)",
            id,
            request.verb(),
            request.resource(),
            encoded.len()
        );

        let _guard = self.send_lock.lock();
        self.transport.send(Bytes::new(), true)?;
        self.transport.send(encoded, false)?;
        Ok(id)
    }

    /// Waits for the reply to `request_id`.
    ///
    /// `budget` of `None` waits forever. A zero budget makes exactly one
    /// non-blocking attempt. Returns [`ClientError::Timeout`] if no reply
    /// arrives in time.
    pub fn wait_reply(
        &self,
        request_id: i32,
        verb: Verb,
        budget: Option<Duration>,
    ) -> Result<Reply, ClientError> {
        let deadline = budget.map(|b| Instant::now() + b);
        let remaining = || deadline.map(|d| d.saturating_duration_since(Instant::now()));

        loop {
            if let Some(reply) = self.claim(request_id, verb) {
                return reply;
            }

            let guard = match remaining() {
                Some(left) => match self.recv_lock.try_lock_for(left) {
                    Some(guard) => guard,
                    None => {
                        return self
                            .claim(request_id, verb)
                            .unwrap_or(Err(ClientError::Timeout));
                    }
                },
                None => self.recv_lock.lock(),
            };

            // Another waiter may have cached our reply while we queued.
            if let Some(reply) = self.claim(request_id, verb) {
                return reply;
            }

            let frame = match self.read_frame(deadline) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Transport failure while waiting for id={}: {}", request_id, e);
                    return Err(e.into());
                }
            };

            if let Some(frame) = frame {
                match self.route(request_id, verb, &frame) {
                    Some(result) => return result,
                    // Hand the lock straight to a queued waiter, who may be
                    // the owner of the reply just cached.
                    None => MutexGuard::unlock_fair(guard),
                }
            } else {
                drop(guard);
            }

            if remaining().is_some_and(|left| left.is_zero()) {
                return self
                    .claim(request_id, verb)
                    .unwrap_or(Err(ClientError::Timeout));
            }
        }
    }

    /// Reads one payload frame, skipping a leading empty delimiter frame.
    ///
    /// Each `recv` waits at most until `deadline`.
    fn read_frame(&self, deadline: Option<Instant>) -> Result<Option<Bytes>, TransportError> {
        let remaining = || deadline.map(|d| d.saturating_duration_since(Instant::now()));

        self.transport.set_receive_timeout(remaining());
        match self.transport.recv()? {
            Some(frame) if frame.is_empty() => {
                self.transport.set_receive_timeout(remaining());
                let payload = self.transport.recv()?;
                if payload.is_none() {
                    tracing::debug!("Delimiter received without payload before timeout");
                }
                Ok(payload)
            }
            other => Ok(other),
        }
    }

    /// Decodes `frame`. Returns the result if it belongs to `request_id`,
    /// otherwise caches it for its owner and returns `None`.
    fn route(
        &self,
        request_id: i32,
        verb: Verb,
        frame: &[u8],
    ) -> Option<Result<Reply, ClientError>> {
        let header = match FrameHeader::peek(frame) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame ({} bytes): {}", frame.len(), e);
                return Some(Err(e.into()));
            }
        };

        if header.request_id == request_id {
            tracing::debug!("Received reply id={} command={}", request_id, header.command);
            return Some(Decoder::decode_reply(verb, frame).map_err(|e| {
                tracing::warn!("Failed to decode reply id={}: {}", request_id, e);
                e.into()
            }));
        }

        let decoded = Decoder::decode_any_reply(frame);
        if let Err(e) = &decoded {
            tracing::warn!("Failed to decode reply id={}: {}", header.request_id, e);
        }
        tracing::debug!(
            "Caching reply id={} for another waiter (waiting for id={})",
            header.request_id,
            request_id
        );
        if self.replies.insert(header.request_id, decoded).is_some() {
            tracing::warn!(
                "Duplicate reply id={} replaced an unclaimed cached reply",
                header.request_id
            );
        }
        None
    }

    /// Takes a cached reply for `request_id`, checking it against `verb`.
    fn claim(&self, request_id: i32, verb: Verb) -> Option<Result<Reply, ClientError>> {
        let (_, cached) = self.replies.remove(&request_id)?;
        tracing::debug!("Claimed cached reply id={}", request_id);

        let result = match cached {
            Ok((command, reply)) if verb.accepts(command) => Ok(reply),
            Ok((command, _)) => Err(ProtocolError::UnknownResponseCode {
                verb,
                command: command.code(),
            }),
            Err(ProtocolError::UnknownCommand(command)) => {
                Err(ProtocolError::UnknownResponseCode { verb, command })
            }
            Err(e) => Err(e),
        };
        Some(result.map_err(ClientError::from))
    }

    /// Returns the number of replies cached for waiters that have not
    /// claimed them yet.
    pub fn cached_replies(&self) -> usize {
        self.replies.len()
    }
}
