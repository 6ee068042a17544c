//! Message transports.
//!
//! A transport moves whole frames. A multi-part message is sent as a run of
//! frames where every frame but the last has `more` set.

use crate::error::TransportError;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Frame-oriented message transport.
///
/// The dispatcher serializes senders and receivers separately, so an
/// implementation sees at most one `send` and one `recv` in flight at a time,
/// possibly on different threads.
pub trait MessageTransport: Send + Sync {
    /// Sends one frame. `more` marks that another frame of the same message
    /// follows.
    fn send(&self, frame: Bytes, more: bool) -> Result<(), TransportError>;

    /// Sets how long `recv` waits. `None` waits until a frame arrives.
    fn set_receive_timeout(&self, timeout: Option<Duration>);

    /// Receives one frame, or `None` if the receive timeout elapsed first.
    fn recv(&self) -> Result<Option<Bytes>, TransportError>;
}

impl<T: MessageTransport + ?Sized> MessageTransport for Box<T> {
    fn send(&self, frame: Bytes, more: bool) -> Result<(), TransportError> {
        (**self).send(frame, more)
    }

    fn set_receive_timeout(&self, timeout: Option<Duration>) {
        (**self).set_receive_timeout(timeout)
    }

    fn recv(&self) -> Result<Option<Bytes>, TransportError> {
        (**self).recv()
    }
}

/// One end of an in-process duplex frame channel.
///
/// Created in pairs by [`memory_transport_pair`]. Dropping one end makes
/// `recv` on the other fail with [`TransportError::Closed`] once buffered
/// frames are drained.
pub struct MemoryTransport {
    tx: Sender<(Bytes, bool)>,
    rx: Mutex<Receiver<(Bytes, bool)>>,
    timeout: Mutex<Option<Duration>>,
}

/// Creates two connected in-process transports.
pub fn memory_transport_pair() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();

    let a = MemoryTransport {
        tx: a_tx,
        rx: Mutex::new(a_rx),
        timeout: Mutex::new(None),
    };
    let b = MemoryTransport {
        tx: b_tx,
        rx: Mutex::new(b_rx),
        timeout: Mutex::new(None),
    };
    (a, b)
}

impl MemoryTransport {
    fn recv_part(&self) -> Result<Option<(Bytes, bool)>, TransportError> {
        let timeout = *self.timeout.lock();
        let rx = self.rx.lock();
        match timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(part) => Ok(Some(part)),
                Err(RecvTimeoutError::Timeout) => Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
            },
            None => rx.recv().map(Some).map_err(|_| TransportError::Closed),
        }
    }

    /// Sends a whole message as a run of frames.
    pub fn send_message(&self, frames: Vec<Bytes>) -> Result<(), TransportError> {
        let last = frames.len().saturating_sub(1);
        for (i, frame) in frames.into_iter().enumerate() {
            self.send(frame, i < last)?;
        }
        Ok(())
    }

    /// Receives a whole message, collecting frames until one arrives without
    /// `more` set.
    ///
    /// Returns `None` if the receive timeout elapses before the first frame.
    pub fn recv_message(&self) -> Result<Option<Vec<Bytes>>, TransportError> {
        let mut frames = Vec::new();
        loop {
            match self.recv_part()? {
                Some((frame, more)) => {
                    frames.push(frame);
                    if !more {
                        return Ok(Some(frames));
                    }
                }
                None if frames.is_empty() => return Ok(None),
                None => continue,
            }
        }
    }
}

impl MessageTransport for MemoryTransport {
    fn send(&self, frame: Bytes, more: bool) -> Result<(), TransportError> {
        self.tx
            .send((frame, more))
            .map_err(|_| TransportError::Closed)
    }

    fn set_receive_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.lock() = timeout;
    }

    fn recv(&self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.recv_part()?.map(|(frame, _)| frame))
    }
}
