//! Handle for a reply that has not been collected yet.

use crate::connection::Connection;
use crate::error::ClientError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use xrapc_protocol::{Reply, Verb};

enum State {
    Pending,
    Ready(Reply),
    Failed(ClientError),
}

/// The pending reply to a request sent with
/// [`Client::send_async`](crate::Client::send_async).
///
/// Once the reply (or a protocol/transport error) has been collected, every
/// later call returns the same outcome without touching the transport.
/// Timeouts leave the future pending.
pub struct ReplyFuture {
    conn: Arc<Connection>,
    request_id: i32,
    verb: Verb,
    state: State,
}

impl ReplyFuture {
    pub(crate) fn new(conn: Arc<Connection>, request_id: i32, verb: Verb) -> Self {
        Self {
            conn,
            request_id,
            verb,
            state: State::Pending,
        }
    }

    /// Returns the request ID this future waits on.
    pub fn request_id(&self) -> i32 {
        self.request_id
    }

    /// Waits for the reply with no time limit.
    pub fn get(&mut self) -> Result<Reply, ClientError> {
        self.wait(None)
    }

    /// Waits for the reply for at most `timeout`.
    pub fn get_timeout(&mut self, timeout: Duration) -> Result<Reply, ClientError> {
        self.wait(Some(timeout))
    }

    /// Checks without blocking whether the reply (or an error) is available.
    ///
    /// An error found here is kept and returned by the next `get`.
    pub fn is_done(&mut self) -> bool {
        if let State::Pending = self.state {
            let _ = self.wait(Some(Duration::ZERO));
        }
        !matches!(self.state, State::Pending)
    }

    /// Cancellation is not supported; always returns `false`.
    pub fn cancel(&mut self) -> bool {
        false
    }

    /// Always returns `false`.
    pub fn is_cancelled(&self) -> bool {
        false
    }

    fn wait(&mut self, budget: Option<Duration>) -> Result<Reply, ClientError> {
        match &self.state {
            State::Ready(reply) => return Ok(reply.clone()),
            State::Failed(err) => return Err(err.clone()),
            State::Pending => {}
        }

        match self.conn.wait_reply(self.request_id, self.verb, budget) {
            Ok(reply) => {
                self.state = State::Ready(reply.clone());
                Ok(reply)
            }
            Err(ClientError::Timeout) => Err(ClientError::Timeout),
            Err(err) => {
                self.state = State::Failed(err.clone());
                Err(err)
            }
        }
    }
}

impl fmt::Debug for ReplyFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Pending => "pending",
            State::Ready(_) => "ready",
            State::Failed(_) => "failed",
        };
        f.debug_struct("ReplyFuture")
            .field("request_id", &self.request_id)
            .field("verb", &self.verb)
            .field("state", &state)
            .finish()
    }
}
