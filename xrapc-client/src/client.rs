//! High-level client API.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::ClientError;
use crate::future::ReplyFuture;
use crate::transport::MessageTransport;
use crate::zmq::ZmqTransport;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use xrapc_protocol::{DeleteRequest, GetRequest, PostRequest, PutRequest, Reply, Request};

/// High-level client for an XRAP server.
///
/// A client can be shared between threads; each call gets its own request
/// ID and replies are routed back to the thread that sent the request.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a client over an existing transport.
    pub fn new(transport: impl MessageTransport + 'static) -> Self {
        Self {
            conn: Arc::new(Connection::new(transport)),
        }
    }

    /// Connects to the server named by `config` over ZeroMQ.
    ///
    /// The returned client blocks its caller; do not use it directly from
    /// an async task (see [`ZmqTransport`]).
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = ZmqTransport::connect(&config.endpoint, config.connect_timeout())?;
        let client = Self::new(transport);
        client.set_timeout(config.timeout());
        Ok(client)
    }

    /// Returns the reply timeout used by [`send`](Self::send).
    pub fn timeout(&self) -> Duration {
        self.conn.timeout()
    }

    /// Sets the reply timeout used by [`send`](Self::send). Defaults to 30s.
    pub fn set_timeout(&self, timeout: Duration) {
        self.conn.set_timeout(timeout);
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Sends a request and waits for its reply.
    ///
    /// Server-side failures come back as a [`Reply`] with `error_text` set.
    pub fn send(&self, request: impl Into<Request>) -> Result<Reply, ClientError> {
        let mut request = request.into();
        let id = self.conn.send_request(&mut request)?;
        self.conn
            .wait_reply(id, request.verb(), Some(self.conn.timeout()))
    }

    /// Sends a request without waiting for its reply.
    pub fn send_async(&self, request: impl Into<Request>) -> Result<ReplyFuture, ClientError> {
        let mut request = request.into();
        let id = self.conn.send_request(&mut request)?;
        Ok(ReplyFuture::new(self.conn.clone(), id, request.verb()))
    }

    // =========================================================================
    // Convenience methods
    // =========================================================================

    /// Gets a resource.
    pub fn get(&self, resource: &str) -> Result<Reply, ClientError> {
        self.send(GetRequest::new(resource))
    }

    /// Creates a resource under `parent`.
    pub fn post(
        &self,
        parent: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Reply, ClientError> {
        self.send(
            PostRequest::new(parent)
                .with_content_type(content_type)
                .with_content_body(body),
        )
    }

    /// Replaces a resource.
    pub fn put(
        &self,
        resource: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<Reply, ClientError> {
        self.send(
            PutRequest::new(resource)
                .with_content_type(content_type)
                .with_content_body(body),
        )
    }

    /// Deletes a resource.
    pub fn delete(&self, resource: &str) -> Result<Reply, ClientError> {
        self.send(DeleteRequest::new(resource))
    }
}
