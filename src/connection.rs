//! Connection management for the aggregator endpoint.
//!
//! The [`ConnectionManager`] owns exactly one endpoint and guarantees that
//! every poll ends with data, a timeout, or a fatal condition; it never
//! blocks past the timeout it is given.
//!
//! Connects are lazy: [`Endpoint::reconnect`] only validates the address
//! and drops the old socket. The TCP connect happens on the next send, so a
//! dead peer shows up as a poll timeout rather than an error.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::{ReceiverError, Result};
use crate::protocol::{Message, MessageBuffer};
use crate::transport::{Address, SocketMode, Stream};

/// Default bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of the socket read buffer.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Result of waiting for a response.
#[derive(Debug)]
pub enum PollOutcome {
    /// A complete message arrived.
    DataReady(Message),
    /// Nothing arrived before the timeout; the peer may be dead.
    TimedOut,
    /// The endpoint was permanently torn down.
    Fatal(ReceiverError),
}

/// A transport endpoint the receiver loop can drive.
pub trait Endpoint {
    /// Send the periodic request carrying `options`.
    ///
    /// Only a terminated endpoint reports an error; a request that cannot
    /// be delivered is dropped and surfaces as a poll timeout.
    fn send_request(&mut self, options: &str) -> impl Future<Output = Result<()>> + Send;

    /// Wait up to `timeout` for a complete response.
    fn poll_for_response(&mut self, timeout: Duration) -> impl Future<Output = PollOutcome> + Send;

    /// Tear down and reinitialize against the configured address.
    fn reconnect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Release the endpoint for good.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// The real endpoint: one TCP or Unix socket to the aggregator.
pub struct ConnectionManager {
    address: Address,
    stream: Option<Stream>,
    buffer: MessageBuffer,
    ready: VecDeque<Message>,
    read_buf: Vec<u8>,
    connect_timeout: Duration,
    terminated: bool,
}

impl ConnectionManager {
    /// Initialize the endpoint.
    ///
    /// Fails only if the address is malformed. Name resolution happens at
    /// connect time, so a host that is not resolvable yet is a timeout.
    pub fn open(address: Address) -> Result<Self> {
        address.validate()?;
        tracing::debug!(%address, "endpoint initialized");
        Ok(Self {
            address,
            stream: None,
            buffer: MessageBuffer::new(),
            ready: VecDeque::new(),
            read_buf: vec![0u8; READ_BUFFER_SIZE],
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            terminated: false,
        })
    }

    /// Set the bound on a single connect attempt.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connect if there is no live socket. Returns whether one is live.
    async fn ensure_connected(&mut self) -> bool {
        if self.stream.is_some() {
            return true;
        }
        match tokio::time::timeout(self.connect_timeout, Stream::connect(&self.address)).await {
            Ok(Ok(stream)) => {
                tracing::debug!(address = %self.address, "connected");
                self.stream = Some(stream);
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(address = %self.address, error = %e, "connect failed");
                false
            }
            Err(_) => {
                tracing::warn!(address = %self.address, "connect timed out");
                false
            }
        }
    }

    /// Drop the socket and anything partially received on it.
    async fn drop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.buffer.clear();
        self.ready.clear();
    }
}

impl Endpoint for ConnectionManager {
    async fn send_request(&mut self, options: &str) -> Result<()> {
        if self.terminated {
            return Err(ReceiverError::Terminated);
        }

        if !self.ensure_connected().await {
            return Ok(());
        }

        if self.address.mode == SocketMode::Subscribe {
            tracing::debug!("subscribe mode, waiting for pushed data");
            return Ok(());
        }

        // A reply still queued from the last exchange is stale now.
        if !self.ready.is_empty() {
            tracing::debug!(stale = self.ready.len(), "discarding unsolicited replies");
            self.ready.clear();
        }

        tracing::debug!(request = %options, "sending request");
        let request = Message::request(options);
        let sent = match self.stream.as_mut() {
            Some(stream) => stream.write_message(&request).await,
            None => return Ok(()),
        };
        if let Err(e) = sent {
            tracing::warn!(address = %self.address, error = %e, "request not delivered");
            self.drop_stream().await;
        }
        Ok(())
    }

    async fn poll_for_response(&mut self, timeout: Duration) -> PollOutcome {
        if self.terminated {
            return PollOutcome::Fatal(ReceiverError::Terminated);
        }
        if let Some(message) = self.ready.pop_front() {
            return PollOutcome::DataReady(message);
        }

        let deadline = Instant::now() + timeout;

        loop {
            let Some(stream) = self.stream.as_mut() else {
                tokio::time::sleep_until(deadline).await;
                return PollOutcome::TimedOut;
            };

            let n = match tokio::time::timeout_at(deadline, stream.read(&mut self.read_buf)).await {
                Err(_) => return PollOutcome::TimedOut,
                Ok(Ok(0)) => {
                    tracing::debug!(address = %self.address, "peer closed the connection");
                    self.drop_stream().await;
                    continue;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::warn!(address = %self.address, error = %e, "read failed");
                    self.drop_stream().await;
                    continue;
                }
            };

            match self.buffer.push(&self.read_buf[..n]) {
                Ok(messages) => self.ready.extend(messages),
                Err(e) => {
                    tracing::warn!(address = %self.address, error = %e, "dropping corrupt stream");
                    self.drop_stream().await;
                    continue;
                }
            }

            if let Some(message) = self.ready.pop_front() {
                return PollOutcome::DataReady(message);
            }
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        if self.terminated {
            return Err(ReceiverError::Terminated);
        }
        self.drop_stream().await;
        self.address
            .validate()
            .map_err(|e| ReceiverError::Reconnect {
                address: self.address.to_string(),
                source: Box::new(e),
            })?;
        tracing::debug!(address = %self.address, "endpoint reinitialized");
        Ok(())
    }

    async fn close(&mut self) {
        self.drop_stream().await;
        self.terminated = true;
    }
}
