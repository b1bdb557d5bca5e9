//! Connected byte stream to the aggregator.
//!
//! - TCP: `tokio::net::TcpStream` (no Nagle; requests are tiny)
//! - Unix: Unix Domain Socket for `ipc://` targets
//!
//! # Example
//!
//! ```ignore
//! use overwatch_receiver::transport::{Address, Stream};
//!
//! let address: Address = "REQ>tcp://localhost:60201".parse()?;
//! let stream = Stream::connect(&address).await?;
//! ```

use std::io::IoSlice;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

use super::address::{Address, Target};
use crate::error::{ReceiverError, Result};
use crate::protocol::{Message, HEADER_SIZE};

/// A connected stream, TCP or Unix socket.
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Connect to the address, trying every resolved socket address in turn.
    pub async fn connect(address: &Address) -> Result<Self> {
        match &address.target {
            Target::Tcp { .. } => {
                let mut last_err = None;
                for addr in address.resolve().await? {
                    match TcpStream::connect(addr).await {
                        Ok(stream) => {
                            stream.set_nodelay(true)?;
                            return Ok(Stream::Tcp(stream));
                        }
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(last_err
                    .map(ReceiverError::Io)
                    .unwrap_or_else(|| ReceiverError::Address(address.to_string())))
            }
            #[cfg(unix)]
            Target::Ipc(path) => Ok(Stream::Unix(UnixStream::connect(path).await?)),
        }
    }

    /// Write every frame of a message.
    ///
    /// Uses scatter/gather I/O: one header slice plus one payload slice per
    /// frame, resuming after partial writes.
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        let frames = message.frames();
        let last = frames.len().saturating_sub(1);
        let headers: Vec<[u8; HEADER_SIZE]> = frames
            .iter()
            .enumerate()
            .map(|(i, f)| f.header(i < last).encode())
            .collect();

        let mut parts: Vec<&[u8]> = Vec::with_capacity(frames.len() * 2);
        for (header, frame) in headers.iter().zip(frames) {
            parts.push(header);
            if !frame.payload.is_empty() {
                parts.push(&frame.payload);
            }
        }

        let total_size = message.encoded_len();
        let mut total_written = 0;

        while total_written < total_size {
            let slices = remaining_slices(&parts, total_written);
            let written = self.write_vectored(&slices).await?;
            if written == 0 {
                return Err(ReceiverError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "write_vectored returned 0",
                )));
            }
            total_written += written;
        }

        self.flush().await?;
        Ok(())
    }
}

/// Build IoSlices for the bytes not yet written.
fn remaining_slices<'a>(parts: &[&'a [u8]], skip_bytes: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(parts.len());
    let mut skipped = 0;

    for part in parts {
        let end = skipped + part.len();
        if skip_bytes < end {
            let start = skip_bytes.saturating_sub(skipped);
            slices.push(IoSlice::new(&part[start..]));
        }
        skipped = end;
    }

    slices
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write_vectored(cx, bufs),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Stream::Tcp(s) => s.is_write_vectored(),
            #[cfg(unix)]
            Stream::Unix(s) => s.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
