//! # overwatch-receiver
//!
//! Long-running client that periodically requests a bundle of named records
//! from a remote aggregator and persists them into timestamped files.
//!
//! ## Architecture
//!
//! - **Transport**: one TCP (or Unix) endpoint, request/reply or subscribe
//! - **Protocol**: multi-part messages of 13-byte-header frames
//! - **Decoding**: metadata, schema and payload frames through a [`codec::RecordCodec`]
//! - **Output**: one container per batch, written atomically
//!
//! ## Example
//!
//! ```ignore
//! use clap::Parser;
//! use overwatch_receiver::{ReceiverArgs, ReceiverConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ReceiverConfig::new(&ReceiverArgs::parse()).unwrap();
//!     overwatch_receiver::run(&config, CancellationToken::new())
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod error;
pub mod heartbeat;
pub mod output;
pub mod protocol;
pub mod record;
pub mod receiver;
pub mod state;
pub mod transport;

pub use config::{ReceiverArgs, ReceiverConfig};
pub use connection::{ConnectionManager, Endpoint, PollOutcome};
pub use error::ReceiverError;
pub use receiver::{run, Receiver};
