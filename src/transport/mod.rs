//! Transport module - endpoint addresses and connected streams.
//!
//! Provides abstraction over:
//! - TCP sockets
//! - Unix Domain Sockets (`ipc://`, unix only)

mod address;
mod stream;

pub use address::{Address, SocketMode, Target};
pub use stream::Stream;
