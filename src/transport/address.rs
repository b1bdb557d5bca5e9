//! Endpoint address parsing.
//!
//! Format: `MODE>scheme://target`, e.g. `REQ>tcp://localhost:60201`.
//!
//! - `REQ`: request/reply; a request is sent every cycle
//! - `SUB`: subscribe; the aggregator pushes on its own schedule
//!
//! Schemes: `tcp://host:port` everywhere, `ipc:///path` on unix.

use std::fmt;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ReceiverError, Result};

/// How the endpoint talks to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketMode {
    /// Send a request, wait for one reply.
    Request,
    /// Wait for pushed messages; never send.
    Subscribe,
}

impl SocketMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocketMode::Request => "REQ",
            SocketMode::Subscribe => "SUB",
        }
    }
}

/// Where the endpoint connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Tcp { host: String, port: u16 },
    #[cfg(unix)]
    Ipc(PathBuf),
}

/// Parsed endpoint address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub mode: SocketMode,
    pub target: Target,
}

impl Address {
    /// Check that the address still round-trips through its textual form.
    ///
    /// Does not touch DNS; a host that does not resolve right now is valid.
    pub fn validate(&self) -> Result<()> {
        self.to_string().parse::<Address>().map(|_| ())
    }

    /// Resolve a TCP target to socket addresses.
    ///
    /// IPC targets resolve to an empty list; their path is used directly.
    pub async fn resolve(&self) -> Result<Vec<SocketAddr>> {
        match &self.target {
            Target::Tcp { host, port } => {
                let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|e| ReceiverError::Address(format!("{self}: {e}")))?
                    .collect();
                if addrs.is_empty() {
                    return Err(ReceiverError::Address(format!(
                        "{self}: host resolved to no addresses"
                    )));
                }
                Ok(addrs)
            }
            #[cfg(unix)]
            Target::Ipc(_) => Ok(Vec::new()),
        }
    }
}

impl FromStr for Address {
    type Err = ReceiverError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| ReceiverError::Address(format!("\"{s}\": {why}"));

        let (mode, endpoint) = s
            .split_once('>')
            .ok_or_else(|| invalid("expected MODE>scheme://target"))?;

        let mode = match mode.trim().to_ascii_uppercase().as_str() {
            "REQ" => SocketMode::Request,
            "SUB" => SocketMode::Subscribe,
            other => return Err(invalid(&format!("unsupported socket mode \"{other}\""))),
        };

        let (scheme, rest) = endpoint
            .trim()
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;

        let target = match scheme {
            "tcp" => {
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| invalid("tcp address needs host:port"))?;
                if host.is_empty() {
                    return Err(invalid("empty host"));
                }
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid(&format!("bad port \"{port}\"")))?;
                let host = host.trim_start_matches('[').trim_end_matches(']');
                Target::Tcp {
                    host: host.to_string(),
                    port,
                }
            }
            #[cfg(unix)]
            "ipc" => {
                if rest.is_empty() {
                    return Err(invalid("empty ipc path"));
                }
                Target::Ipc(PathBuf::from(rest))
            }
            other => return Err(invalid(&format!("unsupported scheme \"{other}\""))),
        };

        Ok(Address { mode, target })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Tcp { host, port } if host.contains(':') => {
                write!(f, "{}>tcp://[{}]:{}", self.mode.as_str(), host, port)
            }
            Target::Tcp { host, port } => {
                write!(f, "{}>tcp://{}:{}", self.mode.as_str(), host, port)
            }
            #[cfg(unix)]
            Target::Ipc(path) => write!(f, "{}>ipc://{}", self.mode.as_str(), path.display()),
        }
    }
}
