//! Connector health checks

use crate::error::{Error, Result};
use serde::Serialize;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Outcome of [`Connector::get_status`](super::Connector::get_status).
///
/// `None` means unknown: the default status carries no details and no error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectorStatus {
    pub status: Option<bool>,
    pub details: Vec<(String, Option<bool>)>,
    pub error: Option<String>,
}

/// Ordered checks: the first failure marks itself false and stops the rest,
/// which stay unknown.
#[derive(Debug, Default)]
pub struct StatusChecks {
    details: Vec<(String, Option<bool>)>,
    error: Option<String>,
}

impl StatusChecks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `check` unless an earlier one failed
    #[must_use]
    pub fn check(mut self, label: &str, check: impl FnOnce() -> Result<()>) -> Self {
        let outcome = if self.error.is_some() {
            None
        } else {
            match check() {
                Ok(()) => Some(true),
                Err(e) => {
                    self.error = Some(e.to_string());
                    Some(false)
                }
            }
        };
        self.details.push((label.to_string(), outcome));
        self
    }

    pub fn finish(self) -> ConnectorStatus {
        ConnectorStatus {
            status: Some(self.error.is_none()),
            details: self.details,
            error: self.error,
        }
    }
}

fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::connection(host, format!("hostname could not be resolved: {e}")))?
        .collect();
    if addrs.is_empty() {
        return Err(Error::connection(host, "hostname could not be resolved"));
    }
    Ok(addrs)
}

/// Check that `host` resolves to at least one address
pub fn check_hostname(host: &str) -> Result<()> {
    resolve(host, 0).map(|_| ())
}

/// Check that a TCP connection to `host:port` can be opened
pub fn check_port(host: &str, port: u16, timeout: Duration) -> Result<()> {
    let mut last_error = None;
    for addr in resolve(host, port)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return Ok(()),
            Err(e) => last_error = Some(e),
        }
    }
    let reason = last_error.map_or_else(|| "no address".to_string(), |e| e.to_string());
    Err(Error::connection(
        format!("{host}:{port}"),
        format!("port is not opened: {reason}"),
    ))
}
