//! Invocation configuration and endpoint resolution
//!
//! teebridge is configured entirely by its four positional arguments:
//! the endpoint to listen on and the endpoint to bridge every accepted
//! connection to. Both are kept as the host/service strings the user gave
//! and resolved lazily, so a hostname can map to several listening
//! addresses.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::net::lookup_host;

use crate::error::{Error, Result};

/// Parsed invocation: where to listen, where to bridge to, where journals go.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to listen on.
    pub source_host: String,
    /// Service (port) to listen on.
    pub source_service: String,
    /// Host every accepted connection is bridged to.
    pub destination_host: String,
    /// Service (port) on the destination host.
    pub destination_service: String,
    /// Directory journal files are created in.
    pub journal_dir: PathBuf,
}

impl Config {
    pub fn new(
        source_host: impl Into<String>,
        source_service: impl Into<String>,
        destination_host: impl Into<String>,
        destination_service: impl Into<String>,
    ) -> Self {
        Self {
            source_host: source_host.into(),
            source_service: source_service.into(),
            destination_host: destination_host.into(),
            destination_service: destination_service.into(),
            journal_dir: PathBuf::from("."),
        }
    }

    /// Override the directory journal files are created in.
    /// The default is the process working directory.
    pub fn with_journal_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.journal_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Resolve the listening endpoint. A hostname may yield several
    /// addresses; a listener is started on each.
    pub async fn resolve_source(&self) -> Result<Vec<SocketAddr>> {
        resolve(&self.source_host, &self.source_service).await
    }

    /// Resolve the destination endpoint. The first resolved address is used
    /// for all outbound connections.
    pub async fn resolve_destination(&self) -> Result<SocketAddr> {
        let addrs = resolve(&self.destination_host, &self.destination_service).await?;
        Ok(addrs[0])
    }
}

/// Resolve a host/service pair to stream socket addresses.
async fn resolve(host: &str, service: &str) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = lookup_host(format!("{}:{}", host, service))
        .await
        .map_err(|e| {
            Error::Resolve(format!(
                "unable to look up node '{}' service '{}': {}",
                host, service, e
            ))
        })?
        .collect();

    if addrs.is_empty() {
        return Err(Error::Resolve(format!(
            "no valid addresses found for node '{}' service '{}'",
            host, service
        )));
    }

    Ok(addrs)
}
