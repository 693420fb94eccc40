//! The per-connection bridging engine
//!
//! A [`Bridge`] owns an accepted source connection, the paired outbound
//! destination connection, and one journal per direction. Each direction is
//! a [`HalfPipe`]; the bridge drives both from a single readiness loop,
//! recomputing each socket's interest mask after every dispatch:
//!
//! ```text
//! source socket interest      = source-pipe read ∪ destination-pipe write
//! destination socket interest = destination-pipe read ∪ source-pipe write
//! ```
//!
//! The bridge lives until both pipes have terminated (EOF received and
//! backlog flushed in both directions), then releases all four resources.

pub mod pipe;

pub use pipe::HalfPipe;

use std::io;
use std::net::SocketAddr;
use std::path::Path;

use tokio::io::Interest;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::journal::Journal;

/// A bridge between one accepted connection and one outbound connection,
/// journaling both directions.
pub struct Bridge {
    source: TcpStream,
    destination: TcpStream,
    /// source → destination
    inbound: HalfPipe,
    /// destination → source
    outbound: HalfPipe,
    peer: SocketAddr,
}

impl Bridge {
    /// Bridges an accepted connection to `destination` until both
    /// directions have terminated.
    ///
    /// Connects outbound, opens the source journal (named after the source
    /// peer address) and the destination journal (named after the local
    /// address of the outbound socket), then runs the readiness loop. Any
    /// setup failure cleans up whatever was acquired; the source connection
    /// is closed either way once this returns.
    pub async fn start(
        source: TcpStream,
        peer: SocketAddr,
        destination: SocketAddr,
        journal_dir: &Path,
    ) -> Result<()> {
        let outbound = TcpStream::connect(destination).await.map_err(|e| {
            Error::Connect(format!("unable to connect to {}: {}", destination, e))
        })?;
        let local = outbound.local_addr()?;

        let source_journal = Journal::open(journal_dir, &peer.to_string()).map_err(|e| {
            Error::Journal(format!("unable to open journal for {}: {}", peer, e))
        })?;
        let destination_journal = Journal::open(journal_dir, &local.to_string()).map_err(|e| {
            Error::Journal(format!("unable to open journal for {}: {}", local, e))
        })?;

        debug!("bridging {} -> {} (outbound local {})", peer, destination, local);

        let bridge = Bridge {
            source,
            destination: outbound,
            inbound: HalfPipe::new(source_journal, "source -> destination"),
            outbound: HalfPipe::new(destination_journal, "destination -> source"),
            peer,
        };
        bridge.run().await
    }

    /// Readiness loop: wait for either socket to become ready for its
    /// current interest, run both pipes, repeat until neither socket has
    /// any interest left.
    async fn run(mut self) -> Result<()> {
        loop {
            let source_interest =
                interest_union(self.inbound.wants_read(), self.outbound.wants_write());
            let destination_interest =
                interest_union(self.outbound.wants_read(), self.inbound.wants_write());

            if source_interest.is_none() && destination_interest.is_none() {
                break;
            }

            tokio::select! {
                ready = ready_for(&self.source, source_interest),
                    if source_interest.is_some() =>
                {
                    ready?;
                }
                ready = ready_for(&self.destination, destination_interest),
                    if destination_interest.is_some() =>
                {
                    ready?;
                }
            }

            // Fixed order: source → destination first.
            self.inbound.step(&self.source, &self.destination)?;
            self.outbound.step(&self.destination, &self.source)?;
        }

        info!(
            "closed {}: ↑{} ↓{}",
            self.peer,
            format_bytes(self.inbound.total_bytes()),
            format_bytes(self.outbound.total_bytes()),
        );

        Ok(())
    }
}

/// Combine a pipe's read-interest and the opposite pipe's write-interest
/// into one socket's interest mask.
fn interest_union(read: bool, write: bool) -> Option<Interest> {
    match (read, write) {
        (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        (true, false) => Some(Interest::READABLE),
        (false, true) => Some(Interest::WRITABLE),
        (false, false) => None,
    }
}

async fn ready_for(stream: &TcpStream, interest: Option<Interest>) -> io::Result<()> {
    match interest {
        Some(interest) => stream.ready(interest).await.map(|_| ()),
        // Guarded out in the select; never polled.
        None => std::future::pending().await,
    }
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_union_covers_all_cases() {
        assert_eq!(interest_union(false, false), None);
        assert_eq!(interest_union(true, false), Some(Interest::READABLE));
        assert_eq!(interest_union(false, true), Some(Interest::WRITABLE));
        assert_eq!(
            interest_union(true, true),
            Some(Interest::READABLE | Interest::WRITABLE)
        );
    }

    #[test]
    fn format_bytes_picks_unit() {
        assert_eq!(format_bytes(11), "11B");
        assert_eq!(format_bytes(2048), "2.00KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00MB");
    }
}
