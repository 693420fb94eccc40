//! teebridge - a transparent TCP bridge that journals all traffic
//!
//! # Architecture (Tee-and-Relay)
//!
//! ```text
//! source socket ──read──▶ source journal ──read-back──▶ destination socket
//! destination socket ──read──▶ destination journal ──read-back──▶ source socket
//! ```
//!
//! Every accepted connection gets a Bridge: a pair of half-duplex pipes
//! sharing two sockets and two append-only journal files. Forwarding reads
//! back from the journals rather than from memory, so the on-disk files are
//! both the capture and the buffer, and peak memory stays bounded by one
//! chunk regardless of backlog.
//!
//! ## Core Principles
//!
//! - All socket I/O is non-blocking; a single readiness loop per bridge
//!   recomputes its interest masks after every dispatch
//! - Half-closes propagate in causal order: producer EOF, then flush, then
//!   consumer write-half shutdown
//! - A bridge owns its four resources exclusively for its whole lifetime
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── journal.rs       # Append-only byte log with independent read cursor
//! ├── bridge/          # Bridge engine: half-duplex pipes + readiness loop
//! ├── config.rs        # Invocation config, endpoint resolution
//! └── app/             # Application: Runtime, listeners, intake
//! ```

pub mod app;
pub mod bridge;
pub mod config;
pub mod error;
pub mod journal;

// Re-exports for convenience
pub use app::Runtime;
pub use bridge::{Bridge, HalfPipe};
pub use config::Config;
pub use error::{Error, Result};
pub use journal::{Drain, Journal};
