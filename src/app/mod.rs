//! Application Layer
//!
//! This module contains:
//! - Runtime: listener setup and connection intake

mod runtime;

pub use runtime::Runtime;
