//! Collector Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the collector workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all workspace members:
//!
//! - **Error Handling**: The collector error taxonomy and result alias
//! - **Logging**: Console/file `tracing` setup with a process-lifetime guard
//! - **Types**: The normalized record envelope published to the broker
//!
//! # Example
//!
//! ```no_run
//! use collector_common::types::NormalizedRecord;
//! use collector_common::Result;
//!
//! fn decode(payload: &[u8]) -> Result<NormalizedRecord> {
//!     Ok(serde_json::from_slice(payload)?)
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CollectorError, Result};
pub use types::NormalizedRecord;
