//! Publishing normalized records to the message broker
//!
//! The [`Publisher`] trait is the seam between the collection cycle and the
//! broker. [`AmqpPublisher`] is the production implementation; tests plug in
//! an in-memory recorder.

pub mod amqp;

pub use amqp::AmqpPublisher;

use async_trait::async_trait;
use collector_common::{NormalizedRecord, Result};

/// A long-lived broker session that accepts batches of records
///
/// Implementations are driven from a single task and borrowed mutably per
/// cycle, so they need no internal locking.
#[async_trait]
pub trait Publisher: Send {
    /// Establish the connection and declare topology. No-op when connected.
    async fn connect(&mut self) -> Result<()>;

    /// Whether the connection and channel are usable
    fn is_connected(&self) -> bool;

    /// Publish records in order, one message each
    ///
    /// Returns the number of records accepted by the broker. A failure on
    /// record `k` aborts the batch with [`CollectorError::Publish`] carrying
    /// `published == k`.
    ///
    /// [`CollectorError::Publish`]: collector_common::CollectorError::Publish
    async fn publish(&mut self, records: &[NormalizedRecord]) -> Result<usize>;

    /// Release the channel and connection; safe to call in any state
    async fn close(&mut self);
}
