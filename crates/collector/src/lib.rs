//! Collector Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Periodically fetches JSON from an HTTP API, wraps every item in a
//! metadata envelope and publishes the result to an AMQP queue.
//!
//! # Components
//!
//! - **Fetcher**: authenticated GET with bounded exponential-backoff retries
//! - **Normalizer**: one [`NormalizedRecord`] per upstream item
//! - **Publisher**: long-lived broker session with publisher confirms
//! - **Orchestrator**: one fetch → normalize → publish cycle
//! - **Scheduler**: fixed-interval loop with graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use collector::config::Settings;
//! use collector::fetcher::Fetcher;
//! use collector::normalizer::Normalizer;
//! use collector::orchestrator::{CycleOrchestrator, FetchRequest};
//! use collector::publisher::AmqpPublisher;
//! use collector::retry::RetryPolicy;
//! use collector::scheduler::Scheduler;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let fetcher = Fetcher::new(&settings.api, RetryPolicy::from(&settings.retry))?;
//!     let orchestrator =
//!         CycleOrchestrator::new(fetcher, Normalizer::default(), FetchRequest::new(None));
//!     let publisher = AmqpPublisher::new(settings.broker.clone());
//!
//!     let mut scheduler = Scheduler::new(
//!         orchestrator,
//!         publisher,
//!         settings.schedule.interval(),
//!         RetryPolicy::default(),
//!     );
//!     let outcome = scheduler.run_once().await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! [`NormalizedRecord`]: collector_common::NormalizedRecord

pub mod config;
pub mod fetcher;
pub mod normalizer;
pub mod orchestrator;
pub mod publisher;
pub mod retry;
pub mod scheduler;

pub use config::Settings;
pub use orchestrator::{CycleOrchestrator, CycleOutcome, FetchRequest};
pub use publisher::{AmqpPublisher, Publisher};
pub use scheduler::{Scheduler, SchedulerState};
