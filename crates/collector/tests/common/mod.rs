//! Shared helpers for collector integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use collector::config::ApiSettings;
use collector::fetcher::Fetcher;
use collector::publisher::Publisher;
use collector::retry::RetryPolicy;
use collector_common::{CollectorError, NormalizedRecord, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What happened to a [`RecordingPublisher`], in order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect,
    ConnectFailed,
    Publish(usize),
    Close,
}

#[derive(Debug, Default)]
pub struct PublisherLog {
    pub events: Vec<Event>,
    pub messages: Vec<NormalizedRecord>,
}

impl PublisherLog {
    pub fn connects(&self) -> usize {
        self.events.iter().filter(|e| **e == Event::Connect).count()
    }

    pub fn publishes(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, Event::Publish(_)))
            .count()
    }
}

/// In-memory publisher recording every call
///
/// The log is shared so tests can observe it while a scheduler owns the
/// publisher.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    log: Arc<Mutex<PublisherLog>>,
    connected: bool,
    /// Number of upcoming connect calls that fail
    failing_connects: usize,
    /// Connect always fails
    broker_down: bool,
    /// Publishing the record at this index fails
    fail_at: Option<usize>,
    /// Report a dropped connection after every publish
    drop_after_publish: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn failing_connects(mut self, count: usize) -> Self {
        self.failing_connects = count;
        self
    }

    pub fn broker_down(mut self) -> Self {
        self.broker_down = true;
        self
    }

    pub fn dropping_after_publish(mut self) -> Self {
        self.drop_after_publish = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<PublisherLog>> {
        Arc::clone(&self.log)
    }

    fn record(&self, event: Event) {
        self.log.lock().unwrap().events.push(event);
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }

        if self.broker_down || self.failing_connects > 0 {
            self.failing_connects = self.failing_connects.saturating_sub(1);
            self.record(Event::ConnectFailed);
            return Err(CollectorError::connection_lost("connection refused"));
        }

        self.connected = true;
        self.record(Event::Connect);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn publish(&mut self, records: &[NormalizedRecord]) -> Result<usize> {
        if !self.connected {
            return Err(CollectorError::connection_lost("channel is not open"));
        }

        let mut published = 0;
        for (index, record) in records.iter().enumerate() {
            if self.fail_at == Some(index) {
                self.record(Event::Publish(published));
                return Err(CollectorError::Publish {
                    published,
                    message: "broker nacked message".to_string(),
                });
            }
            self.log.lock().unwrap().messages.push(record.clone());
            published += 1;
        }

        self.record(Event::Publish(published));
        if self.drop_after_publish {
            self.connected = false;
        }
        Ok(published)
    }

    async fn close(&mut self) {
        self.connected = false;
        self.record(Event::Close);
    }
}

pub fn api_settings(url: &str, token: Option<&str>) -> ApiSettings {
    ApiSettings {
        url: url.to_string(),
        token: token.map(String::from),
        timeout_secs: 5,
        endpoint: String::new(),
    }
}

/// Fetcher against `url` with millisecond backoff
pub fn fetcher(url: &str, max_attempts: u32, base_delay_ms: u64) -> Fetcher {
    Fetcher::new(
        &api_settings(url, None),
        RetryPolicy::new(max_attempts, Duration::from_millis(base_delay_ms)),
    )
    .unwrap()
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
