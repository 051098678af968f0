//! One collection cycle: fetch, normalize, publish
//!
//! Failures never escape a cycle. They are logged with the failing stage and
//! reported through [`CycleOutcome`] so the scheduler can carry on.

use crate::fetcher::Fetcher;
use crate::normalizer::{item_count, Normalizer};
use crate::publisher::Publisher;
use collector_common::CollectorError;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// What to request on every cycle
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    /// Suffix appended to the API base URL
    pub endpoint: Option<String>,
    /// Query parameters passed through to the API
    pub params: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint: endpoint.filter(|e| !e.is_empty()),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }
}

/// Stage at which a cycle stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Fetch,
    Publish,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStage::Fetch => write!(f, "fetch"),
            CycleStage::Publish => write!(f, "publish"),
        }
    }
}

/// Result of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { published: usize },
    Failed { stage: CycleStage, error: String },
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Completed { .. })
    }
}

/// Composes fetcher, normalizer and publisher into a cycle
#[derive(Debug, Clone)]
pub struct CycleOrchestrator {
    fetcher: Fetcher,
    normalizer: Normalizer,
    request: FetchRequest,
    extra_metadata: Option<Map<String, Value>>,
}

impl CycleOrchestrator {
    pub fn new(fetcher: Fetcher, normalizer: Normalizer, request: FetchRequest) -> Self {
        Self {
            fetcher,
            normalizer,
            request,
            extra_metadata: None,
        }
    }

    /// Extra metadata merged into every record
    pub fn with_extra_metadata(mut self, extra: Map<String, Value>) -> Self {
        self.extra_metadata = Some(extra);
        self
    }

    pub fn request(&self) -> &FetchRequest {
        &self.request
    }

    /// Run one fetch → normalize → publish pass
    pub async fn run_cycle<P>(&self, publisher: &mut P) -> CycleOutcome
    where
        P: Publisher + ?Sized,
    {
        let span = info_span!("cycle", id = %Uuid::new_v4());

        async move {
            info!("Starting data collection");

            let endpoint = self.request.endpoint.as_deref();
            let params = Some(self.request.params.as_slice()).filter(|p| !p.is_empty());

            let raw = match self.fetcher.fetch(endpoint, params).await {
                Ok(raw) => raw,
                Err(e) => return self.failed(CycleStage::Fetch, e),
            };
            info!(items = item_count(&raw), "Data received");

            let records = self.normalizer.normalize(raw, self.extra_metadata.as_ref());
            info!(records = records.len(), "Data normalized");

            match publisher.publish(&records).await {
                Ok(published) => {
                    info!(published, "Collection finished successfully");
                    CycleOutcome::Completed { published }
                }
                Err(e) => self.failed(CycleStage::Publish, e),
            }
        }
        .instrument(span)
        .await
    }

    fn failed(&self, stage: CycleStage, err: CollectorError) -> CycleOutcome {
        error!(
            stage = %stage,
            endpoint = self.request.endpoint.as_deref().unwrap_or(""),
            error = %err,
            "Collection cycle failed"
        );

        CycleOutcome::Failed {
            stage,
            error: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_endpoint_is_treated_as_none() {
        assert_eq!(FetchRequest::new(Some(String::new())).endpoint, None);
        assert_eq!(
            FetchRequest::new(Some("/items".to_string())).endpoint.as_deref(),
            Some("/items")
        );
    }

    #[test]
    fn test_outcome_success() {
        assert!(CycleOutcome::Completed { published: 0 }.is_success());
        assert!(!CycleOutcome::Failed {
            stage: CycleStage::Fetch,
            error: "boom".to_string()
        }
        .is_success());
        assert_eq!(CycleStage::Publish.to_string(), "publish");
    }
}
