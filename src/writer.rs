//! Recording write-path: turns a live exchange into a scenario file.

use crate::error::RecordingError;
use crate::filing::FilingPolicy;
use crate::http::{HttpRequest, HttpResponse};
use crate::mapper::Mapper;
use crate::scenario::RecordedExchange;
use crate::store::ScenarioSink;
use std::sync::Arc;
use tracing::{info, warn};

/// Persists live exchanges as replayable scenarios.
pub struct RequestWriter {
    policy: Arc<dyn FilingPolicy>,
    mapper: Arc<dyn Mapper>,
    sink: Arc<dyn ScenarioSink>,
    /// Surface write failures instead of swallowing them
    fail_on_error: bool,
}

/// What happened to a recording attempt that did not raise an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Scenario written under this identifier
    Written(String),
    /// Write failed and was swallowed
    Skipped(String),
}

impl RequestWriter {
    pub fn new(
        policy: Arc<dyn FilingPolicy>,
        mapper: Arc<dyn Mapper>,
        sink: Arc<dyn ScenarioSink>,
    ) -> Self {
        Self {
            policy,
            mapper,
            sink,
            fail_on_error: false,
        }
    }

    pub fn fail_on_error(mut self, fail: bool) -> Self {
        self.fail_on_error = fail;
        self
    }

    pub fn fails_on_error(&self) -> bool {
        self.fail_on_error
    }

    /// Record one exchange.
    ///
    /// Failures only become an `Err` when the writer was built with
    /// `fail_on_error(true)`; otherwise they are logged and reported as
    /// [`RecordOutcome::Skipped`].
    pub async fn record(
        &self,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> Result<RecordOutcome, RecordingError> {
        let id = self.policy.file_name(request);

        match self.write_exchange(&id, request, response).await {
            Ok(()) => {
                info!(
                    file = %id,
                    method = %request.method,
                    status = response.status,
                    "Exchange recorded"
                );
                Ok(RecordOutcome::Written(id))
            }
            Err(e) if self.fail_on_error => Err(e),
            Err(e) => {
                warn!(file = %id, error = %e, "Recording failed, returning live response");
                Ok(RecordOutcome::Skipped(id))
            }
        }
    }

    async fn write_exchange(
        &self,
        id: &str,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> Result<(), RecordingError> {
        let exchange = RecordedExchange {
            request: request.clone(),
            response: response.clone(),
        };
        let mapper = Arc::clone(&self.mapper);
        let sink = Arc::clone(&self.sink);
        let id = id.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), RecordingError> {
            let bytes = mapper.encode(&exchange)?;
            sink.write(&id, &bytes)
                .map_err(|source| RecordingError::Write { id, source })
        })
        .await
        .map_err(|e| RecordingError::Task(e.to_string()))?
    }
}
