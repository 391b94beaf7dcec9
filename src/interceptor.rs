//! Mode-dependent dispatch of intercepted requests.

use crate::config::LogSettings;
use crate::error::{ConfigError, InterceptError};
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::mode::{Mode, ModeSwitch};
use crate::provider::ScenarioProvider;
use crate::scenario::ResponseDescriptor;
use crate::writer::{RecordOutcome, RequestWriter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Mock response interceptor
///
/// Sits between an HTTP client and the network. Depending on the current
/// [`Mode`] it forwards requests, answers them from scenario providers, or
/// records live exchanges.
pub struct MockResponseInterceptor {
    /// Consulted in order; the first response wins
    providers: Vec<Arc<dyn ScenarioProvider>>,
    mode: ModeSwitch,
    writer: Option<RequestWriter>,
    /// Applied to mocked responses without their own delay
    delay: Duration,
    record_mixed_fallback: bool,
    settings: LogSettings,
    requests_total: AtomicU64,
    requests_mocked: AtomicU64,
    requests_unmatched: AtomicU64,
    requests_live: AtomicU64,
    recordings_written: AtomicU64,
    recordings_failed: AtomicU64,
}

/// Snapshot of the interceptor's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterceptorStats {
    pub total: u64,
    pub mocked: u64,
    pub unmatched: u64,
    pub live: u64,
    pub recorded: u64,
    pub recording_failures: u64,
}

impl MockResponseInterceptor {
    pub(crate) fn from_parts(
        providers: Vec<Arc<dyn ScenarioProvider>>,
        mode: Mode,
        writer: Option<RequestWriter>,
        delay: Duration,
        record_mixed_fallback: bool,
        settings: LogSettings,
    ) -> Self {
        info!(
            providers = providers.len(),
            mode = %mode,
            recording = writer.is_some(),
            delay_ms = delay.as_millis() as u64,
            "Mock response interceptor initialized"
        );

        Self {
            providers,
            mode: ModeSwitch::new(mode),
            writer,
            delay,
            record_mixed_fallback,
            settings,
            requests_total: AtomicU64::new(0),
            requests_mocked: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
            requests_live: AtomicU64::new(0),
            recordings_written: AtomicU64::new(0),
            recordings_failed: AtomicU64::new(0),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    /// Switch modes between requests. Requests already in flight finish under
    /// the mode they started with.
    pub fn set_mode(&self, mode: Mode) -> Result<Mode, ConfigError> {
        if mode == Mode::Record && self.writer.is_none() {
            return Err(ConfigError::MissingStorageRoot);
        }
        let previous = self.mode.set(mode);
        info!(from = %previous, to = %mode, "Interceptor mode changed");
        Ok(previous)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Provider names in evaluation order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn is_recording_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn stats(&self) -> InterceptorStats {
        InterceptorStats {
            total: self.requests_total.load(Ordering::Relaxed),
            mocked: self.requests_mocked.load(Ordering::Relaxed),
            unmatched: self.requests_unmatched.load(Ordering::Relaxed),
            live: self.requests_live.load(Ordering::Relaxed),
            recorded: self.recordings_written.load(Ordering::Relaxed),
            recording_failures: self.recordings_failed.load(Ordering::Relaxed),
        }
    }

    /// Handle one intercepted request.
    pub async fn intercept(
        &self,
        request: &HttpRequest,
        transport: &dyn Transport,
    ) -> Result<HttpResponse, InterceptError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        match self.mode.get() {
            Mode::Disabled => self.forward(request, transport).await,

            Mode::Enabled => match self.resolve(request).await? {
                Some(response) => Ok(self.serve(response).await),
                None => {
                    self.note_unmatched(request);
                    Err(InterceptError::NoMatch {
                        method: request.method.clone(),
                        url: request.url.clone(),
                    })
                }
            },

            Mode::Mixed => match self.resolve(request).await? {
                Some(response) => Ok(self.serve(response).await),
                None => {
                    self.note_unmatched(request);
                    let live = self.forward(request, transport).await?;
                    if self.record_mixed_fallback {
                        self.record(request, &live).await?;
                    }
                    Ok(live)
                }
            },

            Mode::Record => {
                let live = self.forward(request, transport).await?;
                self.record(request, &live).await?;
                Ok(live)
            }
        }
    }

    /// Ask each provider in turn; stop at the first answer.
    pub(crate) async fn resolve(
        &self,
        request: &HttpRequest,
    ) -> Result<Option<ResponseDescriptor>, InterceptError> {
        for provider in &self.providers {
            if let Some(response) = provider.resolve(request).await? {
                if self.settings.log_matches {
                    info!(
                        provider = provider.name(),
                        method = %request.method,
                        path = %request.path(),
                        status = response.status,
                        "Request matched scenario"
                    );
                }
                return Ok(Some(response));
            }
            debug!(provider = provider.name(), "Provider had no response");
        }
        Ok(None)
    }

    /// Delay actually applied to a mocked response.
    pub fn effective_delay(&self, response: &ResponseDescriptor) -> Duration {
        response.delay.unwrap_or(self.delay)
    }

    async fn serve(&self, response: ResponseDescriptor) -> HttpResponse {
        self.requests_mocked.fetch_add(1, Ordering::Relaxed);
        let delay = self.effective_delay(&response);
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Applying delay");
            tokio::time::sleep(delay).await;
        }
        response.into_response()
    }

    async fn forward(
        &self,
        request: &HttpRequest,
        transport: &dyn Transport,
    ) -> Result<HttpResponse, InterceptError> {
        self.requests_live.fetch_add(1, Ordering::Relaxed);
        Ok(transport.send(request).await?)
    }

    async fn record(
        &self,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> Result<(), InterceptError> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };

        match writer.record(request, response).await {
            Ok(RecordOutcome::Written(_)) => {
                self.recordings_written.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(RecordOutcome::Skipped(_)) => {
                self.recordings_failed.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.recordings_failed.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            }
        }
    }

    fn note_unmatched(&self, request: &HttpRequest) {
        self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
        if self.settings.log_unmatched {
            warn!(
                method = %request.method,
                url = %request.url,
                mode = %self.mode.get(),
                "No matching scenario found"
            );
        }
    }
}
