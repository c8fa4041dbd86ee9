//! # Application State
//!
//! Shared state handed to every request handler: the model handle
//! (initialized once at startup, immutable afterwards), the configuration,
//! and the telemetry counters.

use crate::config::AppConfig;
use crate::transcription::Transcriber;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// The transcription backend, or `None` when startup initialization
    /// failed. Checking presence needs no lock; the handle never changes
    /// after construction.
    transcriber: Option<Arc<dyn Transcriber>>,

    config: Arc<RwLock<AppConfig>>,

    metrics: Arc<RwLock<AppMetrics>>,

    start_time: Instant,
}

/// Counters collected across all requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    /// Transcriptions currently in flight.
    pub active_transcriptions: u32,
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        Self {
            transcriber,
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// The model handle, when startup managed to load one.
    pub fn transcriber(&self) -> Option<&Arc<dyn Transcriber>> {
        self.transcriber.as_ref()
    }

    pub fn model_loaded(&self) -> bool {
        self.transcriber.is_some()
    }

    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn begin_transcription(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_transcriptions += 1;
    }

    pub fn end_transcription(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_transcriptions > 0 {
            metrics.active_transcriptions -= 1;
        }
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_transcriptions: metrics.active_transcriptions,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
