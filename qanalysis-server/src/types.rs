//! Request and response records for the HTTP API.
//!
//! The flat `ProblemData` / `AnalysisData` records serve `/solve` and
//! `/target`: a single decode coefficient pair, rates in requests per minute,
//! and queueing times in seconds. The structured records serve `/analyze` and
//! `/size` with the full prefill/decode parameter set.

use qanalysis_core::{
    AnalysisMetrics, MAX_CAPACITY, QueueConfig, RequestSize, SizingResult, TargetPerf, TargetRate,
};
use serde::{Deserialize, Serialize};

/// Flat problem description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemData {
    /// Request arrival rate (requests/min).
    #[serde(rename = "RPM", default)]
    pub rpm: f64,
    #[serde(rename = "maxBatchSize")]
    pub max_batch_size: i64,
    /// Average number of output tokens per request.
    #[serde(rename = "avgNumTokens")]
    pub avg_num_tokens: i64,
    /// tau(n) = alpha + n * beta (msec)
    pub alpha: f64,
    pub beta: f64,
    #[serde(rename = "maxQueueSize", default)]
    pub max_queue_size: i64,
    /// Target queueing time (sec).
    #[serde(rename = "targetWait", default)]
    pub target_wait: f64,
    /// Target inter-token interval (msec).
    #[serde(rename = "targetITL", default)]
    pub target_itl: f64,
}

impl ProblemData {
    /// Range checks shared by both flat endpoints.
    pub fn validate(&self) -> Result<(), String> {
        let checks = [
            (self.rpm.is_finite() && self.rpm >= 0.0, "RPM must be non-negative"),
            (self.max_batch_size > 0, "maxBatchSize must be positive"),
            (self.avg_num_tokens > 0, "avgNumTokens must be positive"),
            (
                self.alpha.is_finite() && self.alpha >= 0.0,
                "alpha must be non-negative",
            ),
            (
                self.beta.is_finite() && self.beta >= 0.0,
                "beta must be non-negative",
            ),
            (self.alpha + self.beta > 0.0, "alpha and beta cannot both be zero"),
            (self.max_queue_size >= 0, "maxQueueSize must be non-negative"),
            (
                self.max_batch_size.saturating_add(self.max_queue_size) <= MAX_CAPACITY as i64,
                "maxBatchSize plus maxQueueSize exceeds the capacity limit",
            ),
            (
                self.target_wait.is_finite() && self.target_wait >= 0.0,
                "targetWait must be non-negative",
            ),
            (
                self.target_itl.is_finite() && self.target_itl >= 0.0,
                "targetITL must be non-negative",
            ),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, reason)) => Err((*reason).to_string()),
            None => Ok(()),
        }
    }
}

/// Flat analysis result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisData {
    /// Effective throughput (requests/min).
    pub throughput: f64,
    /// Average response time (sec).
    #[serde(rename = "avgRespTime")]
    pub avg_resp_time: f64,
    /// Average queueing time (sec).
    #[serde(rename = "avgWaitTime")]
    pub avg_wait_time: f64,
    /// Average number of requests in service.
    #[serde(rename = "avgNumInServ")]
    pub avg_num_in_serv: f64,
    /// Average time per output token (msec).
    #[serde(rename = "avgTokenTime")]
    pub avg_token_time: f64,
    /// Maximum sustainable rate (requests/min).
    #[serde(rename = "maxRPM")]
    pub max_rpm: f64,
    /// Rate meeting the queueing-time target alone (requests/min).
    #[serde(rename = "RPMTargetWait")]
    pub rpm_target_wait: f64,
    /// Rate meeting the ITL target alone (requests/min).
    #[serde(rename = "RPMTargetITL")]
    pub rpm_target_itl: f64,
}

impl AnalysisData {
    pub fn from_metrics(metrics: &AnalysisMetrics, avg_num_tokens: f64) -> Self {
        Self {
            throughput: metrics.throughput * 60.0,
            avg_resp_time: metrics.avg_resp_time / 1000.0,
            avg_wait_time: metrics.avg_wait_time / 1000.0,
            avg_num_in_serv: metrics.avg_num_in_serv,
            avg_token_time: metrics.avg_serv_time / avg_num_tokens,
            max_rpm: metrics.max_rate * 60.0,
            rpm_target_wait: 0.0,
            rpm_target_itl: 0.0,
        }
    }
}

/// Structured analysis request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Server configuration; the served defaults apply when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueConfig>,
    #[serde(default)]
    pub request: RequestSize,
    /// Request arrival rate (requests/sec).
    pub rate: f64,
}

/// Structured sizing request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SizeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueConfig>,
    #[serde(default)]
    pub request: RequestSize,
    pub targets: TargetPerf,
}

/// Structured sizing response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeResponse {
    /// Binding rate (requests/sec).
    pub rate: f64,
    pub binding: String,
    pub metrics: AnalysisMetrics,
    pub achieved: TargetPerf,
    pub per_target: Vec<TargetRate>,
}

impl From<SizingResult> for SizeResponse {
    fn from(result: SizingResult) -> Self {
        Self {
            rate: result.rate,
            binding: result.binding.to_string(),
            metrics: result.metrics,
            achieved: result.achieved,
            per_target: result.per_target,
        }
    }
}
