//! Queue analyzer for batched LLM inference servers.
//!
//! Rates on the public surface are requests per second and times are in
//! milliseconds. The underlying model runs in requests per millisecond, the
//! unit the service-time coefficients are expressed in.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::model::{BirthDeathModel, QueueStats, ServiceRateProfile};
use crate::search::{Indicator, SearchOptions, binary_search_with};
use crate::service::{RequestSize, ServiceRateComposer};

const MSEC_PER_SEC: f64 = 1000.0;

/// Admissible arrival-rate range (requests/sec).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateRange {
    pub min: f64,
    pub max: f64,
}

/// Performance targets. Absent or zero values are not constrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetPerf {
    /// Average time to first token (msec).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttft: Option<f64>,
    /// Average inter-token latency (msec).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itl: Option<f64>,
    /// Aggregate output tokens per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tps: Option<f64>,
}

impl TargetPerf {
    /// Specified targets in evaluation order.
    fn specified(&self) -> Result<Vec<(TargetMetric, f64)>> {
        let candidates = [
            (TargetMetric::Ttft, self.ttft),
            (TargetMetric::Itl, self.itl),
            (TargetMetric::Tps, self.tps),
        ];
        let mut out = Vec::new();
        for (metric, value) in candidates {
            match value {
                Some(v) if !v.is_finite() || v < 0.0 => {
                    return Err(QueueError::config(format!(
                        "target {} must be non-negative and finite, got {}",
                        metric, v
                    )));
                }
                Some(v) if v > 0.0 => out.push((metric, v)),
                _ => {}
            }
        }
        Ok(out)
    }
}

/// A metric that a target can be placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMetric {
    /// Average waiting time plus prefill time (msec); upper bound.
    Ttft,
    /// Average inter-token latency at the mean batch size (msec); upper bound.
    Itl,
    /// Output tokens per second; demand to be delivered.
    Tps,
    /// Average queueing time (msec); upper bound.
    WaitTime,
    /// Average per-request service time (msec); upper bound.
    ServiceTime,
}

impl TargetMetric {
    /// Latency metrics cap the rate from above; throughput is a demand.
    pub fn is_latency(self) -> bool {
        !matches!(self, Self::Tps)
    }
}

impl fmt::Display for TargetMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ttft => "TTFT",
            Self::Itl => "ITL",
            Self::Tps => "TPS",
            Self::WaitTime => "wait time",
            Self::ServiceTime => "service time",
        };
        f.write_str(name)
    }
}

/// Rate implied by a single target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetRate {
    pub metric: TargetMetric,
    pub target: f64,
    /// Highest admissible rate (requests/sec) meeting the target, or `None`
    /// when no rate in range meets it.
    pub rate: Option<f64>,
    pub indicator: Indicator,
    /// Value of `metric` at the binding rate, filled in by sizing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub achieved: Option<f64>,
}

impl TargetRate {
    pub fn is_feasible(&self) -> bool {
        self.rate.is_some()
    }
}

/// Queue performance at one arrival rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    /// Offered rate (requests/sec).
    pub request_rate: f64,
    /// Accepted rate (requests/sec).
    pub throughput: f64,
    /// Output tokens per second.
    pub tokens_per_sec: f64,
    /// Average response time (msec).
    pub avg_resp_time: f64,
    /// Average queueing time (msec).
    pub avg_wait_time: f64,
    /// Average per-request service time (msec).
    pub avg_serv_time: f64,
    /// Average prefill time at the mean batch size (msec).
    pub avg_prefill_time: f64,
    /// Average time to first token (msec).
    pub avg_ttft: f64,
    /// Average inter-token latency (msec).
    pub avg_token_time: f64,
    /// Average batch size.
    pub avg_num_in_serv: f64,
    pub avg_queue_length: f64,
    pub blocking_probability: f64,
    pub utilization: f64,
    /// Highest admissible rate (requests/sec).
    pub max_rate: f64,
}

impl fmt::Display for AnalysisMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate={:.3}/s; throughput={:.3}/s; tps={:.1}; respTime={:.2}ms; waitTime={:.2}ms; \
             ttft={:.2}ms; itl={:.3}ms; batch={:.2}; queue={:.2}; maxRate={:.3}/s",
            self.request_rate,
            self.throughput,
            self.tokens_per_sec,
            self.avg_resp_time,
            self.avg_wait_time,
            self.avg_ttft,
            self.avg_token_time,
            self.avg_num_in_serv,
            self.avg_queue_length,
            self.max_rate
        )
    }
}

/// Outcome of sizing against a set of targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingResult {
    /// Binding rate (requests/sec): the smallest rate implied by any target.
    pub rate: f64,
    /// The target that determined `rate`.
    pub binding: TargetMetric,
    pub metrics: AnalysisMetrics,
    /// Target metric values reached at the binding rate.
    pub achieved: TargetPerf,
    pub per_target: Vec<TargetRate>,
}

/// Immutable analyzer over one server configuration and request size.
///
/// Every query builds its own model, so an analyzer can be shared freely
/// between threads.
#[derive(Debug, Clone)]
pub struct QueueAnalyzer {
    config: QueueConfig,
    composer: ServiceRateComposer,
    profile: ServiceRateProfile,
    capacity: usize,
    /// Admissible range in requests/msec.
    lambda_min: f64,
    lambda_max: f64,
    search: SearchOptions,
}

impl QueueAnalyzer {
    pub fn new(config: QueueConfig, request_size: RequestSize) -> Result<Self> {
        config.validate()?;
        let composer = ServiceRateComposer::new(config.service, request_size, config.policy)?;
        let profile = composer.compose(config.max_batch_size)?;
        let capacity = config.capacity()?;
        let lambda_min = profile.first() * config.rate_margin;
        let lambda_max = profile.last() * (1.0 - config.rate_margin);
        if lambda_min >= lambda_max {
            return Err(QueueError::config(format!(
                "empty rate range [{}, {}] per msec",
                lambda_min, lambda_max
            )));
        }

        tracing::debug!(
            capacity,
            max_rate = lambda_max * MSEC_PER_SEC,
            "created queue analyzer"
        );
        Ok(Self {
            search: config.search,
            config,
            composer,
            profile,
            capacity,
            lambda_min,
            lambda_max,
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn request_size(&self) -> &RequestSize {
        self.composer.request_size()
    }

    pub fn profile(&self) -> &ServiceRateProfile {
        &self.profile
    }

    /// Maximum number of requests admitted (in service plus queued).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admissible request-rate range (requests/sec).
    pub fn rate_range(&self) -> RateRange {
        RateRange {
            min: self.lambda_min * MSEC_PER_SEC,
            max: self.lambda_max * MSEC_PER_SEC,
        }
    }

    /// A fresh, unsolved model for this configuration.
    pub fn model(&self) -> Result<BirthDeathModel> {
        BirthDeathModel::new(self.capacity, self.profile.clone())
    }

    /// Performance at `request_rate` requests/sec.
    pub fn analyze(&self, request_rate: f64) -> Result<AnalysisMetrics> {
        if !(request_rate.is_finite() && request_rate > 0.0) {
            return Err(QueueError::config(format!(
                "request rate must be positive, got {}",
                request_rate
            )));
        }
        let lambda = request_rate / MSEC_PER_SEC;
        if lambda > self.lambda_max {
            return Err(QueueError::above_maximum(format!(
                "request rate {} exceeds maximum {}",
                request_rate,
                self.lambda_max * MSEC_PER_SEC
            )));
        }

        let mut model = self.model()?;
        let metrics = self.metrics_at(&mut model, lambda)?;
        tracing::debug!(request_rate, throughput = metrics.throughput, "analyzed queue");
        Ok(metrics)
    }

    /// Analyze a series of rates, skipping those above the admissible maximum.
    pub fn sweep<I>(&self, rates: I) -> Result<Vec<AnalysisMetrics>>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut model = self.model()?;
        let mut points = Vec::new();
        for rate in rates {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(QueueError::config(format!(
                    "sweep rate must be positive, got {}",
                    rate
                )));
            }
            let lambda = rate / MSEC_PER_SEC;
            if lambda > self.lambda_max {
                tracing::debug!(rate, "sweep stopped at maximum rate");
                break;
            }
            points.push(self.metrics_at(&mut model, lambda)?);
        }
        Ok(points)
    }

    /// Highest rate in range meeting a single target on `metric`.
    pub fn rate_for_target(&self, metric: TargetMetric, target: f64) -> Result<TargetRate> {
        if !(target.is_finite() && target > 0.0) {
            return Err(QueueError::config(format!(
                "target {} must be positive, got {}",
                metric, target
            )));
        }

        let mut model = self.model()?;
        let found = binary_search_with(&self.search, self.lambda_min, self.lambda_max, target, |lambda| {
            let metrics = self.metrics_at(&mut model, lambda)?;
            Ok::<f64, QueueError>(self.metric_value(metric, &metrics))
        })?;

        // Latency grows with load: above the range means met everywhere.
        // Throughput grows with load: below the range means met at minimum.
        let lambda = match (metric.is_latency(), found.indicator) {
            (_, Indicator::Interior) => Some(found.x),
            (true, Indicator::AboveRange) | (false, Indicator::BelowRange) => Some(found.x),
            (true, Indicator::BelowRange) | (false, Indicator::AboveRange) => None,
        };

        tracing::debug!(
            %metric,
            target,
            indicator = ?found.indicator,
            iterations = found.iterations,
            rate = lambda.map(|l| l * MSEC_PER_SEC),
            "searched rate for target"
        );
        Ok(TargetRate {
            metric,
            target,
            rate: lambda.map(|l| l * MSEC_PER_SEC),
            indicator: found.indicator,
            achieved: None,
        })
    }

    /// Largest request rate meeting every specified target.
    pub fn size(&self, targets: &TargetPerf) -> Result<SizingResult> {
        self.size_for(&targets.specified()?)
    }

    /// Largest request rate meeting every `(metric, target)` pair. The
    /// binding rate is the smallest of the individually feasible rates.
    pub fn size_for(&self, targets: &[(TargetMetric, f64)]) -> Result<SizingResult> {
        if targets.is_empty() {
            return Err(QueueError::config("no target specified"));
        }

        let mut per_target = targets
            .iter()
            .map(|(metric, value)| self.rate_for_target(*metric, *value))
            .collect::<Result<Vec<_>>>()?;

        let binding = per_target
            .iter()
            .filter_map(|t| t.rate.map(|r| (t.metric, r)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((binding, rate)) = binding else {
            let detail = per_target
                .iter()
                .map(|t| format!("{}={}", t.metric, t.target))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(QueueError::below_minimum(format!(
                "no admissible rate meets any target ({})",
                detail
            )));
        };

        let mut model = self.model()?;
        let metrics = self.metrics_at(&mut model, rate / MSEC_PER_SEC)?;
        for t in &mut per_target {
            t.achieved = Some(self.metric_value(t.metric, &metrics));
        }
        let achieved_for = |metric: TargetMetric| {
            per_target
                .iter()
                .find(|t| t.metric == metric)
                .and_then(|t| t.achieved)
        };
        let achieved = TargetPerf {
            ttft: achieved_for(TargetMetric::Ttft),
            itl: achieved_for(TargetMetric::Itl),
            tps: achieved_for(TargetMetric::Tps),
        };

        tracing::debug!(%binding, rate, "sized queue");
        Ok(SizingResult {
            rate,
            binding,
            metrics,
            achieved,
            per_target,
        })
    }

    fn metrics_at(&self, model: &mut BirthDeathModel, lambda: f64) -> Result<AnalysisMetrics> {
        model.solve(lambda, 1);
        let stats = model.stats()?;
        Ok(self.to_metrics(&stats))
    }

    fn to_metrics(&self, stats: &QueueStats) -> AnalysisMetrics {
        let batch = stats.avg_num_in_service;
        let prefill = self.composer.prefill_time(batch);
        let output_tokens = self.composer.request_size().avg_output_tokens as f64;
        let throughput = stats.throughput * MSEC_PER_SEC;
        AnalysisMetrics {
            request_rate: stats.arrival_rate * MSEC_PER_SEC,
            throughput,
            tokens_per_sec: throughput * output_tokens,
            avg_resp_time: stats.avg_resp_time,
            avg_wait_time: stats.avg_wait_time,
            avg_serv_time: stats.avg_serv_time,
            avg_prefill_time: prefill,
            avg_ttft: stats.avg_wait_time + prefill,
            avg_token_time: self.composer.decode_time(batch),
            avg_num_in_serv: batch,
            avg_queue_length: stats.avg_queue_length,
            blocking_probability: stats.blocking_probability,
            utilization: stats.utilization,
            max_rate: self.lambda_max * MSEC_PER_SEC,
        }
    }

    fn metric_value(&self, metric: TargetMetric, metrics: &AnalysisMetrics) -> f64 {
        match metric {
            TargetMetric::Ttft => metrics.avg_ttft,
            TargetMetric::Itl => metrics.avg_token_time,
            TargetMetric::Tps => metrics.tokens_per_sec,
            TargetMetric::WaitTime => metrics.avg_wait_time,
            TargetMetric::ServiceTime => metrics.avg_serv_time,
        }
    }
}
