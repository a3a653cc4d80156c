//! Plain-text rendering of analysis results.

use qanalysis_core::{AnalysisMetrics, Indicator, SizingResult};

use crate::commands::CapacityPoint;
use std::fmt::Write;

pub fn metrics_table(m: &AnalysisMetrics) -> String {
    let rows = [
        ("request rate (req/s)", m.request_rate),
        ("throughput (req/s)", m.throughput),
        ("tokens/sec", m.tokens_per_sec),
        ("response time (ms)", m.avg_resp_time),
        ("wait time (ms)", m.avg_wait_time),
        ("service time (ms)", m.avg_serv_time),
        ("prefill time (ms)", m.avg_prefill_time),
        ("TTFT (ms)", m.avg_ttft),
        ("ITL (ms)", m.avg_token_time),
        ("batch size", m.avg_num_in_serv),
        ("queue length", m.avg_queue_length),
        ("blocking probability", m.blocking_probability),
        ("utilization", m.utilization),
        ("max rate (req/s)", m.max_rate),
    ];
    let mut out = String::new();
    for (label, value) in rows {
        let _ = writeln!(out, "{:<22} {:>14.4}", label, value);
    }
    out
}

pub fn sizing_table(sized: &SizingResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "max rate {:.4} req/s (bound by {})\n",
        sized.rate, sized.binding
    );
    let _ = writeln!(
        out,
        "{:<14} {:>12} {:>14} {:>12}",
        "target", "value", "rate (req/s)", "achieved"
    );
    for t in &sized.per_target {
        let rate = t
            .rate
            .map_or_else(|| "infeasible".to_string(), |r| format!("{:.4}", r));
        let achieved = t
            .achieved
            .map_or_else(|| "-".to_string(), |v| format!("{:.4}", v));
        let _ = writeln!(
            out,
            "{:<14} {:>12.4} {:>14} {:>12}",
            t.metric.to_string(),
            t.target,
            rate,
            achieved
        );
    }
    out.push('\n');
    out.push_str(&metrics_table(&sized.metrics));
    out
}

pub fn sweep_table(points: &[AnalysisMetrics]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>10} {:>12} {:>12} {:>12} {:>10} {:>10} {:>10}",
        "rate", "throughput", "resp (ms)", "wait (ms)", "batch", "TTFT", "ITL"
    );
    for m in points {
        let _ = writeln!(
            out,
            "{:>10.3} {:>12.3} {:>12.3} {:>12.3} {:>10.3} {:>10.3} {:>10.3}",
            m.request_rate,
            m.throughput,
            m.avg_resp_time,
            m.avg_wait_time,
            m.avg_num_in_serv,
            m.avg_ttft,
            m.avg_token_time
        );
    }
    out
}

pub fn capacity_table(points: &[CapacityPoint]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>10} {:>10} {:>14}",
        "batch", "tokens", "rate (req/s)"
    );
    for p in points {
        let rate = match (p.rate, p.indicator) {
            (None, _) => "infeasible".to_string(),
            (Some(r), Indicator::Interior) => format!("{:.4}", r),
            (Some(r), _) => format!("{:.4} (max)", r),
        };
        let _ = writeln!(
            out,
            "{:>10} {:>10} {:>14}",
            p.max_batch_size, p.avg_output_tokens, rate
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use qanalysis_core::{QueueAnalyzer, QueueConfig, RequestSize, TargetMetric, TargetPerf};

    fn analyzer() -> QueueAnalyzer {
        QueueAnalyzer::new(QueueConfig::default(), RequestSize::default()).unwrap()
    }

    #[test]
    fn test_metrics_table_has_every_row() {
        let table = metrics_table(&analyzer().analyze(25.0).unwrap());
        assert_eq!(table.lines().count(), 14);
        assert!(table.starts_with("request rate (req/s)"));
        assert!(table.contains("TTFT (ms)"));
    }

    #[test]
    fn test_sizing_table_marks_infeasible() {
        let targets = TargetPerf {
            ttft: Some(50.0),
            itl: Some(14.0),
            tps: None,
        };
        let table = sizing_table(&analyzer().size(&targets).unwrap());
        assert!(table.contains("bound by ITL"));
        assert!(table.contains("infeasible"));
    }

    #[test]
    fn test_sizing_table_shows_wait_and_service_time() {
        let sized = analyzer()
            .size_for(&[
                (TargetMetric::WaitTime, 1000.0),
                (TargetMetric::ServiceTime, 8000.0),
            ])
            .unwrap();
        let table = sizing_table(&sized);
        let rows: Vec<&str> = table
            .lines()
            .filter(|l| l.starts_with("wait time") || l.starts_with("service time"))
            .collect();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| !row.trim_end().ends_with('-')));
    }

    #[test]
    fn test_capacity_table_rows() {
        let points = [
            CapacityPoint {
                max_batch_size: 64,
                avg_output_tokens: 128,
                rate: Some(12.5),
                indicator: Indicator::Interior,
            },
            CapacityPoint {
                max_batch_size: 64,
                avg_output_tokens: 256,
                rate: None,
                indicator: Indicator::BelowRange,
            },
        ];
        let table = capacity_table(&points);
        assert_eq!(table.lines().count(), 3);
        assert!(table.contains("12.5000"));
        assert!(table.contains("infeasible"));
    }

    #[test]
    fn test_sweep_table_rows() {
        let points = analyzer().sweep([5.0, 10.0, 15.0]).unwrap();
        let table = sweep_table(&points);
        assert_eq!(table.lines().count(), 4);
    }
}
