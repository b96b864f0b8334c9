use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::aggregator::{MetricSummary, MetricsSnapshot};
use crate::core::vu_pool::DrainReport;
use crate::models::check_stats::CheckTally;
use crate::models::http_error_stats::HttpErrorEntry;
use crate::models::metric_sample::{ERROR_RATE, HTTP_REQS, HTTP_REQ_DURATION, SUCCESS_LATENCY};
use crate::models::threshold::Verdict;

/// 一次压测的最终结果
#[derive(Debug, Clone, Serialize)]
pub struct TestSummary {
    pub target: String,
    pub total_duration: f64,
    pub peak_vus: usize,
    pub spawned_vus: u64,
    pub total_requests: u64,
    pub rps: f64,
    pub error_rate: f64,
    pub metrics: MetricsSnapshot,
    pub verdict: Verdict,
    pub checks: BTreeMap<String, CheckTally>,
    pub http_errors: Vec<HttpErrorEntry>,
    pub auth_failures: u64,
    pub drain: DrainReport,
    pub interrupted: bool,
    pub timestamp: u128,
}

impl TestSummary {
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// (总请求数, 每秒请求数, 错误率)，从快照里取
    pub fn headline(metrics: &MetricsSnapshot, total_duration: f64) -> (u64, f64, f64) {
        let total = match metrics.get(HTTP_REQS) {
            Some(MetricSummary::Counter { sum, .. }) => *sum as u64,
            _ => 0,
        };
        let rps = if total_duration > 0.0 {
            total as f64 / total_duration
        } else {
            0.0
        };
        let error_rate = match metrics.get(ERROR_RATE) {
            Some(summary @ MetricSummary::Rate { .. }) => summary.rate().unwrap_or(0.0),
            _ => 0.0,
        };
        (total, rps, error_rate)
    }

    pub fn latency_p95(&self) -> Option<f64> {
        self.metrics
            .trend(HTTP_REQ_DURATION)
            .or_else(|| self.metrics.trend(SUCCESS_LATENCY))
            .and_then(|t| t.percentile(95.0))
    }
}
