use serde::{Deserialize, Serialize};

pub const HTTP_REQS: &str = "http_reqs";
pub const ITERATIONS: &str = "iterations";
pub const DATA_RECEIVED: &str = "data_received";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const HTTP_REQ_FAILED: &str = "http_req_failed";
pub const ERROR_RATE: &str = "error_rate";
pub const TIMEOUT_RATE: &str = "timeout_rate";
pub const TOTAL_ERRORS: &str = "total_errors";
pub const SUCCESS_LATENCY: &str = "success_latency";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

/// 单次采样，产生后立即并入聚合器
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSample {
    Counter(String, f64),
    Rate(String, bool),
    Trend(String, f64),
}

impl MetricSample {
    pub fn counter(name: &str, delta: f64) -> Self {
        MetricSample::Counter(name.to_string(), delta)
    }

    pub fn rate(name: &str, hit: bool) -> Self {
        MetricSample::Rate(name.to_string(), hit)
    }

    pub fn trend(name: &str, value_ms: f64) -> Self {
        MetricSample::Trend(name.to_string(), value_ms)
    }

    pub fn name(&self) -> &str {
        match self {
            MetricSample::Counter(name, _) | MetricSample::Rate(name, _) | MetricSample::Trend(name, _) => name,
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSample::Counter(..) => MetricKind::Counter,
            MetricSample::Rate(..) => MetricKind::Rate,
            MetricSample::Trend(..) => MetricKind::Trend,
        }
    }
}

/// 内置指标的类型，用于在测试开始前校验阈值
pub fn builtin_kind(name: &str) -> Option<MetricKind> {
    match name {
        HTTP_REQS | ITERATIONS | DATA_RECEIVED | TOTAL_ERRORS => Some(MetricKind::Counter),
        HTTP_REQ_FAILED | ERROR_RATE | TIMEOUT_RATE => Some(MetricKind::Rate),
        HTTP_REQ_DURATION | SUCCESS_LATENCY => Some(MetricKind::Trend),
        _ => None,
    }
}
