use std::time::Duration;

use serde::Serialize;

use crate::core::aggregator::MetricsSnapshot;
use crate::core::headers::HeaderBuilder;
use crate::core::transport::Transport;
use crate::models::error::LoadError;
use crate::models::metric_sample::{ERROR_RATE, HTTP_REQ_DURATION};

// 超过这些值时给出排查建议
const ADVICE_ERROR_RATE: f64 = 0.01;
const ADVICE_P95_MS: f64 = 2000.0;

/// 开始前的探测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Reachable { status: u16, duration_ms: f64 },
    AuthRejected { status: u16 },
    Unreachable { message: String },
}

impl ProbeOutcome {
    /// 探测失败时对应的错误
    pub fn into_error(self) -> Option<LoadError> {
        match self {
            ProbeOutcome::Reachable { .. } => None,
            ProbeOutcome::AuthRejected { status } => Some(LoadError::AuthRejected(status)),
            ProbeOutcome::Unreachable { message } => Some(LoadError::TargetUnreachable(message)),
        }
    }
}

/// 发一次不计入指标的请求，确认目标可达且凭证有效
pub async fn probe(
    transport: &dyn Transport,
    headers: &dyn HeaderBuilder,
    url: &str,
    timeout: Duration,
    max_redirects: usize,
) -> ProbeOutcome {
    let outcome = transport
        .get(url, &headers.build_headers(), timeout, max_redirects)
        .await;
    match outcome.status {
        None => ProbeOutcome::Unreachable {
            message: outcome.error.unwrap_or_else(|| "网络错误".to_string()),
        },
        Some(status @ (401 | 403)) => ProbeOutcome::AuthRejected { status },
        Some(status) => ProbeOutcome::Reachable {
            status,
            duration_ms: outcome.duration_ms,
        },
    }
}

/// 根据最终快照给出排查建议
pub fn teardown_advice(snapshot: &MetricsSnapshot, auth_failures: u64) -> Vec<String> {
    let mut advice = Vec::new();
    if let Some(rate) = snapshot.rate(ERROR_RATE) {
        if rate > ADVICE_ERROR_RATE {
            advice.push(format!(
                "错误率 {:.2}% 超过 1%，请检查服务端日志和自动扩容配置",
                rate * 100.0
            ));
        }
    }
    if let Some(p95) = snapshot.trend(HTTP_REQ_DURATION).and_then(|t| t.percentile(95.0)) {
        if p95 > ADVICE_P95_MS {
            advice.push(format!(
                "p(95) 响应时间 {:.0} ms 超过 2 秒，请检查数据库查询、缓存和 worker 数量",
                p95
            ));
        }
    }
    if auth_failures > 0 {
        advice.push(format!(
            "出现 {} 次鉴权失败，session/JWT 可能在测试过程中过期",
            auth_failures
        ));
    }
    advice
}
