use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::core::aggregator::Aggregator;
use crate::core::checks::CheckSet;
use crate::core::headers::HeaderBuilder;
use crate::core::reporter::{ReportEvent, Reporter};
use crate::core::transport::Transport;
use crate::core::vu_pool::StopSignal;
use crate::models::check_stats::CheckStats;
use crate::models::config::{LoadConfig, ThinkTime};
use crate::models::error::Result;
use crate::models::http_error_stats::HttpErrorStats;
use crate::models::metric_sample::{
    DATA_RECEIVED, ERROR_RATE, HTTP_REQS, HTTP_REQ_DURATION, HTTP_REQ_FAILED, ITERATIONS, SUCCESS_LATENCY,
    TIMEOUT_RATE, TOTAL_ERRORS,
};
use crate::models::request_outcome::{OutcomeClass, RequestOutcome};

// 错误日志里最多带多少字节的响应体
const BODY_EXCERPT_LIMIT: usize = 200;

/// 所有 VU 共享的只读上下文，以及需要写入的统计
pub struct IterationContext {
    pub url: String,
    pub request_timeout: Duration,
    pub max_redirects: usize,
    pub think_time: ThinkTime,
    pub checks: CheckSet,
    pub transport: Arc<dyn Transport>,
    pub headers: Arc<dyn HeaderBuilder>,
    pub reporter: Arc<dyn Reporter>,
    pub aggregator: Arc<Aggregator>,
    pub check_stats: Arc<CheckStats>,
    pub http_errors: Arc<HttpErrorStats>,
}

impl IterationContext {
    pub fn new(
        config: &LoadConfig,
        transport: Arc<dyn Transport>,
        headers: Arc<dyn HeaderBuilder>,
        reporter: Arc<dyn Reporter>,
        aggregator: Arc<Aggregator>,
    ) -> Result<Self> {
        let checks = CheckSet::from_options(&config.checks);
        tracing::debug!("断言: {:?}", checks.names().collect::<Vec<_>>());
        Ok(IterationContext {
            url: config.target_url()?.to_string(),
            request_timeout: config.request_timeout,
            max_redirects: config.max_redirects,
            think_time: config.think_time,
            checks,
            transport,
            headers,
            reporter,
            aggregator,
            check_stats: Arc::new(CheckStats::new()),
            http_errors: Arc::new(HttpErrorStats::new()),
        })
    }
}

/// 在 [min, max] 内均匀取一个停顿时长
pub fn sample_think_time(think_time: &ThinkTime) -> Duration {
    if think_time.max <= think_time.min {
        return think_time.min;
    }
    let secs = rand::thread_rng().gen_range(think_time.min.as_secs_f64()..=think_time.max.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// 单个 VU 的循环：请求、记录、停顿，直到收到停止信号
pub async fn run_vu(ctx: Arc<IterationContext>, vu: u64, signal: Arc<StopSignal>) {
    tracing::trace!(vu, "VU 启动");
    // 只在两次迭代之间检查停止信号，进行中的请求不会被打断；每个 VU 至少跑一次
    loop {
        run_iteration(&ctx, vu).await;
        signal.pause(sample_think_time(&ctx.think_time)).await;
        if signal.is_stopped() {
            break;
        }
    }
    tracing::trace!(vu, "VU 退出");
}

/// 发一次请求并记录结果
pub async fn run_iteration(ctx: &IterationContext, vu: u64) -> OutcomeClass {
    let headers = ctx.headers.build_headers();
    let outcome = ctx
        .transport
        .get(&ctx.url, &headers, ctx.request_timeout, ctx.max_redirects)
        .await;
    record_outcome(ctx, vu, &outcome)
}

/// 分类、断言、写指标，出错时上报诊断信息
pub fn record_outcome(ctx: &IterationContext, vu: u64, outcome: &RequestOutcome) -> OutcomeClass {
    let class = outcome.class();
    let is_timeout = outcome.is_timeout_or_network_failure();
    let is_error = outcome.is_error();

    // 断言只用于诊断
    let failed_checks = ctx.checks.run(outcome, &ctx.check_stats);
    if !failed_checks.is_empty() {
        tracing::debug!(vu, ?failed_checks, "断言未通过");
    }

    let agg = &ctx.aggregator;
    agg.add_counter(HTTP_REQS, 1.0);
    agg.add_counter(ITERATIONS, 1.0);
    agg.add_counter(DATA_RECEIVED, outcome.body.len() as f64);
    agg.add_trend(HTTP_REQ_DURATION, outcome.duration_ms);
    agg.add_rate(HTTP_REQ_FAILED, is_error);
    agg.add_rate(ERROR_RATE, is_error);
    agg.add_rate(TIMEOUT_RATE, is_timeout);

    if !is_error {
        agg.add_trend(SUCCESS_LATENCY, outcome.duration_ms);
        return class;
    }

    agg.add_counter(TOTAL_ERRORS, 1.0);
    let message = match outcome.status {
        Some(_) => outcome.body_excerpt(BODY_EXCERPT_LIMIT),
        None => outcome.error.clone().unwrap_or_else(|| "网络错误".to_string()),
    };
    let tally_message = match outcome.status {
        Some(code) => format!("HTTP 错误: 状态码 {}", code),
        None => message.clone(),
    };
    ctx.http_errors.increment(outcome.status, tally_message);
    ctx.reporter.report(ReportEvent::RequestFailed {
        vu,
        status: outcome.status,
        auth: class.is_auth_failure(),
        message,
    });
    class
}
