use std::time::Duration;

use parking_lot::Mutex;

use crate::core::lifecycle::ProbeOutcome;
use crate::core::parse_duration::format_duration;
use crate::models::result::TestSummary;
use crate::models::threshold::Verdict;

/// 核心只发出结构化事件，输出格式由 Reporter 决定
#[derive(Debug, Clone)]
pub enum ReportEvent {
    PlanStarted {
        target: String,
        vus: usize,
        total: Duration,
        ramp_up: Duration,
        soak: Duration,
        ramp_down: Duration,
    },
    Probe(ProbeOutcome),
    RequestFailed {
        vu: u64,
        status: Option<u16>,
        auth: bool,
        message: String,
    },
    Tick {
        elapsed: Duration,
        total: Duration,
        target: usize,
        active: usize,
    },
    Checkpoint {
        elapsed: Duration,
        active: usize,
        verdict: Verdict,
    },
    Draining {
        in_flight: usize,
    },
    Teardown {
        advice: Vec<String>,
    },
    Finished(Box<TestSummary>),
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: ReportEvent);
}

pub(crate) fn log_event(event: &ReportEvent) {
    match event {
        ReportEvent::PlanStarted {
            target,
            vus,
            total,
            ramp_up,
            soak,
            ramp_down,
        } => {
            tracing::info!(target: "vu_bomb", "目标地址: {}", target);
            tracing::info!(
                target: "vu_bomb",
                "压测计划: 爬升 {} → 保持 {} → 下降 {}，共 {}，最大 {} VU",
                format_duration(*ramp_up),
                format_duration(*soak),
                format_duration(*ramp_down),
                format_duration(*total),
                vus
            );
        }
        ReportEvent::Probe(ProbeOutcome::Reachable { status, duration_ms }) => {
            tracing::info!(target: "vu_bomb", "[SETUP] ✓ 探测 → HTTP {} ({:.0} ms)，开始压测", status, duration_ms);
        }
        ReportEvent::Probe(ProbeOutcome::AuthRejected { status }) => {
            tracing::error!(target: "vu_bomb", "[SETUP] ✗ 鉴权失败 ({})，cookie/JWT 可能已过期", status);
        }
        ReportEvent::Probe(ProbeOutcome::Unreachable { message }) => {
            tracing::error!(target: "vu_bomb", "[SETUP] ✗ 无法连接目标，请检查地址和网络: {}", message);
        }
        ReportEvent::RequestFailed {
            vu,
            status,
            auth,
            message,
        } => match (*auth, status) {
            (true, Some(code)) => tracing::error!(
                target: "vu_bomb",
                vu = *vu,
                "鉴权失败 ({})，session/JWT 可能已过期，请重新获取凭证",
                code
            ),
            (_, Some(code)) => tracing::warn!(target: "vu_bomb", vu = *vu, "HTTP {}: {}", code, message),
            (_, None) => tracing::warn!(target: "vu_bomb", vu = *vu, "请求失败: {}", message),
        },
        ReportEvent::Tick {
            elapsed,
            target,
            active,
            ..
        } => {
            tracing::debug!(target: "vu_bomb", ?elapsed, vus = *target, active = *active, "调度");
        }
        ReportEvent::Checkpoint {
            elapsed, verdict, ..
        } => {
            for failure in verdict.failures() {
                tracing::warn!(
                    target: "vu_bomb",
                    ?elapsed,
                    "阈值未通过: {}: {} (实际值: {:?})",
                    failure.metric,
                    failure.source,
                    failure.observed
                );
            }
        }
        ReportEvent::Draining { in_flight } => {
            tracing::info!(target: "vu_bomb", "等待 {} 个进行中的请求响应", in_flight);
        }
        ReportEvent::Teardown { advice } => {
            tracing::info!(target: "vu_bomb", "测试完成！");
            for line in advice {
                tracing::info!(target: "vu_bomb", "  • {}", line);
            }
        }
        ReportEvent::Finished(summary) => {
            tracing::info!(
                target: "vu_bomb",
                passed = summary.passed(),
                total_requests = summary.total_requests,
                "压测结束"
            );
        }
    }
}

/// 把事件收集起来，测试时使用
#[derive(Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().clone()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, event: ReportEvent) {
        self.events.lock().push(event);
    }
}
