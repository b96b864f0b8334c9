use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::core::aggregator::Aggregator;
use crate::core::reporter::{ReportEvent, Reporter};
use crate::core::threshold_evaluator::evaluate;
use crate::models::stage::TestPlan;

/// 压测期间定期评估阈值，只用于展示，不影响最终判定
pub struct LiveMonitor {
    handle: JoinHandle<()>,
}

impl LiveMonitor {
    /// period 为 0 时不启动
    pub fn spawn(
        period: Duration,
        start: Instant,
        plan: Arc<TestPlan>,
        aggregator: Arc<Aggregator>,
        reporter: Arc<dyn Reporter>,
        active_vus: Arc<AtomicUsize>,
    ) -> Option<Self> {
        if period.is_zero() {
            return None;
        }
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回，跳过
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let verdict = evaluate(&aggregator.snapshot(), &plan);
                reporter.report(ReportEvent::Checkpoint {
                    elapsed: start.elapsed(),
                    active: active_vus.load(Ordering::Relaxed),
                    verdict,
                });
            }
        });
        Some(LiveMonitor { handle })
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}
