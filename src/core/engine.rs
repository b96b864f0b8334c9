use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::core::aggregator::Aggregator;
use crate::core::executor::IterationContext;
use crate::core::headers::HeaderBuilder;
use crate::core::lifecycle::{probe, teardown_advice};
use crate::core::live_monitor::LiveMonitor;
use crate::core::reporter::{ReportEvent, Reporter};
use crate::core::scheduler::Scheduler;
use crate::core::threshold_evaluator::evaluate;
use crate::core::transport::Transport;
use crate::core::vu_pool::{StopSignal, VuPool};
use crate::models::config::LoadConfig;
use crate::models::error::Result;
use crate::models::result::TestSummary;
use crate::models::stage::TestPlan;

/// 从外部提前结束压测，例如 Ctrl-C
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    signal: Arc<StopSignal>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.signal.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.signal.is_stopped()
    }
}

pub struct LoadTest {
    config: LoadConfig,
    plan: Arc<TestPlan>,
    transport: Arc<dyn Transport>,
    headers: Arc<dyn HeaderBuilder>,
    reporter: Arc<dyn Reporter>,
    stop: StopHandle,
}

impl LoadTest {
    pub fn new(
        config: LoadConfig,
        plan: TestPlan,
        transport: Arc<dyn Transport>,
        headers: Arc<dyn HeaderBuilder>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        LoadTest {
            config,
            plan: Arc::new(plan),
            transport,
            headers,
            reporter,
            stop: StopHandle::default(),
        }
    }

    /// 校验配置并按配置生成测试计划
    pub fn from_config(
        config: LoadConfig,
        transport: Arc<dyn Transport>,
        headers: Arc<dyn HeaderBuilder>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        config.validate()?;
        let plan = config.test_plan()?;
        Ok(Self::new(config, plan, transport, headers, reporter))
    }

    pub fn plan(&self) -> &TestPlan {
        &self.plan
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub async fn run(&self) -> Result<TestSummary> {
        let url = self.config.target_url()?.to_string();
        self.reporter.report(ReportEvent::PlanStarted {
            target: url.clone(),
            vus: self.plan.peak_target().min(self.config.vus),
            total: self.plan.total_duration(),
            ramp_up: self.config.ramp_up,
            soak: self.config.soak,
            ramp_down: self.config.ramp_down,
        });

        if self.config.probe.enabled {
            let outcome = probe(
                self.transport.as_ref(),
                self.headers.as_ref(),
                &url,
                self.config.probe.timeout,
                self.config.max_redirects,
            )
            .await;
            self.reporter.report(ReportEvent::Probe(outcome.clone()));
            if let Some(err) = outcome.into_error() {
                if self.config.probe.abort_on_failure {
                    return Err(err);
                }
                tracing::warn!("探测失败，继续压测: {}", err);
            }
        }

        let aggregator = Arc::new(Aggregator::with_percentiles(&self.plan.referenced_percentiles()));
        tracing::debug!("统计分位数: {:?}", aggregator.tracked_percentiles());
        let ctx = Arc::new(IterationContext::new(
            &self.config,
            self.transport.clone(),
            self.headers.clone(),
            self.reporter.clone(),
            aggregator.clone(),
        )?);
        let scheduler = Scheduler::from_plan(&self.plan);
        let mut pool = VuPool::new(ctx.clone());
        let active = Arc::new(AtomicUsize::new(0));

        let start = Instant::now();
        let monitor = LiveMonitor::spawn(
            self.config.checkpoint_interval,
            start,
            self.plan.clone(),
            aggregator.clone(),
            self.reporter.clone(),
            active.clone(),
        );

        let mut ticker = interval(self.config.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut peak_vus = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.stop.signal.stopped() => {}
            }
            if self.stop.is_stopped() {
                tracing::info!("收到停止信号，提前结束");
                break;
            }
            let elapsed = start.elapsed();
            let (target, finished) = match scheduler.vus_at(elapsed) {
                Some(target) => (target, false),
                // 计划结束时落到最后一个阶段的目标值，零时长阶段也会生效
                None => (scheduler.final_target(), true),
            };
            let target = target.min(self.config.vus);
            let running = pool.reconcile(target);
            active.store(running, Ordering::Relaxed);
            peak_vus = peak_vus.max(running);
            self.reporter.report(ReportEvent::Tick {
                elapsed,
                total: scheduler.total_duration(),
                target,
                active: running,
            });
            if finished {
                break;
            }
        }

        if let Some(monitor) = monitor {
            monitor.stop();
        }
        self.reporter.report(ReportEvent::Draining {
            in_flight: pool.active() + pool.retiring(),
        });
        let drain = pool.stop_all(self.config.graceful_stop).await;
        active.store(0, Ordering::Relaxed);

        let total_duration = start.elapsed().as_secs_f64();
        let snapshot = aggregator.snapshot();
        let verdict = evaluate(&snapshot, &self.plan);
        let auth_failures = ctx.http_errors.auth_failures();
        self.reporter.report(ReportEvent::Teardown {
            advice: teardown_advice(&snapshot, auth_failures),
        });

        let (total_requests, rps, error_rate) = TestSummary::headline(&snapshot, total_duration);
        let summary = TestSummary {
            target: url,
            total_duration,
            peak_vus,
            spawned_vus: pool.spawned_total(),
            total_requests,
            rps,
            error_rate,
            metrics: snapshot,
            verdict,
            checks: ctx.check_stats.snapshot(),
            http_errors: ctx.http_errors.entries(),
            auth_failures,
            drain,
            interrupted: self.stop.is_stopped(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0),
        };
        self.reporter.report(ReportEvent::Finished(Box::new(summary.clone())));
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use crate::core::executor::tests::ScriptedTransport;
    use crate::core::headers::StaticHeaders;
    use crate::core::reporter::CollectingReporter;
    use crate::core::vu_pool::DrainReport;
    use crate::models::config::ThinkTime;
    use crate::models::error::LoadError;
    use crate::models::metric_sample::{HTTP_REQS, SUCCESS_LATENCY};
    use crate::models::request_outcome::RequestOutcome;
    use crate::models::stage::Stage;
    use crate::models::threshold::EmptyMetricPolicy;

    fn short_config() -> LoadConfig {
        LoadConfig {
            vus: 2,
            ramp_up: Duration::from_secs(1),
            soak: Duration::from_secs(2),
            ramp_down: Duration::from_secs(1),
            think_time: ThinkTime {
                min: Duration::from_millis(100),
                max: Duration::from_millis(100),
            },
            checkpoint_interval: Duration::from_secs(1),
            ..LoadConfig::default()
        }
    }

    fn load_test(config: LoadConfig, outcomes: Vec<RequestOutcome>) -> (LoadTest, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::new());
        let headers = Arc::new(StaticHeaders::from_config(&config).unwrap());
        let test = LoadTest::from_config(
            config,
            Arc::new(ScriptedTransport::new(outcomes)),
            headers,
            reporter.clone(),
        )
        .unwrap();
        (test, reporter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_passes() {
        let (test, reporter) = load_test(short_config(), vec![RequestOutcome::response(200, 50.0, "ok")]);
        let summary = test.run().await.unwrap();

        assert!(summary.passed(), "{:?}", summary.verdict);
        assert_eq!(summary.peak_vus, 2);
        assert!(summary.total_requests > 0);
        assert_eq!(summary.drain.abandoned, 0);
        assert!(!summary.interrupted);
        assert_eq!(summary.error_rate, 0.0);

        let events = reporter.events();
        assert!(matches!(events[0], ReportEvent::PlanStarted { .. }));
        assert!(matches!(events[1], ReportEvent::Probe(_)));
        assert!(events.iter().any(|e| matches!(e, ReportEvent::Checkpoint { .. })));
        assert!(matches!(events[events.len() - 2], ReportEvent::Teardown { .. }));
        assert!(matches!(events[events.len() - 1], ReportEvent::Finished(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_stage_runs_one_iteration() {
        let mut config = short_config();
        config.vus = 1;
        config.probe.enabled = false;
        let reporter = Arc::new(CollectingReporter::new());
        let headers = Arc::new(StaticHeaders::from_config(&config).unwrap());
        let plan = TestPlan::new(vec![Stage::new(Duration::ZERO, 1)])
            .threshold(SUCCESS_LATENCY, "p(95)<2000")
            .unwrap();
        let test = LoadTest::new(
            config,
            plan,
            Arc::new(ScriptedTransport::new(vec![RequestOutcome::response(200, 500.0, "attempt")])),
            headers,
            reporter.clone(),
        );
        let summary = test.run().await.unwrap();

        assert_eq!(summary.metrics.counter(HTTP_REQS), Some(1.0));
        assert_eq!(summary.spawned_vus, 1);
        assert_eq!(summary.peak_vus, 1);
        assert_eq!(summary.drain, DrainReport { drained: 1, abandoned: 0 });
        assert!(summary.passed(), "{:?}", summary.verdict);
        assert!(matches!(
            reporter.events()[0],
            ReportEvent::PlanStarted { vus: 1, total, .. } if total.is_zero()
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_auth_rejected_aborts() {
        let (test, reporter) = load_test(short_config(), vec![RequestOutcome::response(401, 5.0, "")]);
        let err = test.run().await.unwrap_err();
        assert!(matches!(err, LoadError::AuthRejected(401)));
        assert!(!reporter.events().iter().any(|e| matches!(e, ReportEvent::Tick { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_failure_can_continue() {
        let mut config = short_config();
        config.probe.abort_on_failure = false;
        let (test, _) = load_test(
            config,
            vec![
                RequestOutcome::failure(1.0, "连接失败"),
                RequestOutcome::response(200, 10.0, "ok"),
            ],
        );
        let summary = test.run().await.unwrap();
        assert!(summary.total_requests > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failures_leave_success_latency_empty() {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(SUCCESS_LATENCY.to_string(), vec!["p(95)<2000".to_string()]);
        let mut config = LoadConfig {
            thresholds,
            ..short_config()
        };
        config.probe.enabled = false;
        let (test, _) = load_test(config.clone(), vec![RequestOutcome::response(500, 10.0, "boom")]);
        let summary = test.run().await.unwrap();
        assert!(summary.metrics.trend(SUCCESS_LATENCY).is_none());
        assert!(!summary.passed());

        config.empty_metric_policy = EmptyMetricPolicy::Pass;
        let (test, _) = load_test(config, vec![RequestOutcome::response(500, 10.0, "boom")]);
        assert!(test.run().await.unwrap().passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_handle_interrupts() {
        let config = LoadConfig {
            soak: Duration::from_secs(3600),
            ..short_config()
        };
        let (test, _) = load_test(config, vec![RequestOutcome::response(200, 10.0, "ok")]);
        let test = Arc::new(test);
        let handle = test.stop_handle();
        let runner = {
            let test = test.clone();
            tokio::spawn(async move { test.run().await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        handle.stop();

        let summary = runner.await.unwrap().unwrap();
        assert!(summary.interrupted);
        assert!(summary.total_duration < 60.0);
        assert!(summary.metrics.counter(HTTP_REQS).unwrap_or(0.0) > 0.0);
    }
}
