use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::core::executor::{run_vu, IterationContext};

/// 单个 VU 的停止标志，设置后唤醒正在停顿的 VU
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// 一直等到收到停止信号
    pub async fn stopped(&self) {
        while !self.is_stopped() {
            self.notify.notified().await;
        }
    }

    /// 停顿 d，期间收到停止信号立即返回
    pub async fn pause(&self, d: Duration) {
        if self.is_stopped() {
            return;
        }
        if d.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(d) => {}
            _ = self.notify.notified() => {}
        }
    }
}

/// 结束时的收尾情况
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// 宽限期内正常退出的 VU
    pub drained: usize,
    /// 超过宽限期被中止的 VU，它们的请求不计入指标
    pub abandoned: usize,
}

struct Worker {
    id: u64,
    signal: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

/// 维护一组 VU 任务，使活跃数量跟随目标值
pub struct VuPool {
    ctx: Arc<IterationContext>,
    active: Vec<Worker>,
    retiring: Vec<Worker>,
    next_id: u64,
}

impl VuPool {
    pub fn new(ctx: Arc<IterationContext>) -> Self {
        VuPool {
            ctx,
            active: Vec::new(),
            retiring: Vec::new(),
            next_id: 1,
        }
    }

    /// 增加或减少 VU，使活跃数等于 target，返回当前活跃数
    pub fn reconcile(&mut self, target: usize) -> usize {
        self.reap();
        while self.active.len() < target {
            self.spawn();
        }
        // 先退役最近启动的 VU
        while self.active.len() > target {
            if let Some(worker) = self.active.pop() {
                worker.signal.stop();
                self.retiring.push(worker);
            }
        }
        self.active.len()
    }

    fn spawn(&mut self) {
        let id = self.next_id;
        self.next_id += 1;
        let signal = Arc::new(StopSignal::new());
        let handle = tokio::spawn(run_vu(self.ctx.clone(), id, signal.clone()));
        self.active.push(Worker { id, signal, handle });
    }

    /// 清理已经退出的任务
    pub fn reap(&mut self) {
        self.retiring.retain(|w| !w.handle.is_finished());
        let before = self.active.len();
        // 活跃 VU 只有 panic 时才会自己退出，下次 reconcile 会补上
        self.active.retain(|w| !w.handle.is_finished());
        let lost = before - self.active.len();
        if lost > 0 {
            tracing::warn!("{} 个 VU 异常退出", lost);
        }
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }

    #[cfg(test)]
    pub(crate) fn active_ids(&self) -> Vec<u64> {
        self.active.iter().map(|w| w.id).collect()
    }

    /// 已收到停止信号、仍在完成当前请求的 VU
    pub fn retiring(&self) -> usize {
        self.retiring.iter().filter(|w| !w.handle.is_finished()).count()
    }

    pub fn spawned_total(&self) -> u64 {
        self.next_id - 1
    }

    /// 通知全部 VU 停止，最多等待 grace，之后中止剩余任务
    pub async fn stop_all(&mut self, grace: Duration) -> DrainReport {
        let mut workers: Vec<Worker> = self.retiring.drain(..).collect();
        for worker in self.active.drain(..) {
            worker.signal.stop();
            workers.push(worker);
        }

        let deadline = Instant::now() + grace;
        let results = join_all(
            workers
                .iter_mut()
                .map(|w| tokio::time::timeout_at(deadline, &mut w.handle)),
        )
        .await;

        let mut report = DrainReport::default();
        for (worker, result) in workers.iter().zip(results) {
            match result {
                Ok(Ok(())) => report.drained += 1,
                Ok(Err(e)) => {
                    tracing::warn!(vu = worker.id, "VU 任务异常结束: {}", e);
                    report.drained += 1;
                }
                Err(_) => {
                    worker.handle.abort();
                    report.abandoned += 1;
                }
            }
        }
        if report.abandoned > 0 {
            tracing::warn!("{} 个 VU 超过宽限期仍未完成，已中止", report.abandoned);
        }
        report
    }
}

impl Drop for VuPool {
    fn drop(&mut self) {
        for worker in self.active.iter().chain(self.retiring.iter()) {
            worker.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use crate::core::executor::tests::{context, ScriptedTransport};
    use crate::core::reporter::CollectingReporter;
    use crate::core::transport::Transport;
    use crate::models::metric_sample::HTTP_REQS;
    use crate::models::request_outcome::RequestOutcome;

    /// 每个请求都要等到拿到许可才返回
    struct GatedTransport {
        gate: Semaphore,
        started: AtomicUsize,
    }

    impl GatedTransport {
        fn new() -> Self {
            GatedTransport {
                gate: Semaphore::new(0),
                started: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn get(
            &self,
            _url: &str,
            _headers: &HashMap<String, String>,
            _timeout: Duration,
            _max_redirects: usize,
        ) -> RequestOutcome {
            self.started.fetch_add(1, Ordering::SeqCst);
            match self.gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return RequestOutcome::failure(0.0, "closed"),
            }
            RequestOutcome::response(200, 1.0, "ok")
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let result = tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(result.is_ok(), "condition not reached");
    }

    #[tokio::test]
    async fn test_stop_signal_wakes_pause() {
        let signal = Arc::new(StopSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.pause(Duration::from_secs(60)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.stop();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(joined.is_ok());
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_scale_down_lets_in_flight_finish() {
        let transport = Arc::new(GatedTransport::new());
        let reporter = Arc::new(CollectingReporter::new());
        let ctx = Arc::new(context(transport.clone(), reporter));
        let aggregator = ctx.aggregator.clone();
        let mut pool = VuPool::new(ctx);

        assert_eq!(pool.reconcile(5), 5);
        wait_until(|| transport.started.load(Ordering::SeqCst) == 5).await;

        assert_eq!(pool.reconcile(2), 2);
        assert_eq!(pool.active_ids(), vec![1, 2]);
        assert_eq!(pool.retiring(), 3);

        // 放行全部 5 个进行中的请求
        transport.gate.add_permits(5);
        wait_until(|| aggregator.snapshot().counter(HTTP_REQS) == Some(5.0)).await;
        wait_until(|| pool.retiring() == 0).await;
        // 剩下的 2 个 VU 继续发起新请求
        wait_until(|| transport.started.load(Ordering::SeqCst) == 7).await;
        assert_eq!(aggregator.snapshot().counter(HTTP_REQS), Some(5.0));

        let report = pool.stop_all(Duration::from_millis(50)).await;
        assert_eq!(report.abandoned, 2);
        assert_eq!(pool.active(), 0);
        // 被中止的请求不计入
        assert_eq!(aggregator.snapshot().counter(HTTP_REQS), Some(5.0));
        assert_eq!(pool.spawned_total(), 5);
    }

    #[tokio::test]
    async fn test_stop_all_drains_idle_vus() {
        let ctx = Arc::new(context(
            Arc::new(ScriptedTransport::new(vec![])),
            Arc::new(CollectingReporter::new()),
        ));
        let mut pool = VuPool::new(ctx.clone());
        pool.reconcile(3);
        wait_until(|| ctx.aggregator.snapshot().counter(HTTP_REQS).unwrap_or(0.0) >= 3.0).await;

        let report = pool.stop_all(Duration::from_secs(5)).await;
        assert_eq!(report, DrainReport { drained: 3, abandoned: 0 });
    }

    #[tokio::test]
    async fn test_reconcile_to_zero_and_back() {
        let ctx = Arc::new(context(
            Arc::new(ScriptedTransport::new(vec![])),
            Arc::new(CollectingReporter::new()),
        ));
        let mut pool = VuPool::new(ctx);
        assert_eq!(pool.reconcile(4), 4);
        assert_eq!(pool.reconcile(0), 0);
        assert_eq!(pool.reconcile(1), 1);
        // 新 VU 使用新的编号
        assert_eq!(pool.active_ids(), vec![5]);
        pool.stop_all(Duration::from_secs(5)).await;
    }
}
