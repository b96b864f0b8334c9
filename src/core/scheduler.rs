use std::time::Duration;

use crate::models::stage::{Stage, TestPlan};

/// 把阶段列表换算成随时间变化的目标并发数
#[derive(Debug, Clone)]
pub struct Scheduler {
    start_target: usize,
    stages: Vec<Stage>,
    total: Duration,
}

impl Scheduler {
    pub fn new(start_target: usize, stages: Vec<Stage>) -> Self {
        let total = stages.iter().map(|s| s.duration).sum();
        Scheduler {
            start_target,
            stages,
            total,
        }
    }

    pub fn from_plan(plan: &TestPlan) -> Self {
        Self::new(plan.start_target, plan.stages.clone())
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    pub fn is_finished(&self, elapsed: Duration) -> bool {
        elapsed >= self.total
    }

    /// 线性插值的目标并发数，计划结束后返回 None
    pub fn target_at(&self, elapsed: Duration) -> Option<f64> {
        if self.is_finished(elapsed) {
            return None;
        }
        let t = elapsed.as_secs_f64();
        let mut stage_start = 0f64;
        let mut prev = self.start_target as f64;
        for stage in &self.stages {
            let d = stage.duration.as_secs_f64();
            let cur = stage.target as f64;
            // 时长为 0 的阶段直接切到目标值
            if t < stage_start + d {
                let progress = (t - stage_start) / d;
                return Some(prev + (cur - prev) * progress);
            }
            stage_start += d;
            prev = cur;
        }
        None
    }

    /// 四舍五入后的 VU 数
    pub fn vus_at(&self, elapsed: Duration) -> Option<usize> {
        self.target_at(elapsed).map(|c| c.round().max(0.0) as usize)
    }

    /// 计划结束时的目标值
    pub fn final_target(&self) -> usize {
        self.stages.last().map(|s| s.target).unwrap_or(self.start_target)
    }
}
