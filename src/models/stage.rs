use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use crate::models::error::LoadError;
use crate::models::metric_sample::builtin_kind;
use crate::models::threshold::{Aggregate, EmptyMetricPolicy, ThresholdExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Stage { duration, target }
    }
}

/// 测试计划，测试开始后不再修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestPlan {
    pub start_target: usize,
    pub stages: Vec<Stage>,
    pub thresholds: BTreeMap<String, Vec<ThresholdExpr>>,
    pub empty_metric_policy: EmptyMetricPolicy,
}

impl TestPlan {
    pub fn new(stages: Vec<Stage>) -> Self {
        TestPlan {
            start_target: 0,
            stages,
            thresholds: BTreeMap::new(),
            empty_metric_policy: EmptyMetricPolicy::Fail,
        }
    }

    pub fn with_start_target(mut self, start_target: usize) -> Self {
        self.start_target = start_target;
        self
    }

    pub fn with_empty_metric_policy(mut self, policy: EmptyMetricPolicy) -> Self {
        self.empty_metric_policy = policy;
        self
    }

    /// 解析并加入一条阈值，例如 `threshold("error_rate", "rate<0.01")`
    pub fn threshold(mut self, metric: &str, expr: &str) -> Result<Self, LoadError> {
        let parsed = ThresholdExpr::parse(metric, expr)?;
        self.add_threshold(parsed)?;
        Ok(self)
    }

    pub fn add_threshold(&mut self, expr: ThresholdExpr) -> Result<(), LoadError> {
        // 内置指标在开始前就能发现统计量写错
        if let Some(kind) = builtin_kind(&expr.metric) {
            if !expr.aggregate.applies_to(kind) {
                return Err(LoadError::InvalidThreshold {
                    metric: expr.metric.clone(),
                    expr: expr.source.clone(),
                    reason: format!("{} 不适用于 {:?} 类型的指标", expr.aggregate, kind),
                });
            }
        }
        self.thresholds.entry(expr.metric.clone()).or_default().push(expr);
        Ok(())
    }

    /// 阈值里引用到的全部百分位，聚合器需要额外跟踪
    pub fn referenced_percentiles(&self) -> Vec<f64> {
        let mut out: Vec<f64> = self
            .thresholds
            .values()
            .flatten()
            .filter_map(|expr| match expr.aggregate {
                Aggregate::Percentile(p) => Some(p),
                _ => None,
            })
            .collect();
        out.sort_by(|a, b| a.total_cmp(b));
        out.dedup();
        out
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn peak_target(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.target)
            .chain(std::iter::once(self.start_target))
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_thresholds() {
        let plan = TestPlan::new(vec![Stage::new(Duration::from_secs(1), 1)])
            .threshold("http_req_duration", "p(95)<2000")
            .unwrap()
            .threshold("http_req_duration", "p(99)<4000")
            .unwrap()
            .threshold("error_rate", "rate<0.01")
            .unwrap();
        assert_eq!(plan.thresholds["http_req_duration"].len(), 2);
        assert_eq!(plan.referenced_percentiles(), vec![95.0, 99.0]);
    }

    #[test]
    fn test_builtin_kind_mismatch_rejected() {
        let plan = TestPlan::new(vec![]);
        assert!(plan.clone().threshold("error_rate", "p(95)<1").is_err());
        assert!(plan.clone().threshold("total_errors", "rate<1").is_err());
        // 自定义指标推迟到评估时检查
        assert!(plan.threshold("my_metric", "rate<1").is_ok());
    }

    #[test]
    fn test_duration_and_peak() {
        let plan = TestPlan::new(vec![
            Stage::new(Duration::from_secs(60), 300),
            Stage::new(Duration::from_secs(600), 300),
            Stage::new(Duration::from_secs(30), 0),
        ]);
        assert_eq!(plan.total_duration(), Duration::from_secs(690));
        assert_eq!(plan.peak_target(), 300);
    }
}
