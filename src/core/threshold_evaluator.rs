use crate::core::aggregator::{MetricSummary, MetricsSnapshot};
use crate::models::stage::TestPlan;
use crate::models::threshold::{Aggregate, EmptyMetricPolicy, ThresholdExpr, ThresholdResult, Verdict};

/// 按快照判定全部阈值，不修改任何状态，同一快照结果相同
pub fn evaluate(snapshot: &MetricsSnapshot, plan: &TestPlan) -> Verdict {
    let results: Vec<ThresholdResult> = plan
        .thresholds
        .values()
        .flatten()
        .map(|expr| evaluate_one(snapshot, expr, plan.empty_metric_policy))
        .collect();
    let passed = results.iter().all(|r| r.passed);
    Verdict { results, passed }
}

fn evaluate_one(snapshot: &MetricsSnapshot, expr: &ThresholdExpr, policy: EmptyMetricPolicy) -> ThresholdResult {
    let result = |observed: Option<f64>, passed: bool, reason: Option<String>| ThresholdResult {
        metric: expr.metric.clone(),
        source: expr.source.clone(),
        observed,
        passed,
        reason,
    };

    let summary = match snapshot.get(&expr.metric) {
        Some(summary) if summary.sample_count() > 0 => summary,
        _ => {
            return result(
                None,
                policy == EmptyMetricPolicy::Pass,
                Some("指标没有任何采样".to_string()),
            )
        }
    };

    if !expr.aggregate.applies_to(summary.kind()) {
        return result(
            None,
            false,
            Some(format!("{} 不适用于 {:?} 类型的指标", expr.aggregate, summary.kind())),
        );
    }

    match observe(summary, expr.aggregate) {
        Some(observed) => result(Some(observed), expr.comparator.holds(observed, expr.literal), None),
        None => result(None, false, Some(format!("未跟踪 {}", expr.aggregate))),
    }
}

fn observe(summary: &MetricSummary, aggregate: Aggregate) -> Option<f64> {
    match (summary, aggregate) {
        (MetricSummary::Counter { sum, .. }, Aggregate::Value | Aggregate::Count) => Some(*sum),
        (MetricSummary::Rate { .. }, Aggregate::Rate) => summary.rate(),
        (MetricSummary::Rate { total, .. }, Aggregate::Count) => Some(*total as f64),
        (MetricSummary::Trend(t), Aggregate::Percentile(p)) => t.percentile(p),
        (MetricSummary::Trend(t), Aggregate::Avg) => Some(t.avg),
        (MetricSummary::Trend(t), Aggregate::Min) => Some(t.min),
        (MetricSummary::Trend(t), Aggregate::Max) => Some(t.max),
        (MetricSummary::Trend(t), Aggregate::Med) => t.med(),
        (MetricSummary::Trend(t), Aggregate::Count) => Some(t.count as f64),
        _ => None,
    }
}
