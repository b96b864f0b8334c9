use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use histogram::Histogram;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::models::metric_sample::{MetricKind, MetricSample};

// 相对误差不超过 2^-7，最大值 2^40 微秒
const GROUPING_POWER: u8 = 7;
const MAX_VALUE_POWER: u8 = 40;
const MAX_VALUE_US: u64 = (1u64 << MAX_VALUE_POWER) - 1;

pub const DEFAULT_PERCENTILES: [f64; 4] = [50.0, 90.0, 95.0, 99.0];

struct TrendState {
    // 以微秒记录
    histogram: Histogram,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl TrendState {
    fn add(&mut self, value_ms: f64) -> Result<(), histogram::Error> {
        let value_ms = if value_ms.is_finite() { value_ms.max(0.0) } else { 0.0 };
        let micros = ((value_ms * 1000.0).round() as u64).min(MAX_VALUE_US);
        self.histogram.increment(micros)?;
        self.count += 1;
        self.sum += value_ms;
        self.min = self.min.min(value_ms);
        self.max = self.max.max(value_ms);
        Ok(())
    }

    /// 取包含该排名的桶的上沿，再夹到 [min, max]，所以只会高估不会低估
    fn percentile(&self, p: f64) -> f64 {
        if p <= 0.0 {
            return self.min;
        }
        if p >= 100.0 {
            return self.max;
        }
        match self.histogram.percentile(p) {
            Ok(bucket) => {
                let upper_ms = *bucket.range().end() as f64 / 1000.0;
                upper_ms.clamp(self.min, self.max)
            }
            Err(_) => self.max,
        }
    }

    fn summary(&self, percentiles: &[f64]) -> TrendSummary {
        TrendSummary {
            count: self.count,
            min: self.min,
            max: self.max,
            avg: if self.count > 0 { self.sum / self.count as f64 } else { 0.0 },
            percentiles: percentiles
                .iter()
                .map(|&p| PercentileValue {
                    p,
                    value: self.percentile(p),
                })
                .collect(),
        }
    }
}

enum MetricState {
    Counter { sum: f64, samples: u64 },
    Rate { hits: u64, total: u64 },
    Trend(Box<TrendState>),
}

impl MetricState {
    fn kind(&self) -> MetricKind {
        match self {
            MetricState::Counter { .. } => MetricKind::Counter,
            MetricState::Rate { .. } => MetricKind::Rate,
            MetricState::Trend(_) => MetricKind::Trend,
        }
    }

    fn empty(kind: MetricKind) -> Result<Self, histogram::Error> {
        Ok(match kind {
            MetricKind::Counter => MetricState::Counter { sum: 0.0, samples: 0 },
            MetricKind::Rate => MetricState::Rate { hits: 0, total: 0 },
            MetricKind::Trend => MetricState::Trend(Box::new(TrendState {
                histogram: Histogram::new(GROUPING_POWER, MAX_VALUE_POWER)?,
                count: 0,
                sum: 0.0,
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            })),
        })
    }

    fn apply(&mut self, sample: &MetricSample) -> Result<(), histogram::Error> {
        match (self, sample) {
            (MetricState::Counter { sum, samples }, MetricSample::Counter(_, delta)) => {
                *sum += delta;
                *samples += 1;
            }
            (MetricState::Rate { hits, total }, MetricSample::Rate(_, hit)) => {
                if *hit {
                    *hits += 1;
                }
                *total += 1;
            }
            (MetricState::Trend(state), MetricSample::Trend(_, value)) => state.add(*value)?,
            _ => {}
        }
        Ok(())
    }

    fn summary(&self, percentiles: &[f64]) -> MetricSummary {
        match self {
            MetricState::Counter { sum, samples } => MetricSummary::Counter {
                sum: *sum,
                samples: *samples,
            },
            MetricState::Rate { hits, total } => MetricSummary::Rate {
                hits: *hits,
                total: *total,
            },
            MetricState::Trend(state) => MetricSummary::Trend(state.summary(percentiles)),
        }
    }
}

/// 所有 VU 共享的指标聚合器，按指标加锁
pub struct Aggregator {
    percentiles: Vec<f64>,
    metrics: RwLock<HashMap<String, Arc<Mutex<MetricState>>>>,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self::with_percentiles(&[])
    }

    /// 除了 p50/p90/p95/p99 以外还要跟踪的百分位
    pub fn with_percentiles(extra: &[f64]) -> Self {
        let mut percentiles: Vec<f64> = DEFAULT_PERCENTILES
            .iter()
            .chain(extra.iter())
            .copied()
            .filter(|p| (0.0..=100.0).contains(p))
            .collect();
        percentiles.sort_by(|a, b| a.total_cmp(b));
        percentiles.dedup();
        Aggregator {
            percentiles,
            metrics: RwLock::new(HashMap::new()),
        }
    }

    pub fn tracked_percentiles(&self) -> &[f64] {
        &self.percentiles
    }

    pub fn record(&self, sample: MetricSample) {
        let slot = match self.slot(sample.name(), sample.kind()) {
            Some(slot) => slot,
            None => return,
        };
        let mut state = slot.lock();
        if state.kind() != sample.kind() {
            tracing::warn!(
                metric = sample.name(),
                "指标类型不一致，已注册为 {:?}，丢弃 {:?} 采样",
                state.kind(),
                sample.kind()
            );
            return;
        }
        if let Err(e) = state.apply(&sample) {
            tracing::warn!(metric = sample.name(), "histogram设置数据错误:{:?}", e);
        }
    }

    pub fn add_counter(&self, name: &str, delta: f64) {
        self.record(MetricSample::counter(name, delta));
    }

    pub fn add_rate(&self, name: &str, hit: bool) {
        self.record(MetricSample::rate(name, hit));
    }

    pub fn add_trend(&self, name: &str, value_ms: f64) {
        self.record(MetricSample::trend(name, value_ms));
    }

    fn slot(&self, name: &str, kind: MetricKind) -> Option<Arc<Mutex<MetricState>>> {
        if let Some(slot) = self.metrics.read().get(name) {
            return Some(slot.clone());
        }
        let mut metrics = self.metrics.write();
        // 拿写锁前可能已经被别的 VU 注册
        if let Some(slot) = metrics.get(name) {
            return Some(slot.clone());
        }
        match MetricState::empty(kind) {
            Ok(state) => {
                let slot = Arc::new(Mutex::new(state));
                metrics.insert(name.to_string(), slot.clone());
                Some(slot)
            }
            Err(e) => {
                tracing::error!(metric = name, "无法创建histogram:{:?}", e);
                None
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let slots: Vec<(String, Arc<Mutex<MetricState>>)> = self
            .metrics
            .read()
            .iter()
            .map(|(name, slot)| (name.clone(), slot.clone()))
            .collect();
        let metrics = slots
            .into_iter()
            .map(|(name, slot)| {
                let summary = slot.lock().summary(&self.percentiles);
                (name, summary)
            })
            .collect();
        MetricsSnapshot { metrics }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileValue {
    pub p: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub percentiles: Vec<PercentileValue>,
}

impl TrendSummary {
    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|pv| (pv.p - p).abs() < 1e-9)
            .map(|pv| pv.value)
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricSummary {
    Counter { sum: f64, samples: u64 },
    Rate { hits: u64, total: u64 },
    Trend(TrendSummary),
}

impl MetricSummary {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricSummary::Counter { .. } => MetricKind::Counter,
            MetricSummary::Rate { .. } => MetricKind::Rate,
            MetricSummary::Trend(_) => MetricKind::Trend,
        }
    }

    pub fn sample_count(&self) -> u64 {
        match self {
            MetricSummary::Counter { samples, .. } => *samples,
            MetricSummary::Rate { total, .. } => *total,
            MetricSummary::Trend(t) => t.count,
        }
    }

    /// Rate 的比例，没有采样时为 None
    pub fn rate(&self) -> Option<f64> {
        match self {
            MetricSummary::Rate { hits, total } if *total > 0 => Some(*hits as f64 / *total as f64),
            _ => None,
        }
    }
}

/// 某一时刻的指标视图
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricsSnapshot {
    pub metrics: BTreeMap<String, MetricSummary>,
}

impl MetricsSnapshot {
    pub fn get(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    pub fn trend(&self, name: &str) -> Option<&TrendSummary> {
        match self.metrics.get(name) {
            Some(MetricSummary::Trend(t)) => Some(t),
            _ => None,
        }
    }

    pub fn counter(&self, name: &str) -> Option<f64> {
        match self.metrics.get(name) {
            Some(MetricSummary::Counter { sum, .. }) => Some(*sum),
            _ => None,
        }
    }

    pub fn rate(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(MetricSummary::rate)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricSummary)> {
        self.metrics.iter()
    }
}
