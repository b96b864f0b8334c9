use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::error::LoadError;
use crate::models::metric_sample::MetricKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparator {
    pub fn holds(&self, observed: f64, literal: f64) -> bool {
        match self {
            Comparator::Lt => observed < literal,
            Comparator::Le => observed <= literal,
            Comparator::Gt => observed > literal,
            Comparator::Ge => observed >= literal,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }
}

/// 阈值左侧的统计量
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    Percentile(f64),
    Rate,
    Value,
    Avg,
    Min,
    Max,
    Med,
    Count,
}

impl Aggregate {
    pub fn applies_to(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => matches!(
                self,
                Aggregate::Percentile(_)
                    | Aggregate::Avg
                    | Aggregate::Min
                    | Aggregate::Max
                    | Aggregate::Med
                    | Aggregate::Count
            ),
            MetricKind::Rate => matches!(self, Aggregate::Rate | Aggregate::Count),
            MetricKind::Counter => matches!(self, Aggregate::Count | Aggregate::Value),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Percentile(p) => write!(f, "p({})", p),
            Aggregate::Rate => write!(f, "rate"),
            Aggregate::Value => write!(f, "value"),
            Aggregate::Avg => write!(f, "avg"),
            Aggregate::Min => write!(f, "min"),
            Aggregate::Max => write!(f, "max"),
            Aggregate::Med => write!(f, "med"),
            Aggregate::Count => write!(f, "count"),
        }
    }
}

/// 例如 `p(95)<2000`、`rate<0.01`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdExpr {
    pub metric: String,
    pub aggregate: Aggregate,
    pub comparator: Comparator,
    pub literal: f64,
    pub source: String,
}

impl ThresholdExpr {
    pub fn parse(metric: &str, expr: &str) -> Result<Self, LoadError> {
        let invalid = |reason: &str| LoadError::InvalidThreshold {
            metric: metric.to_string(),
            expr: expr.to_string(),
            reason: reason.to_string(),
        };
        let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();

        // 先匹配两个字符的比较符
        let (pos, comparator, width) = [
            ("<=", Comparator::Le),
            (">=", Comparator::Ge),
            ("<", Comparator::Lt),
            (">", Comparator::Gt),
        ]
        .iter()
        .find_map(|(symbol, cmp)| compact.find(symbol).map(|pos| (pos, *cmp, symbol.len())))
        .ok_or_else(|| invalid("缺少比较符 (<, <=, >, >=)"))?;

        let lhs = &compact[..pos];
        let rhs = &compact[pos + width..];
        let literal: f64 = rhs.parse().map_err(|_| invalid("右侧必须是数字"))?;
        if !literal.is_finite() {
            return Err(invalid("右侧必须是有限数字"));
        }

        let aggregate = match lhs {
            "rate" => Aggregate::Rate,
            "value" => Aggregate::Value,
            "avg" => Aggregate::Avg,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            "med" => Aggregate::Med,
            "count" => Aggregate::Count,
            other => {
                let inner = other
                    .strip_prefix("p(")
                    .and_then(|s| s.strip_suffix(')'))
                    .ok_or_else(|| invalid("未知统计量"))?;
                let p: f64 = inner.parse().map_err(|_| invalid("百分位必须是数字"))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(invalid("百分位必须在 0 到 100 之间"));
                }
                Aggregate::Percentile(p)
            }
        };

        Ok(ThresholdExpr {
            metric: metric.to_string(),
            aggregate,
            comparator,
            literal,
            source: format!("{}{}{}", aggregate, comparator.symbol(), rhs),
        })
    }
}

impl fmt::Display for ThresholdExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.metric, self.source)
    }
}

/// 指标没有任何采样时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmptyMetricPolicy {
    #[default]
    Fail,
    Pass,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub source: String,
    pub observed: Option<f64>,
    pub passed: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub results: Vec<ThresholdResult>,
    pub passed: bool,
}

impl Verdict {
    pub fn failures(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_percentile() {
        let expr = ThresholdExpr::parse("http_req_duration", "p(95)<2000").unwrap();
        assert_eq!(expr.aggregate, Aggregate::Percentile(95.0));
        assert_eq!(expr.comparator, Comparator::Lt);
        assert_eq!(expr.literal, 2000.0);
        assert_eq!(expr.source, "p(95)<2000");

        let expr = ThresholdExpr::parse("http_req_duration", "p(99.9) <= 4000").unwrap();
        assert_eq!(expr.aggregate, Aggregate::Percentile(99.9));
        assert_eq!(expr.comparator, Comparator::Le);
    }

    #[test]
    fn test_parse_rate_and_others() {
        let expr = ThresholdExpr::parse("error_rate", "rate<0.01").unwrap();
        assert_eq!(expr.aggregate, Aggregate::Rate);
        assert_eq!(expr.literal, 0.01);

        assert_eq!(
            ThresholdExpr::parse("x", "avg >= 10").unwrap().comparator,
            Comparator::Ge
        );
        assert_eq!(ThresholdExpr::parse("x", "count>0").unwrap().aggregate, Aggregate::Count);
        assert_eq!(ThresholdExpr::parse("x", "value>0").unwrap().aggregate, Aggregate::Value);
        assert_eq!(ThresholdExpr::parse("x", "med<5").unwrap().aggregate, Aggregate::Med);
    }

    #[test]
    fn test_parse_rejects() {
        assert!(ThresholdExpr::parse("x", "p95<2000").is_err());
        assert!(ThresholdExpr::parse("x", "p(101)<2000").is_err());
        assert!(ThresholdExpr::parse("x", "rate==0.01").is_err());
        assert!(ThresholdExpr::parse("x", "rate<abc").is_err());
        assert!(ThresholdExpr::parse("x", "stddev<3").is_err());
        assert!(ThresholdExpr::parse("x", "").is_err());
    }

    #[test]
    fn test_comparator_holds() {
        assert!(Comparator::Lt.holds(1.0, 2.0));
        assert!(!Comparator::Lt.holds(2.0, 2.0));
        assert!(Comparator::Le.holds(2.0, 2.0));
        assert!(Comparator::Gt.holds(3.0, 2.0));
        assert!(Comparator::Ge.holds(2.0, 2.0));
    }

    #[test]
    fn test_applicability() {
        assert!(Aggregate::Percentile(95.0).applies_to(MetricKind::Trend));
        assert!(!Aggregate::Percentile(95.0).applies_to(MetricKind::Rate));
        assert!(Aggregate::Rate.applies_to(MetricKind::Rate));
        assert!(!Aggregate::Rate.applies_to(MetricKind::Counter));
        assert!(Aggregate::Value.applies_to(MetricKind::Counter));
    }
}
