use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;

use crate::models::assert_option::AssertOption;
use crate::models::error::{LoadError, Result};
use crate::models::metric_sample::{ERROR_RATE, HTTP_REQ_DURATION, HTTP_REQ_FAILED, SUCCESS_LATENCY};
use crate::models::stage::{Stage, TestPlan};
use crate::models::threshold::{EmptyMetricPolicy, ThresholdExpr};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_VUS: usize = 300;

/// 两次迭代之间的停顿区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl Default for ThinkTime {
    fn default() -> Self {
        ThinkTime {
            min: Duration::from_secs(1),
            max: Duration::from_secs(3),
        }
    }
}

impl ThinkTime {
    pub fn none() -> Self {
        ThinkTime {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOptions {
    pub enabled: bool,
    pub timeout: Duration,
    pub abort_on_failure: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptions {
            enabled: true,
            timeout: Duration::from_secs(10),
            abort_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOptions {
    pub expect_status: u16,
    pub latency_budget: Duration,
    pub expect_body: Option<String>,
    pub json_asserts: Vec<AssertOption>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions {
            expect_status: 200,
            latency_budget: Duration::from_millis(2000),
            expect_body: None,
            json_asserts: Vec::new(),
        }
    }
}

/// 启动时校验一次，之后只读
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadConfig {
    pub base_url: String,
    pub path: String,
    pub vus: usize,
    pub ramp_up: Duration,
    pub soak: Duration,
    pub ramp_down: Duration,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    #[serde(skip_serializing)]
    pub session_cookie: Option<String>,
    pub headers: Vec<(String, String)>,
    pub request_timeout: Duration,
    pub max_redirects: usize,
    pub think_time: ThinkTime,
    pub probe: ProbeOptions,
    pub graceful_stop: Duration,
    pub reconcile_interval: Duration,
    pub checkpoint_interval: Duration,
    pub checks: CheckOptions,
    pub thresholds: BTreeMap<String, Vec<String>>,
    pub empty_metric_policy: EmptyMetricPolicy,
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            path: "/".to_string(),
            vus: DEFAULT_VUS,
            ramp_up: Duration::from_secs(60),
            soak: Duration::from_secs(600),
            ramp_down: Duration::from_secs(30),
            auth_token: None,
            session_cookie: None,
            headers: Vec::new(),
            request_timeout: Duration::from_secs(30),
            max_redirects: 5,
            think_time: ThinkTime::default(),
            probe: ProbeOptions::default(),
            graceful_stop: Duration::from_secs(30),
            reconcile_interval: Duration::from_secs(1),
            checkpoint_interval: Duration::from_secs(10),
            checks: CheckOptions::default(),
            thresholds: default_thresholds(),
            empty_metric_policy: EmptyMetricPolicy::Fail,
        }
    }
}

/// 默认阈值：p95 < 2s，p99 < 4s，错误率 < 1%
pub fn default_thresholds() -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    out.insert(
        HTTP_REQ_DURATION.to_string(),
        vec!["p(95)<2000".to_string(), "p(99)<4000".to_string()],
    );
    out.insert(SUCCESS_LATENCY.to_string(), vec!["p(95)<2000".to_string()]);
    out.insert(ERROR_RATE.to_string(), vec!["rate<0.01".to_string()]);
    out.insert(HTTP_REQ_FAILED.to_string(), vec!["rate<0.01".to_string()]);
    out
}

impl LoadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.vus == 0 {
            return Err(LoadError::InvalidConfig("VUS 必须大于 0".to_string()));
        }
        if self.think_time.min > self.think_time.max {
            return Err(LoadError::InvalidConfig(format!(
                "思考时间下限 {:?} 大于上限 {:?}",
                self.think_time.min, self.think_time.max
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(LoadError::InvalidConfig("请求超时必须大于 0".to_string()));
        }
        if self.reconcile_interval.is_zero() {
            return Err(LoadError::InvalidConfig("调度间隔必须大于 0".to_string()));
        }
        self.target_url()?;
        self.test_plan()?;
        Ok(())
    }

    pub fn target_url(&self) -> Result<Url> {
        let base = self.base_url.trim_end_matches('/');
        let path = if self.path.is_empty() || self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        let url = Url::parse(&format!("{}{}", base, path))
            .map_err(|e| LoadError::InvalidConfig(format!("目标地址无效 '{}{}': {}", base, path, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(LoadError::InvalidConfig(format!("不支持的协议: {}", other))),
        }
    }

    /// 0 → VUS 爬升，保持 VUS，再降到 0
    pub fn stages(&self) -> Vec<Stage> {
        vec![
            Stage::new(self.ramp_up, self.vus),
            Stage::new(self.soak, self.vus),
            Stage::new(self.ramp_down, 0),
        ]
    }

    pub fn test_plan(&self) -> Result<TestPlan> {
        let mut plan = TestPlan::new(self.stages()).with_empty_metric_policy(self.empty_metric_policy);
        for (metric, exprs) in &self.thresholds {
            for expr in exprs {
                plan.add_threshold(ThresholdExpr::parse(metric, expr)?)?;
            }
        }
        Ok(plan)
    }
}
