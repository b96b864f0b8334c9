use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::core::parse_duration::parse_duration;
use crate::models::assert_option::AssertOption;
use crate::models::config::{self, CheckOptions, LoadConfig, ProbeOptions, ThinkTime};
use crate::models::error::{LoadError, Result};
use crate::models::threshold::EmptyMetricPolicy;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// 目标地址
    #[arg(short, long, env = "TARGET_URL", default_value = config::DEFAULT_BASE_URL)]
    pub url: String,

    /// 目标路径（可带查询参数）
    #[arg(short, long, env = "TARGET_PATH", default_value = "/")]
    pub path: String,

    /// 最大并发用户数
    #[arg(long, env = "VUS", default_value_t = config::DEFAULT_VUS)]
    pub vus: usize,

    /// 爬升时长
    #[arg(long, env = "RAMP_UP", default_value = "1m", value_parser = parse_duration)]
    pub ramp_up: Duration,

    /// 保持时长
    #[arg(short, long, env = "DURATION", default_value = "10m", value_parser = parse_duration)]
    pub duration: Duration,

    /// 下降时长
    #[arg(long, env = "RAMP_DOWN", default_value = "30s", value_parser = parse_duration)]
    pub ramp_down: Duration,

    /// Bearer token
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// cookie
    #[arg(short, long, env = "SESSION_COOKIE", hide_env_values = true)]
    pub cookie: Option<String>,

    /// 请求头，格式 "name: value"，可重复
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// 单次请求超时
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// 最多跟随的重定向次数
    #[arg(long, env = "MAX_REDIRECTS", default_value_t = 5)]
    pub max_redirects: usize,

    /// 思考时间下限
    #[arg(long, env = "THINK_TIME_MIN", default_value = "1s", value_parser = parse_duration)]
    pub think_min: Duration,

    /// 思考时间上限
    #[arg(long, env = "THINK_TIME_MAX", default_value = "3s", value_parser = parse_duration)]
    pub think_max: Duration,

    /// 探测请求超时
    #[arg(long, env = "PROBE_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub probe_timeout: Duration,

    /// 跳过开始前的探测请求
    #[arg(long, default_value_t = false)]
    pub skip_probe: bool,

    /// 探测失败时仍继续压测
    #[arg(long, default_value_t = false)]
    pub no_abort_on_probe_failure: bool,

    /// 结束时等待进行中请求的最长时间
    #[arg(long, env = "GRACEFUL_STOP", default_value = "30s", value_parser = parse_duration)]
    pub graceful_stop: Duration,

    /// 阈值检查间隔，0 表示只在结束时检查
    #[arg(long, env = "CHECKPOINT_INTERVAL", default_value = "10s", value_parser = parse_duration)]
    pub checkpoint_interval: Duration,

    /// 断言期望的状态码
    #[arg(long, env = "EXPECT_STATUS", default_value_t = 200)]
    pub expect_status: u16,

    /// 断言的响应时间上限
    #[arg(long, env = "LATENCY_BUDGET", default_value = "2000ms", value_parser = parse_duration)]
    pub latency_budget: Duration,

    /// 断言响应体包含的文本
    #[arg(long, env = "EXPECT_BODY")]
    pub expect_body: Option<String>,

    /// jsonpath 断言，格式 "$.path=<json>"，可重复
    #[arg(long = "assert-json")]
    pub assert_json: Vec<String>,

    /// 阈值，格式 "metric:expr"，例如 "error_rate:rate<0.05"，可重复
    #[arg(short, long = "threshold")]
    pub thresholds: Vec<String>,

    /// 不使用默认阈值
    #[arg(long, default_value_t = false)]
    pub no_default_thresholds: bool,

    /// 没有采样的指标视为通过
    #[arg(long, default_value_t = false)]
    pub pass_on_empty: bool,

    /// 不显示进度条
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    /// 结果写入 json 文件
    #[arg(long)]
    pub summary_json: Option<PathBuf>,
}

impl Args {
    pub fn to_config(&self) -> Result<LoadConfig> {
        let mut headers = Vec::with_capacity(self.headers.len());
        for header in &self.headers {
            let (name, value) = header
                .split_once(':')
                .ok_or_else(|| LoadError::InvalidHeader(header.clone()))?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let json_asserts = self
            .assert_json
            .iter()
            .map(|s| AssertOption::parse(s))
            .collect::<Result<Vec<_>>>()?;

        let mut thresholds = if self.no_default_thresholds {
            Default::default()
        } else {
            config::default_thresholds()
        };
        let mut overridden = Vec::new();
        for raw in &self.thresholds {
            let (metric, expr) = raw.split_once(':').ok_or_else(|| LoadError::InvalidThreshold {
                metric: String::new(),
                expr: raw.clone(),
                reason: "格式应为 metric:expr".to_string(),
            })?;
            let metric = metric.trim().to_string();
            // 用户给出的阈值替换该指标的默认阈值
            if !overridden.contains(&metric) {
                thresholds.remove(&metric);
                overridden.push(metric.clone());
            }
            thresholds.entry(metric).or_insert_with(Vec::new).push(expr.trim().to_string());
        }

        let config = LoadConfig {
            base_url: self.url.clone(),
            path: self.path.clone(),
            vus: self.vus,
            ramp_up: self.ramp_up,
            soak: self.duration,
            ramp_down: self.ramp_down,
            auth_token: self.auth_token.clone().filter(|s| !s.is_empty()),
            session_cookie: self.cookie.clone().filter(|s| !s.is_empty()),
            headers,
            request_timeout: self.timeout,
            max_redirects: self.max_redirects,
            think_time: ThinkTime {
                min: self.think_min,
                max: self.think_max,
            },
            probe: ProbeOptions {
                enabled: !self.skip_probe,
                timeout: self.probe_timeout,
                abort_on_failure: !self.no_abort_on_probe_failure,
            },
            graceful_stop: self.graceful_stop,
            checkpoint_interval: self.checkpoint_interval,
            checks: CheckOptions {
                expect_status: self.expect_status,
                latency_budget: self.latency_budget,
                expect_body: self.expect_body.clone().filter(|s| !s.is_empty()),
                json_asserts,
            },
            thresholds,
            empty_metric_policy: if self.pass_on_empty {
                EmptyMetricPolicy::Pass
            } else {
                EmptyMetricPolicy::Fail
            },
            ..LoadConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}
