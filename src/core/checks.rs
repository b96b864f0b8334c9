use std::time::Duration;

use jsonpath_lib::select;
use serde_json::Value;

use crate::models::assert_option::AssertOption;
use crate::models::check_stats::CheckStats;
use crate::models::config::CheckOptions;
use crate::models::request_outcome::RequestOutcome;

#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    StatusIs(u16),
    StatusIsNot(u16),
    NoServerError,
    LatencyBelow(Duration),
    BodyNotEmpty,
    BodyContains(String),
    JsonPath(AssertOption),
}

impl Check {
    pub fn name(&self) -> String {
        match self {
            Check::StatusIs(code) => format!("status {}", code),
            Check::StatusIsNot(401) => "no 401 Unauthorized".to_string(),
            Check::StatusIsNot(403) => "no 403 Forbidden".to_string(),
            Check::StatusIsNot(code) => format!("no {}", code),
            Check::NoServerError => "no 5xx Server Error".to_string(),
            Check::LatencyBelow(limit) => format!("response < {} ms", limit.as_millis()),
            Check::BodyNotEmpty => "body not empty".to_string(),
            Check::BodyContains(text) => format!("body contains {}", text),
            Check::JsonPath(opt) => format!("{} == {}", opt.jsonpath, opt.reference_object),
        }
    }

    /// 断言失败不会中断迭代
    pub fn evaluate(&self, outcome: &RequestOutcome) -> bool {
        match self {
            Check::StatusIs(code) => outcome.status == Some(*code),
            Check::StatusIsNot(code) => outcome.status != Some(*code),
            // 网络错误没有状态码，算作通过
            Check::NoServerError => outcome.status.map_or(true, |s| s < 500),
            Check::LatencyBelow(limit) => outcome.duration_ms < limit.as_secs_f64() * 1000.0,
            Check::BodyNotEmpty => !outcome.body.is_empty(),
            Check::BodyContains(text) => {
                !outcome.body.is_empty() && String::from_utf8_lossy(&outcome.body).contains(text.as_str())
            }
            Check::JsonPath(opt) => json_path_matches(opt, &outcome.body),
        }
    }
}

fn json_path_matches(opt: &AssertOption, body: &[u8]) -> bool {
    if body.is_empty() {
        tracing::debug!("响应body为空，无法使用jsonpath获取到数据");
        return false;
    }
    let json_value: Value = match serde_json::from_slice(body) {
        Ok(val) => val,
        Err(e) => {
            tracing::debug!("JSONPath 查询失败: {}", e);
            return false;
        }
    };
    match select(&json_value, &opt.jsonpath) {
        // 只有匹配到唯一值时才比较
        Ok(results) if results.len() == 1 => *results[0] == opt.reference_object,
        Ok(results) => {
            tracing::debug!("JSONPath {} 匹配到 {} 个值，无法进行断言", opt.jsonpath, results.len());
            false
        }
        Err(e) => {
            tracing::debug!("JSONPath 查询失败: {}", e);
            false
        }
    }
}

/// 每次迭代都要跑的一组命名断言
#[derive(Debug, Clone, PartialEq)]
pub struct CheckSet {
    checks: Vec<(String, Check)>,
}

impl CheckSet {
    pub fn new(checks: Vec<Check>) -> Self {
        CheckSet {
            checks: checks.into_iter().map(|c| (c.name(), c)).collect(),
        }
    }

    pub fn from_options(options: &CheckOptions) -> Self {
        let mut checks = vec![
            Check::StatusIs(options.expect_status),
            Check::StatusIsNot(401),
            Check::StatusIsNot(403),
            Check::NoServerError,
            Check::LatencyBelow(options.latency_budget),
            Check::BodyNotEmpty,
        ];
        if let Some(text) = &options.expect_body {
            checks.push(Check::BodyContains(text.clone()));
        }
        checks.extend(options.json_asserts.iter().cloned().map(Check::JsonPath));
        Self::new(checks)
    }

    /// 逐个执行并记入统计，返回失败的断言名称
    pub fn run(&self, outcome: &RequestOutcome, stats: &CheckStats) -> Vec<&str> {
        let mut failed = Vec::new();
        for (name, check) in &self.checks {
            let passed = check.evaluate(outcome);
            stats.record(name, passed);
            if !passed {
                failed.push(name.as_str());
            }
        }
        failed
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_names() {
        let set = CheckSet::from_options(&CheckOptions {
            expect_body: Some("attempt".to_string()),
            ..CheckOptions::default()
        });
        let names: Vec<&str> = set.names().collect();
        assert_eq!(
            names,
            vec![
                "status 200",
                "no 401 Unauthorized",
                "no 403 Forbidden",
                "no 5xx Server Error",
                "response < 2000 ms",
                "body not empty",
                "body contains attempt",
            ]
        );

        let names: Vec<String> = CheckSet::from_options(&CheckOptions::default())
            .names()
            .map(str::to_string)
            .collect();
        assert_eq!(names.last().map(String::as_str), Some("body not empty"));
    }

    #[test]
    fn test_failures_are_independent() {
        let set = CheckSet::from_options(&CheckOptions {
            expect_body: Some("attempt".to_string()),
            ..CheckOptions::default()
        });
        let stats = CheckStats::new();
        let outcome = RequestOutcome::response(503, 2500.0, "down for maintenance");
        let failed = set.run(&outcome, &stats);
        assert_eq!(
            failed,
            vec!["status 200", "no 5xx Server Error", "response < 2000 ms", "body contains attempt"]
        );
        let snap = stats.snapshot();
        assert_eq!(snap["no 401 Unauthorized"].passes, 1);
        assert_eq!(snap["status 200"].fails, 1);
        assert_eq!(snap["body not empty"].passes, 1);

        // 空响应体只让 body 相关断言失败
        let failed = set.run(&RequestOutcome::response(200, 10.0, ""), &stats);
        assert_eq!(failed, vec!["body not empty", "body contains attempt"]);
        assert_eq!(stats.snapshot()["body not empty"].fails, 1);
    }

    #[test]
    fn test_network_failure_checks() {
        let outcome = RequestOutcome::failure(30000.0, "timeout");
        assert!(!Check::StatusIs(200).evaluate(&outcome));
        assert!(Check::NoServerError.evaluate(&outcome));
        assert!(!Check::BodyContains("x".to_string()).evaluate(&outcome));
        assert!(!Check::BodyNotEmpty.evaluate(&outcome));
    }

    #[test]
    fn test_json_path() {
        let check = Check::JsonPath(AssertOption {
            jsonpath: "$.code".to_string(),
            reference_object: json!(429),
        });
        assert!(check.evaluate(&RequestOutcome::response(200, 1.0, r#"{"code":429}"#)));
        assert!(!check.evaluate(&RequestOutcome::response(200, 1.0, r#"{"code":200}"#)));
        assert!(!check.evaluate(&RequestOutcome::response(200, 1.0, "not json")));
        assert!(!check.evaluate(&RequestOutcome::response(200, 1.0, "")));
    }
}
