use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckTally {
    pub passes: u64,
    pub fails: u64,
}

impl CheckTally {
    pub fn pass_rate(&self) -> f64 {
        let total = self.passes + self.fails;
        if total == 0 {
            0.0
        } else {
            self.passes as f64 / total as f64
        }
    }
}

/// 各个断言的通过/失败次数，只用于诊断，不影响最终结论
#[derive(Default)]
pub struct CheckStats {
    // {断言名称: 统计}
    checks: Mutex<BTreeMap<String, CheckTally>>,
}

impl CheckStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, passed: bool) {
        let mut checks = self.checks.lock();
        let tally = checks.entry(name.to_string()).or_default();
        if passed {
            tally.passes += 1;
        } else {
            tally.fails += 1;
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, CheckTally> {
        self.checks.lock().clone()
    }
}
