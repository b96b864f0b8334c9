use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpErrorEntry {
    /// None 表示网络错误或超时
    pub status: Option<u16>,
    pub message: String,
    pub count: u64,
}

#[derive(Default)]
pub struct HttpErrorStats {
    // {(状态码, 错误信息): 次数}
    errors: Mutex<HashMap<(Option<u16>, String), u64>>,
}

impl HttpErrorStats {
    pub fn new() -> Self {
        Self::default()
    }

    // 增加一个错误和对应的出现次数
    pub fn increment(&self, status: Option<u16>, message: String) {
        let mut errors = self.errors.lock();
        *errors.entry((status, message)).or_insert(0) += 1;
    }

    pub fn total(&self) -> u64 {
        self.errors.lock().values().sum()
    }

    /// 按次数倒序
    pub fn entries(&self) -> Vec<HttpErrorEntry> {
        let errors = self.errors.lock();
        let mut out: Vec<HttpErrorEntry> = errors
            .iter()
            .map(|((status, message), count)| HttpErrorEntry {
                status: *status,
                message: message.clone(),
                count: *count,
            })
            .collect();
        out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.status.cmp(&b.status)));
        out
    }

    pub fn auth_failures(&self) -> u64 {
        self.errors
            .lock()
            .iter()
            .filter(|((status, _), _)| matches!(status, Some(401) | Some(403)))
            .map(|(_, count)| *count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_sort() {
        let stats = HttpErrorStats::new();
        stats.increment(Some(500), "HTTP 500".to_string());
        stats.increment(None, "timeout".to_string());
        stats.increment(None, "timeout".to_string());
        stats.increment(Some(401), "HTTP 401".to_string());

        let entries = stats.entries();
        assert_eq!(entries[0].status, None);
        assert_eq!(entries[0].count, 2);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.auth_failures(), 1);
    }
}
