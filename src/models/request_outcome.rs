use bytes::Bytes;
use serde::Serialize;

/// 一次请求的结果，status 为 None 表示网络错误或超时
#[derive(Debug, Clone, Default)]
pub struct RequestOutcome {
    pub status: Option<u16>,
    pub duration_ms: f64,
    pub body: Bytes,
    pub error: Option<String>,
}

impl RequestOutcome {
    pub fn response(status: u16, duration_ms: f64, body: impl Into<Bytes>) -> Self {
        RequestOutcome {
            status: Some(status),
            duration_ms,
            body: body.into(),
            error: None,
        }
    }

    pub fn failure(duration_ms: f64, error: impl Into<String>) -> Self {
        RequestOutcome {
            status: None,
            duration_ms,
            body: Bytes::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_timeout_or_network_failure(&self) -> bool {
        self.status.is_none()
    }

    pub fn is_error(&self) -> bool {
        match self.status {
            None => true,
            Some(code) => code >= 400,
        }
    }

    pub fn class(&self) -> OutcomeClass {
        match self.status {
            None => OutcomeClass::TransportFailure,
            Some(code) if code >= 500 => OutcomeClass::ServerError,
            Some(code) if code >= 400 => OutcomeClass::ClientError {
                auth: code == 401 || code == 403,
            },
            Some(_) => OutcomeClass::Success,
        }
    }

    /// 响应体前 limit 个字节，用于错误日志
    pub fn body_excerpt(&self, limit: usize) -> String {
        if self.body.is_empty() {
            return "empty body".to_string();
        }
        let end = self.body.len().min(limit);
        String::from_utf8_lossy(&self.body[..end]).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeClass {
    Success,
    TransportFailure,
    ClientError { auth: bool },
    ServerError,
}

impl OutcomeClass {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, OutcomeClass::ClientError { auth: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(RequestOutcome::response(200, 1.0, "").class(), OutcomeClass::Success);
        assert_eq!(RequestOutcome::response(302, 1.0, "").class(), OutcomeClass::Success);
        assert_eq!(
            RequestOutcome::response(401, 1.0, "").class(),
            OutcomeClass::ClientError { auth: true }
        );
        assert_eq!(
            RequestOutcome::response(403, 1.0, "").class(),
            OutcomeClass::ClientError { auth: true }
        );
        assert_eq!(
            RequestOutcome::response(404, 1.0, "").class(),
            OutcomeClass::ClientError { auth: false }
        );
        assert_eq!(RequestOutcome::response(503, 1.0, "").class(), OutcomeClass::ServerError);
        assert_eq!(RequestOutcome::failure(1.0, "timeout").class(), OutcomeClass::TransportFailure);
    }

    #[test]
    fn test_error_flags() {
        let timeout = RequestOutcome::failure(30000.0, "operation timed out");
        assert!(timeout.is_error());
        assert!(timeout.is_timeout_or_network_failure());

        let server = RequestOutcome::response(500, 10.0, "boom");
        assert!(server.is_error());
        assert!(!server.is_timeout_or_network_failure());

        let ok = RequestOutcome::response(399, 10.0, "ok");
        assert!(!ok.is_error());
    }

    #[test]
    fn test_body_excerpt() {
        let outcome = RequestOutcome::response(500, 1.0, "x".repeat(300));
        assert_eq!(outcome.body_excerpt(200).len(), 200);
        assert_eq!(RequestOutcome::response(500, 1.0, "").body_excerpt(200), "empty body");
    }
}
