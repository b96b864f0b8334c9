use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("配置无效: {0}")]
    InvalidConfig(String),

    #[error("无法解析时长 '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("阈值表达式无效 '{expr}' (指标 {metric}): {reason}")]
    InvalidThreshold {
        metric: String,
        expr: String,
        reason: String,
    },

    #[error("请求头无效 '{0}'")]
    InvalidHeader(String),

    #[error("无法连接目标: {0}")]
    TargetUnreachable(String),

    #[error("鉴权失败 (HTTP {0})，cookie/JWT 可能已过期")]
    AuthRejected(u16),

    #[error("构建http客户端失败: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, LoadError>;
