use std::collections::HashMap;

use reqwest::header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, COOKIE, USER_AGENT};

use crate::models::config::LoadConfig;
use crate::models::error::{LoadError, Result};

/// 每次迭代前调用，内容对核心不透明
pub trait HeaderBuilder: Send + Sync {
    fn build_headers(&self) -> HashMap<String, String>;
}

/// 启动时从配置构建一次的固定请求头
#[derive(Debug, Clone)]
pub struct StaticHeaders {
    headers: HashMap<String, String>,
}

impl StaticHeaders {
    pub fn new(headers: HashMap<String, String>) -> Result<Self> {
        for (name, value) in &headers {
            name.parse::<HeaderName>()
                .map_err(|_| LoadError::InvalidHeader(name.clone()))?;
            HeaderValue::from_str(value).map_err(|_| LoadError::InvalidHeader(format!("{}: {}", name, value)))?;
        }
        Ok(StaticHeaders { headers })
    }

    pub fn from_config(config: &LoadConfig) -> Result<Self> {
        let mut headers = HashMap::new();
        headers.insert(USER_AGENT.as_str().to_string(), default_user_agent());
        headers.insert(
            ACCEPT.as_str().to_string(),
            "application/json, text/plain, */*".to_string(),
        );
        if let Some(token) = &config.auth_token {
            headers.insert(AUTHORIZATION.as_str().to_string(), format!("Bearer {}", token));
        }
        if let Some(cookie) = &config.session_cookie {
            headers.insert(COOKIE.as_str().to_string(), cookie.clone());
        }
        // 用户传入的请求头覆盖默认值
        for (name, value) in &config.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }
        Self::new(headers)
    }
}

impl HeaderBuilder for StaticHeaders {
    fn build_headers(&self) -> HashMap<String, String> {
        self.headers.clone()
    }
}

/// 例如 "vu-bomb-engine 0.1.0 (Ubuntu; 22.04)"
pub fn default_user_agent() -> String {
    let info = os_info::get();
    format!(
        "{} {} ({}; {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        info.os_type(),
        info.version()
    )
}
