use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Client};

use crate::models::error::Result;
use crate::models::request_outcome::RequestOutcome;

/// 发送一次 GET 请求，任何失败都以 status = None 的结果返回，不会 panic
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        timeout: Duration,
        max_redirects: usize,
    ) -> RequestOutcome;
}

/// 基于 reqwest 的实现，按重定向上限缓存 client 以复用连接池
pub struct ReqwestTransport {
    clients: Mutex<HashMap<usize, Client>>,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        ReqwestTransport {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// 提前构建 client，配置错误在开始前暴露
    pub fn with_redirect_limit(max_redirects: usize) -> Result<Self> {
        let transport = Self::new();
        transport.client(max_redirects)?;
        Ok(transport)
    }

    fn client(&self, max_redirects: usize) -> Result<Client> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&max_redirects) {
            return Ok(client.clone());
        }
        // 超过上限时停止跟随，把最后一个 3xx 原样返回
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > max_redirects {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });
        let client = Client::builder().redirect(policy).build()?;
        clients.insert(max_redirects, client.clone());
        Ok(client)
    }
}

fn header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        match (name.parse::<HeaderName>(), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!("无法解析请求头: '{}'", name),
        }
    }
    map
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        timeout: Duration,
        max_redirects: usize,
    ) -> RequestOutcome {
        let client = match self.client(max_redirects) {
            Ok(client) => client,
            Err(e) => return RequestOutcome::failure(0.0, e.to_string()),
        };
        let request = client.get(url).headers(header_map(headers)).timeout(timeout);
        // 记录开始时间
        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return RequestOutcome::failure(elapsed_ms(start), describe(&e)),
        };
        let status = response.status().as_u16();
        // 响应体读取失败同样算作网络错误
        match response.bytes().await {
            Ok(body) => RequestOutcome::response(status, elapsed_ms(start), body),
            Err(e) => RequestOutcome::failure(elapsed_ms(start), describe(&e)),
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("请求超时: {}", e)
    } else if e.is_connect() {
        format!("连接失败: {}", e)
    } else {
        e.to_string()
    }
}
