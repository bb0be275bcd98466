//! HTTP 传输层
//! 所有上游请求都经过这里，可选地经由代理转发

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const CONNECT_TIMEOUT_SECONDS: u64 = 5;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36 (VodSearch)";

/// 全局 HTTP 客户端，超时由每次请求单独指定
pub static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECONDS))
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .gzip(true)
        .brotli(true)
        .build()
        .expect("Failed to create HTTP client")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpClientError {
    #[error("请求超时")]
    Timeout,
    #[error("网络不可用: {0}")]
    NetworkUnavailable(String),
    #[error("响应异常状态码: {0}")]
    BadStatus(u16),
    #[error("响应格式错误: {0}")]
    Malformed(String),
}

impl HttpClientError {
    /// 只有网络层面的失败值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::NetworkUnavailable(_))
    }
}

impl From<reqwest::Error> for HttpClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::BadStatus(status.as_u16())
        } else {
            Self::NetworkUnavailable(e.to_string())
        }
    }
}

/// 单次 GET 请求，测试中可替换
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, HttpClientError>;
}

/// 基于 reqwest 的实现
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    proxy_url: Option<String>,
}

impl HttpTransport {
    pub fn new(proxy_url: Option<String>) -> Self {
        Self {
            proxy_url: proxy_url.filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn request_url(&self, target: &str) -> String {
        match &self.proxy_url {
            Some(proxy) => proxied_url(proxy, target),
            None => target.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, HttpClientError> {
        let request_url = self.request_url(url);
        debug!("GET {}", request_url);

        let response = HTTP_CLIENT.get(&request_url).timeout(timeout).send().await?;

        if !response.status().is_success() {
            return Err(HttpClientError::BadStatus(response.status().as_u16()));
        }

        response.text().await.map_err(HttpClientError::from)
    }
}

/// `{proxy}{百分号编码后的目标地址}`
pub fn proxied_url(proxy: &str, target: &str) -> String {
    format!("{}{}", proxy, urlencoding::encode(target))
}
