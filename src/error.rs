//! 对外暴露的错误类型

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::http_client::HttpClientError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    InvalidSource(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    UpstreamError(String),
    #[error("{0}")]
    NetworkUnavailable(String),
    #[error("{0}")]
    Timeout(String),
}

impl AppError {
    /// 稳定的错误代码，供前端做本地化
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::InvalidSource(_) => "invalid_source",
            Self::NotFound(_) => "not_found",
            Self::UpstreamError(_) => "upstream_error",
            Self::NetworkUnavailable(_) => "network_unavailable",
            Self::Timeout(_) => "timeout",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) | Self::InvalidSource(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamError(_) | Self::NetworkUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl From<HttpClientError> for AppError {
    fn from(e: HttpClientError) -> Self {
        match e {
            HttpClientError::Timeout => Self::Timeout("数据源响应超时".to_string()),
            HttpClientError::NetworkUnavailable(msg) => Self::NetworkUnavailable(format!("网络不可用: {}", msg)),
            HttpClientError::BadStatus(status) => Self::UpstreamError(format!("数据源返回异常状态码: {}", status)),
            HttpClientError::Malformed(msg) => Self::UpstreamError(format!("数据源返回格式错误: {}", msg)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
