use std::io;

use axum::response::IntoResponse;
use reqwest::StatusCode;

pub type Result<T> = core::result::Result<T, Error>;

/// 统一错误类型
///
/// - 内容服务相关：[`Error::Reqwest`]、[`Error::Fetch`]、[`Error::Json`]
/// - 文档不存在：[`Error::NotFound`]
/// - 文档缺少必填字段：[`Error::Validation`]
/// - 配置与 IO：[`Error::Config`]、[`Error::Toml`]、[`Error::Io`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Not Found")]
    NotFound,

    #[error("invalid document: {0}")]
    Validation(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// 是否为内容服务请求失败（网络、状态码、响应格式）
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Reqwest(_) | Error::Fetch(_) | Error::Json(_))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        match self {
            Error::Reqwest(e) => {
                tracing::error!(%e, "content service error");
                (StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
            .into_response(),
            Error::Fetch(e) => {
                tracing::error!(%e, "content service error");
                (StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
            .into_response(),
            Error::Json(e) => {
                tracing::error!(%e, "malformed content service response");
                (StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
            .into_response(),
            Error::Validation(e) => {
                tracing::error!(%e, "document validation failed");
                (StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
            .into_response(),
            Error::NotFound => (StatusCode::NOT_FOUND, "NOT FOUND").into_response(),
            Error::Config(e) => {
                tracing::error!(%e, "config error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
            .into_response(),
            Error::Toml(e) => {
                tracing::error!(%e, "config error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
            .into_response(),
            Error::Io(e) => {
                tracing::error!(%e, "file io error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
            .into_response(),
        }
    }
}
