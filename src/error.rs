use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::cache::rate_limit::RATE_WINDOW_MS;
use crate::utils::{error_codes, error_to_api_response};

#[derive(Debug, Error)]
pub enum AppError {
    /// 请求参数不完整或格式错误
    #[error("{0}")]
    Validation(String),

    /// 限流窗口内的重复操作
    #[error("操作过于频繁")]
    RateLimited,

    /// 标记不存在（已被删除或id错误）
    #[error("标记不存在")]
    NotFound,

    #[error("数据库错误: {0}")]
    Store(#[from] sqlx::Error),

    #[error("缓存错误: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR, msg.clone())
            }
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                error_codes::RATE_LIMIT,
                format!("操作过于频繁，请在{}秒后重试", RATE_WINDOW_MS / 1000),
            ),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                error_codes::NOT_FOUND,
                "标记不存在".to_string(),
            ),
            AppError::Store(_) | AppError::Cache(_) | AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_codes::INTERNAL_ERROR,
                "内部服务器错误，请稍后重试".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!("请求处理失败: {:?}", self);
        }

        (status, error_to_api_response::<()>(code, msg)).into_response()
    }
}
