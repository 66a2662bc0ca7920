use std::sync::Arc;

use async_trait::async_trait;
use redis::Client as RedisClient;

use crate::cache::keys;
use crate::error::AppError;

/// 限流窗口：同一客户端对同一操作的最小间隔，固定5分钟
pub const RATE_WINDOW_MS: i64 = 5 * 60 * 1000;

/// 受限流约束的操作种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateAction {
    Add,
    Delete,
}

impl RateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateAction::Add => "add",
            RateAction::Delete => "delete",
        }
    }
}

/// 限流记录存取契约：check_and_record 对单个 (客户端, 操作) 键必须是原子操作，
/// 同一客户端并发的同种操作在一个窗口内最多放行一次。
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check_and_record(
        &self,
        client_id: &str,
        action: RateAction,
        now_ms: i64,
    ) -> Result<bool, AppError>;
}

/// Redis 实现：SET NX PX 一条命令完成检查与记录，
/// 键不存在（或已随窗口过期）时写入并放行，否则保持原记录不变并拒绝。
/// 过期时间即窗口长度，陈旧记录由 Redis 自行清理。
pub struct RedisRateLimiter {
    redis: Arc<RedisClient>,
}

impl RedisRateLimiter {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimiter {
    async fn check_and_record(
        &self,
        client_id: &str,
        action: RateAction,
        now_ms: i64,
    ) -> Result<bool, AppError> {
        let key = keys::rate_limit_key(action.as_str(), client_id);
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(now_ms)
            .arg("NX")
            .arg("PX")
            .arg(RATE_WINDOW_MS)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }
}
