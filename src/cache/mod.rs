// 缓存模块
// 限流记录存放在 Redis 中，按 (客户端, 操作) 维度记录上一次放行时间

pub mod keys;
pub mod rate_limit;

pub use rate_limit::{RATE_WINDOW_MS, RateAction, RateLimitStore, RedisRateLimiter};
