use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// 陈旧阈值：超过该时长未被确认的标记在读取时显示为 stale。
/// 数值上与限流窗口同属5分钟一档，但这是展示策略，与限流互相独立。
pub const STALE_AFTER_MS: i64 = 5 * 60 * 1000;

/// 空备注的占位符
pub const COMMENT_PLACEHOLDER: &str = "-";

/// 地址解析失败时的占位符
pub const ADDRESS_PLACEHOLDER: &str = "-";

/// 展示状态，读取时实时计算，不落库
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerStatus {
    Active,
    Stale,
}

/// 一条岗点标记的持久化记录
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Marker {
    pub id: i64,
    pub lat: f64,
    pub lng: f64,
    /// 创建时间，每次确认刷新（毫秒时间戳，只前进）
    pub timestamp: i64,
    pub confirmations: i32,
    pub address: String,
    pub comment: String,
}

/// 带展示状态的标记，即接口返回的形态
#[derive(Debug, Clone, Serialize)]
pub struct MarkerView {
    pub id: i64,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: i64,
    pub status: MarkerStatus,
    pub confirmations: i32,
    pub address: String,
    pub comment: String,
}

impl Marker {
    pub fn with_status(self, now_ms: i64) -> MarkerView {
        let status = classify(self.timestamp, now_ms);
        MarkerView {
            id: self.id,
            lat: self.lat,
            lng: self.lng,
            timestamp: self.timestamp,
            status,
            confirmations: self.confirmations,
            address: self.address,
            comment: self.comment,
        }
    }
}

/// 陈旧判定：只依赖 now 与标记时间戳的差值，无副作用。
/// 同一条标记随时间流逝可在相邻两次读取之间从 active 变为 stale，
/// 被确认后又回到 active，期间不产生任何写入。
pub fn classify(timestamp_ms: i64, now_ms: i64) -> MarkerStatus {
    if now_ms - timestamp_ms > STALE_AFTER_MS {
        MarkerStatus::Stale
    } else {
        MarkerStatus::Active
    }
}

/// 空白备注统一为占位符
pub fn normalize_comment(comment: Option<String>) -> String {
    match comment {
        Some(c) if !c.trim().is_empty() => c,
        _ => COMMENT_PLACEHOLDER.to_string(),
    }
}

/// 分配标记id：毫秒时间戳左移20位，低位填随机后缀。
/// 创建本身被限流拉开了时间间隔，随机后缀用来消除
/// 不同客户端同一毫秒创建时的碰撞；主键约束兜底，冲突时调用方重试。
pub fn allocate_id(now_ms: i64) -> i64 {
    let suffix = (Uuid::new_v4().as_u128() & 0xF_FFFF) as i64;
    (now_ms << 20) | suffix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_is_active_up_to_threshold() {
        let t0 = 1_700_000_000_000;
        assert_eq!(classify(t0, t0), MarkerStatus::Active);
        assert_eq!(classify(t0, t0 + STALE_AFTER_MS), MarkerStatus::Active);
        assert_eq!(classify(t0, t0 + STALE_AFTER_MS + 1), MarkerStatus::Stale);
    }

    #[test]
    fn classify_is_deterministic() {
        let t0 = 1_700_000_000_000;
        let a = classify(t0, t0 + 1000);
        let b = classify(t0, t0 + 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn blank_comment_becomes_placeholder() {
        assert_eq!(normalize_comment(None), "-");
        assert_eq!(normalize_comment(Some("".into())), "-");
        assert_eq!(normalize_comment(Some("   ".into())), "-");
        assert_eq!(normalize_comment(Some("пост у моста".into())), "пост у моста");
    }

    #[test]
    fn ids_in_same_millisecond_differ() {
        let now = 1_700_000_000_000;
        let a = allocate_id(now);
        let b = allocate_id(now);
        assert_ne!(a, b);
        assert_eq!(a >> 20, now);
        assert_eq!(b >> 20, now);
    }
}
