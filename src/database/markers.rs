use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::routes::marker::model::Marker;

/// 标记存储契约，每个操作都以单条记录为粒度原子执行。
/// 多实例共享同一集合，不变量（id 唯一、确认数单调、时间戳只前进）
/// 全部依靠存储层的条件更新保证，不依赖进程内锁。
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// 插入新标记；id 已存在时不覆盖，返回 false
    async fn insert(&self, marker: &Marker) -> Result<bool, AppError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Marker>, AppError>;

    /// 确认标记：确认数加一并把时间戳刷新到 now（只前进，不回拨）。
    /// 返回更新后的记录，标记不存在时返回 None。
    async fn confirm(&self, id: i64, now_ms: i64) -> Result<Option<Marker>, AppError>;

    /// 删除标记，记录不存在时返回 false
    async fn delete_by_id(&self, id: i64) -> Result<bool, AppError>;

    async fn list_all(&self) -> Result<Vec<Marker>, AppError>;
}

/// Postgres 实现，markers 表结构：
/// id BIGINT 主键，lat/lng DOUBLE PRECISION，timestamp BIGINT（毫秒），
/// confirmations INT，address TEXT，comment TEXT
pub struct PgMarkerStore {
    pool: PgPool,
}

impl PgMarkerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarkerStore for PgMarkerStore {
    async fn insert(&self, marker: &Marker) -> Result<bool, AppError> {
        // ON CONFLICT DO NOTHING：主键冲突由调用方换 id 重试
        let result = sqlx::query(
            "INSERT INTO markers (id, lat, lng, timestamp, confirmations, address, comment) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(marker.id)
        .bind(marker.lat)
        .bind(marker.lng)
        .bind(marker.timestamp)
        .bind(marker.confirmations)
        .bind(&marker.address)
        .bind(&marker.comment)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Marker>, AppError> {
        let marker = sqlx::query_as::<_, Marker>(
            "SELECT id, lat, lng, timestamp, confirmations, address, comment \
             FROM markers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(marker)
    }

    async fn confirm(&self, id: i64, now_ms: i64) -> Result<Option<Marker>, AppError> {
        // GREATEST 保证时间戳只前进；单条 UPDATE 原子完成自增与刷新
        let marker = sqlx::query_as::<_, Marker>(
            "UPDATE markers \
             SET confirmations = confirmations + 1, timestamp = GREATEST(timestamp, $2) \
             WHERE id = $1 \
             RETURNING id, lat, lng, timestamp, confirmations, address, comment",
        )
        .bind(id)
        .bind(now_ms)
        .fetch_optional(&self.pool)
        .await?;

        Ok(marker)
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM markers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_all(&self) -> Result<Vec<Marker>, AppError> {
        let markers = sqlx::query_as::<_, Marker>(
            "SELECT id, lat, lng, timestamp, confirmations, address, comment \
             FROM markers ORDER BY timestamp DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(markers)
    }
}
