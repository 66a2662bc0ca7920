use std::sync::Arc;

use crate::cache::rate_limit::{RateAction, RateLimitStore};
use crate::database::markers::MarkerStore;
use crate::error::AppError;
use crate::geocode::ReverseGeocoder;

use super::model::{
    ADDRESS_PLACEHOLDER, Marker, MarkerView, allocate_id, normalize_comment,
};

/// 标记生命周期的编排层：写操作先过限流，读操作实时计算展示状态。
/// 自身不持有任何共享可变状态，可在多实例间水平扩展，
/// 不变量全部落在存储层的原子操作上。
pub struct MarkerService {
    store: Arc<dyn MarkerStore>,
    limiter: Arc<dyn RateLimitStore>,
    geocoder: Arc<dyn ReverseGeocoder>,
}

impl MarkerService {
    pub fn new(
        store: Arc<dyn MarkerStore>,
        limiter: Arc<dyn RateLimitStore>,
        geocoder: Arc<dyn ReverseGeocoder>,
    ) -> Self {
        Self {
            store,
            limiter,
            geocoder,
        }
    }

    /// 全量列出标记，逐条计算展示状态，无副作用
    pub async fn list(&self, now_ms: i64) -> Result<Vec<MarkerView>, AppError> {
        let markers = self.store.list_all().await?;
        Ok(markers
            .into_iter()
            .map(|m| m.with_status(now_ms))
            .collect())
    }

    /// 创建标记。地址解析失败只降级为占位符，不影响创建本身。
    pub async fn create(
        &self,
        client_id: &str,
        lat: f64,
        lng: f64,
        comment: Option<String>,
        now_ms: i64,
    ) -> Result<MarkerView, AppError> {
        if !self
            .limiter
            .check_and_record(client_id, RateAction::Add, now_ms)
            .await?
        {
            return Err(AppError::RateLimited);
        }

        let comment = normalize_comment(comment);
        let address = match self.geocoder.reverse(lat, lng).await {
            Ok(addr) => addr,
            Err(err) => {
                tracing::warn!("地址解析失败，使用占位符: {}", err);
                ADDRESS_PLACEHOLDER.to_string()
            }
        };

        // 随机后缀碰撞概率极低，换一个后缀重试几次即可
        for _ in 0..3 {
            let marker = Marker {
                id: allocate_id(now_ms),
                lat,
                lng,
                timestamp: now_ms,
                confirmations: 0,
                address: address.clone(),
                comment: comment.clone(),
            };
            if self.store.insert(&marker).await? {
                return Ok(marker.with_status(now_ms));
            }
        }

        Err(AppError::Internal("标记id分配冲突".into()))
    }

    /// 确认标记：确认数加一，时间戳刷新，陈旧标记因此回到 active。
    /// 确认不限流，群众的持续确认正是标记保持存活的机制。
    pub async fn confirm(&self, id: i64, now_ms: i64) -> Result<MarkerView, AppError> {
        match self.store.confirm(id, now_ms).await? {
            Some(marker) => Ok(marker.with_status(now_ms)),
            None => Err(AppError::NotFound),
        }
    }

    /// 删除标记，与创建一样按 (客户端, 操作) 限流
    pub async fn delete(&self, client_id: &str, id: i64, now_ms: i64) -> Result<(), AppError> {
        if !self
            .limiter
            .check_and_record(client_id, RateAction::Delete, now_ms)
            .await?
        {
            return Err(AppError::RateLimited);
        }

        if self.store.delete_by_id(id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::rate_limit::RATE_WINDOW_MS;
    use crate::geocode::GeocodeError;
    use crate::routes::marker::model::{MarkerStatus, STALE_AFTER_MS};

    const T0: i64 = 1_700_000_000_000;

    /// 内存标记存储，语义对齐 Postgres 实现
    #[derive(Default)]
    struct MemMarkerStore {
        markers: Mutex<HashMap<i64, Marker>>,
    }

    #[async_trait]
    impl MarkerStore for MemMarkerStore {
        async fn insert(&self, marker: &Marker) -> Result<bool, AppError> {
            let mut markers = self.markers.lock().unwrap();
            if markers.contains_key(&marker.id) {
                return Ok(false);
            }
            markers.insert(marker.id, marker.clone());
            Ok(true)
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<Marker>, AppError> {
            Ok(self.markers.lock().unwrap().get(&id).cloned())
        }

        async fn confirm(&self, id: i64, now_ms: i64) -> Result<Option<Marker>, AppError> {
            let mut markers = self.markers.lock().unwrap();
            match markers.get_mut(&id) {
                Some(marker) => {
                    marker.confirmations += 1;
                    marker.timestamp = marker.timestamp.max(now_ms);
                    Ok(Some(marker.clone()))
                }
                None => Ok(None),
            }
        }

        async fn delete_by_id(&self, id: i64) -> Result<bool, AppError> {
            Ok(self.markers.lock().unwrap().remove(&id).is_some())
        }

        async fn list_all(&self) -> Result<Vec<Marker>, AppError> {
            Ok(self.markers.lock().unwrap().values().cloned().collect())
        }
    }

    /// 内存限流记录：放行时写入时间，拒绝时保持原记录不动
    #[derive(Default)]
    struct MemRateLimiter {
        last: Mutex<HashMap<(String, RateAction), i64>>,
    }

    #[async_trait]
    impl RateLimitStore for MemRateLimiter {
        async fn check_and_record(
            &self,
            client_id: &str,
            action: RateAction,
            now_ms: i64,
        ) -> Result<bool, AppError> {
            let mut last = self.last.lock().unwrap();
            let key = (client_id.to_string(), action);
            match last.get(&key) {
                Some(&at) if now_ms - at < RATE_WINDOW_MS => Ok(false),
                _ => {
                    last.insert(key, now_ms);
                    Ok(true)
                }
            }
        }
    }

    struct StubGeocoder {
        address: Option<String>,
    }

    impl StubGeocoder {
        fn resolving(address: &str) -> Self {
            Self {
                address: Some(address.to_string()),
            }
        }

        fn failing() -> Self {
            Self { address: None }
        }
    }

    #[async_trait]
    impl ReverseGeocoder for StubGeocoder {
        async fn reverse(&self, _lat: f64, _lng: f64) -> Result<String, GeocodeError> {
            self.address.clone().ok_or(GeocodeError::Timeout)
        }
    }

    fn service_with(geocoder: StubGeocoder) -> (MarkerService, Arc<MemMarkerStore>) {
        let store = Arc::new(MemMarkerStore::default());
        let service = MarkerService::new(
            store.clone(),
            Arc::new(MemRateLimiter::default()),
            Arc::new(geocoder),
        );
        (service, store)
    }

    fn service() -> (MarkerService, Arc<MemMarkerStore>) {
        service_with(StubGeocoder::resolving("Рязань, Первомайский проспект"))
    }

    #[tokio::test]
    async fn create_normalizes_blank_comment() {
        let (service, store) = service();

        let created = service
            .create("203.0.113.7", 54.62, 39.72, Some("   ".into()), T0)
            .await
            .unwrap();

        assert_eq!(created.comment, "-");
        assert_eq!(created.confirmations, 0);
        assert_eq!(created.status, MarkerStatus::Active);
        assert_eq!(created.timestamp, T0);

        let stored = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.address, "Рязань, Первомайский проспект");
    }

    #[tokio::test]
    async fn second_create_within_window_is_rate_limited() {
        let (service, _) = service();

        service
            .create("203.0.113.7", 54.62, 39.72, None, T0)
            .await
            .unwrap();
        let denied = service
            .create("203.0.113.7", 54.63, 39.73, None, T0 + 1000)
            .await;

        assert!(matches!(denied, Err(AppError::RateLimited)));
    }

    #[tokio::test]
    async fn denied_attempt_does_not_extend_the_window() {
        let (service, _) = service();

        service
            .create("203.0.113.7", 54.62, 39.72, None, T0)
            .await
            .unwrap();
        // 窗口尚未走完，拒绝且不刷新记录
        let denied = service
            .create("203.0.113.7", 54.63, 39.73, None, T0 + RATE_WINDOW_MS - 1)
            .await;
        assert!(matches!(denied, Err(AppError::RateLimited)));
        // 从第一次放行算起窗口一到即恢复
        service
            .create("203.0.113.7", 54.63, 39.73, None, T0 + RATE_WINDOW_MS)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn different_clients_do_not_contend() {
        let (service, _) = service();

        service
            .create("203.0.113.7", 54.62, 39.72, None, T0)
            .await
            .unwrap();
        service
            .create("203.0.113.8", 54.63, 39.73, None, T0 + 1)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn geocoder_failure_falls_back_to_placeholder() {
        let (service, _) = service_with(StubGeocoder::failing());

        let created = service
            .create("203.0.113.7", 54.62, 39.72, Some("пост ДПС".into()), T0)
            .await
            .unwrap();

        assert_eq!(created.address, "-");
        assert_eq!(created.comment, "пост ДПС");
    }

    #[tokio::test]
    async fn confirmations_accumulate_and_timestamp_follows_last() {
        let (service, _) = service();

        let created = service
            .create("203.0.113.7", 54.62, 39.72, None, T0)
            .await
            .unwrap();

        service.confirm(created.id, T0 + 1000).await.unwrap();
        service.confirm(created.id, T0 + 2000).await.unwrap();
        let last = service.confirm(created.id, T0 + 3000).await.unwrap();

        assert_eq!(last.confirmations, 3);
        assert_eq!(last.timestamp, T0 + 3000);
    }

    #[tokio::test]
    async fn confirm_never_rewinds_timestamp() {
        let (service, _) = service();

        let created = service
            .create("203.0.113.7", 54.62, 39.72, None, T0)
            .await
            .unwrap();
        let confirmed = service.confirm(created.id, T0 - 5000).await.unwrap();

        assert_eq!(confirmed.confirmations, 1);
        assert_eq!(confirmed.timestamp, T0);
    }

    #[tokio::test]
    async fn confirm_unknown_id_is_not_found() {
        let (service, _) = service();

        let result = service.confirm(42, T0).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn deleted_marker_cannot_be_confirmed() {
        let (service, _) = service();

        let created = service
            .create("203.0.113.7", 54.62, 39.72, None, T0)
            .await
            .unwrap();
        service.delete("203.0.113.7", created.id, T0 + 1).await.unwrap();

        let result = service.confirm(created.id, T0 + 2).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn delete_window_is_independent_of_create_window() {
        let (service, _) = service();

        // 同一客户端刚创建过，删除仍然放行：add 与 delete 各有各的窗口
        let m1 = service
            .create("203.0.113.7", 54.62, 39.72, None, T0)
            .await
            .unwrap();
        let m2 = service
            .create("203.0.113.8", 54.63, 39.73, None, T0)
            .await
            .unwrap();

        service.delete("203.0.113.7", m1.id, T0 + 1).await.unwrap();
        let denied = service.delete("203.0.113.7", m2.id, T0 + 2).await;
        assert!(matches!(denied, Err(AppError::RateLimited)));
    }

    #[tokio::test]
    async fn stale_marker_returns_to_active_after_confirm() {
        let (service, _) = service();

        let created = service
            .create("203.0.113.7", 54.62, 39.72, None, T0)
            .await
            .unwrap();

        let later = T0 + STALE_AFTER_MS + 1;
        let listed = service.list(later).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, MarkerStatus::Stale);

        service.confirm(created.id, later).await.unwrap();

        let listed = service.list(later).await.unwrap();
        assert_eq!(listed[0].status, MarkerStatus::Active);
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_ids() {
        let (service, store) = service();

        // 同一毫秒、不同客户端
        let a = service
            .create("203.0.113.7", 54.62, 39.72, None, T0)
            .await
            .unwrap();
        let b = service
            .create("203.0.113.8", 54.62, 39.72, None, T0)
            .await
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }
}
