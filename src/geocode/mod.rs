// 逆地理编码模块
// 标记创建时尽力解析人类可读地址；失败只记日志并退回占位符，绝不阻断创建

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("解析超时")]
    Timeout,

    #[error("响应缺少 display_name 字段")]
    MissingField,
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, lat: f64, lng: f64) -> Result<String, GeocodeError>;
}

/// Nominatim 风格的 /reverse 接口实现。
/// 除 reqwest 自身的超时外再套一层 tokio 超时，上游挂起时请求不会无限等待。
pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl NominatimGeocoder {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.geocode_timeout())
            .user_agent("patrolmap-backend")
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: config.geocoder_url.trim_end_matches('/').to_string(),
            timeout: config.geocode_timeout(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, lat: f64, lng: f64) -> Result<String, GeocodeError> {
        let url = format!("{}/reverse", self.base_url);
        let lat_param = lat.to_string();
        let lon_param = lng.to_string();
        let request = async {
            let body: serde_json::Value = self
                .http
                .get(&url)
                .query(&[
                    ("format", "jsonv2"),
                    ("lat", lat_param.as_str()),
                    ("lon", lon_param.as_str()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            body.get("display_name")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or(GeocodeError::MissingField)
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| GeocodeError::Timeout)?
    }
}
