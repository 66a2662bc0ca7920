use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::HeaderMap,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    AppState,
    error::AppError,
    utils::{ApiResponse, client_ip, success_to_api_response},
};

use super::model::MarkerView;

// 创建标记请求参数
#[derive(Debug, Deserialize)]
pub struct CreateMarkerRequest {
    lat: Option<f64>,
    lng: Option<f64>,
    comment: Option<String>,
}

// 按id操作标记的请求参数
#[derive(Debug, Deserialize)]
pub struct MarkerIdRequest {
    id: Option<i64>,
}

// 列出全部标记API，展示状态按当前时间实时计算
pub async fn list_markers(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<MarkerView>>>, AppError> {
    let now = Utc::now().timestamp_millis();
    let markers = state.service.list(now).await?;
    Ok(success_to_api_response(markers))
}

// 创建标记API，客户端身份由请求来源推导
pub async fn create_marker(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<CreateMarkerRequest>,
) -> Result<Json<ApiResponse<MarkerView>>, AppError> {
    let (Some(lat), Some(lng)) = (request.lat, request.lng) else {
        return Err(AppError::Validation("缺少lat或lng参数".into()));
    };

    let client = client_ip(&headers, peer);
    let now = Utc::now().timestamp_millis();

    let created = state
        .service
        .create(&client, lat, lng, request.comment, now)
        .await?;
    tracing::info!("客户端 {} 创建标记 {}", client, created.id);

    Ok(success_to_api_response(created))
}

// 确认标记API，不限流
pub async fn confirm_marker(
    State(state): State<AppState>,
    Json(request): Json<MarkerIdRequest>,
) -> Result<Json<ApiResponse<MarkerView>>, AppError> {
    let Some(id) = request.id else {
        return Err(AppError::Validation("缺少id参数".into()));
    };

    let now = Utc::now().timestamp_millis();
    let confirmed = state.service.confirm(id, now).await?;

    Ok(success_to_api_response(confirmed))
}

// 删除标记API，与创建同样限流
pub async fn delete_marker(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<MarkerIdRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let Some(id) = request.id else {
        return Err(AppError::Validation("缺少id参数".into()));
    };

    let client = client_ip(&headers, peer);
    let now = Utc::now().timestamp_millis();

    state.service.delete(&client, id, now).await?;
    tracing::info!("客户端 {} 删除标记 {}", client, id);

    Ok(success_to_api_response(()))
}
