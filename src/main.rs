use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use patrolmap_backend::{
    AppState,
    cache::RedisRateLimiter,
    config::Config,
    database::PgMarkerStore,
    geocode::NominatimGeocoder,
    middleware::log_errors,
    routes,
    routes::marker::MarkerService,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'patrolmap_backend';")
                    .await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");

    // 组装标记服务：Postgres 存标记，Redis 存限流记录，Nominatim 解析地址
    let service = Arc::new(MarkerService::new(
        Arc::new(PgMarkerStore::new(pool)),
        Arc::new(RedisRateLimiter::new(Arc::new(redis_client))),
        Arc::new(NominatimGeocoder::new(&config)),
    ));

    let state = AppState {
        service,
        config: config.clone(),
    };

    // 标记路由，全部匿名访问
    let marker_routes = Router::new()
        .route("/markers/list", get(routes::marker::list_markers))
        .route("/markers/create", post(routes::marker::create_marker))
        .route("/markers/confirm", post(routes::marker::confirm_marker))
        .route("/markers/delete", post(routes::marker::delete_marker));

    // 创建基础路由并添加日志中间件
    let router = Router::new()
        .nest(&config.api_base_uri.clone(), marker_routes)
        .layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        use tower_http::cors::CorsLayer;
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
