/// Strato Cloud - Server
///
/// 多租户控制平面主程序，提供虚拟机部署与生命周期 REST API

mod api;
mod app_state;
mod auth;
mod config;
mod db;
mod metrics;
mod middleware;
mod services;

use std::net::SocketAddr;

use axum::{extract::State, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use vsphere::VsphereClient;

use crate::app_state::AppState;
use crate::metrics::Metrics;

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .init();

    info!("🚀 启动 Strato Cloud Server...");

    // 加载环境变量
    dotenvy::dotenv().ok();

    // 初始化阶段：致命错误退出码 1，被信号打断退出码 2
    let state = tokio::select! {
        result = init_app() => match result {
            Ok(state) => state,
            Err(e) => {
                error!("❌ 初始化失败: {:#}", e);
                std::process::exit(1);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("初始化期间收到终止信号，中止启动");
            std::process::exit(2);
        }
    };

    if let Err(e) = serve(state).await {
        error!("❌ 服务器异常退出: {:#}", e);
        std::process::exit(1);
    }
}

/// 建立进程级状态：配置、目录、虚拟化平台会话、指标
async fn init_app() -> anyhow::Result<AppState> {
    let cfg = config::Config::from_env()?;
    info!("✅ 配置加载成功");

    let sea_db = db::establish_connection(&cfg.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("无法打开目录数据库: {}", e))?;
    db::schema::init_schema(&sea_db).await?;
    info!("✅ 目录数据库就绪");

    let vsphere = VsphereClient::connect(
        &cfg.api_source_ip,
        &cfg.api_source_username,
        &cfg.api_source_password,
    )
    .await
    .map_err(|e| anyhow::anyhow!("无法连接虚拟化平台: {}", e))?;
    info!("✅ 虚拟化平台连接成功");

    let metrics = Metrics::new()?;

    Ok(AppState::new(sea_db, vsphere, cfg, metrics))
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    // 设置CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 构建应用路由
    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api::api_routes(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    // 启动服务器
    let addr: SocketAddr = format!(
        "{}:{}",
        state.config().application_host,
        state.config().application_port
    )
    .parse()?;
    info!("🎯 服务器监听在 http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 退出前注销平台会话
    state.vsphere().logout().await;
    info!("服务器已优雅退出");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("收到终止信号，开始优雅退出");
}

async fn root_handler() -> &'static str {
    "Strato Cloud Server API v1"
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.gather()
}
