//! 主应用程序入口
//!
//! 加载配置、装配存储和用例服务，启动 Axum Web API 服务。

use std::sync::Arc;

use application::{ConnectionRegistry, SystemClock};
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;

    tracing::info!(
        database = config.database.url.split('@').last().unwrap_or("unknown"),
        "连接数据库"
    );
    let infrastructure = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        run_migrations: config.storage.run_migrations,
    })
    .await?;

    let state = AppState::new(
        infrastructure.gateways(),
        Arc::new(ConnectionRegistry::new()),
        Arc::new(JwtService::new(config.jwt.clone())),
        Arc::new(SystemClock),
        config.realtime.connection_buffer,
    );

    // 启动 Web 服务器
    let app = router(state);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(address = %address, "BlueZone 服务启动");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
}
