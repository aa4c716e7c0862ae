//! 主应用程序入口
//!
//! 组装依赖并启动 Axum Web API 服务。

use std::sync::Arc;

use application::{
    ConnectionRegistry, NotificationService, NotificationServiceDependencies, PresenceService,
    PresenceServiceDependencies,
};
use config::AppConfig;
use infrastructure::{create_pg_pool, HttpPushSender, LocalPresenceBroadcaster, PgUserRepository};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::from_env();

    tracing::info!(
        "连接数据库: {}",
        config.database.url.split('@').last().unwrap_or("unknown")
    );

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections).await?;

    // 运行迁移
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    let user_repository = Arc::new(PgUserRepository::new(pg_pool));
    let registry = Arc::new(ConnectionRegistry::new());
    let broadcaster = LocalPresenceBroadcaster::new(config.broadcast.capacity);
    let push_sender = HttpPushSender::new(&config.push)
        .map_err(|err| anyhow::anyhow!("failed to build push client: {err}"))?;

    let presence_service = Arc::new(PresenceService::new(PresenceServiceDependencies {
        user_repository: user_repository.clone(),
        registry: registry.clone(),
        broadcaster: Arc::new(broadcaster.clone()),
    }));

    let notification_service = Arc::new(NotificationService::new(
        NotificationServiceDependencies {
            user_repository,
            push_sender: Arc::new(push_sender),
        },
        config.push.purge_after_failures,
    ));

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));

    let state = AppState::new(
        presence_service,
        notification_service,
        registry,
        broadcaster,
        jwt_service,
    );

    let app = router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("在线状态服务启动在 http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
