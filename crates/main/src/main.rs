//! 主应用程序入口
//!
//! 加载配置、初始化存储，启动 Axum Web API 服务。

use std::sync::Arc;

use application::memory::{InMemoryAccountDirectory, InMemoryMessageStore};
use application::{AccountDirectory, AccountService, AccountServiceDependencies, MessageStore};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, BcryptPasswordHasher, JwtTokenCodec, PgAccountDirectory, PgMessageStore,
    MIGRATOR,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，未设置 RUST_LOG 时默认 info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "configuration loaded");

    let (account_directory, message_store) = storage(&config).await?;

    let account_service = AccountService::new(AccountServiceDependencies {
        account_directory,
        message_store,
        password_hasher: Arc::new(BcryptPasswordHasher::new(config.auth.bcrypt_cost)),
        token_codec: Arc::new(JwtTokenCodec::new(&config.auth.token_secret)),
        history_limit: config.hub.history_limit,
    });

    let state = AppState::new(Arc::new(account_service), config.hub.outbound_buffer);
    let app = router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("聊天服务启动在 http://{address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("聊天服务已停止");
    Ok(())
}

async fn storage(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn AccountDirectory>, Arc<dyn MessageStore>)> {
    match &config.database.url {
        Some(url) => {
            let pool = create_pg_pool(url, config.database.max_connections).await?;
            MIGRATOR.run(&pool).await?;
            tracing::info!("PostgreSQL 存储已就绪");
            Ok((
                Arc::new(PgAccountDirectory::new(pool.clone())),
                Arc::new(PgMessageStore::new(pool)),
            ))
        }
        None => {
            tracing::warn!("未配置 database.url，使用内存存储，重启后数据丢失");
            Ok((
                Arc::new(InMemoryAccountDirectory::new()),
                Arc::new(InMemoryMessageStore::new()),
            ))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
