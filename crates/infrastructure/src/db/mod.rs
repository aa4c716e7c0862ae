//! 数据库连接与仓储实现。

pub mod user_repository_impl;

pub use user_repository_impl::PgUserRepository;

pub type DbPool = sqlx::PgPool;

/// 创建 PostgreSQL 连接池。
pub async fn create_pg_pool(url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}
