//! 用户Repository实现

use application::UserRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    PushSubscription, RepositoryError, Role, StatusPreference, User, UserId,
};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use super::DbPool;

/// 数据库用户模型
#[derive(Debug, Clone, FromRow)]
struct DbUser {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub active: bool,
    pub status_preference: String,
    pub online: bool,
    pub push_subscriptions: Json<Vec<PushSubscription>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = RepositoryError;

    fn try_from(db_user: DbUser) -> Result<Self, Self::Error> {
        let role = Role::parse(db_user.role)
            .map_err(|err| RepositoryError::storage(format!("invalid role in database: {err}")))?;
        // 历史数据里未知的偏好值按默认处理
        let status_preference =
            StatusPreference::parse(&db_user.status_preference).unwrap_or_default();

        Ok(User {
            id: UserId::from(db_user.id),
            full_name: db_user.full_name,
            email: db_user.email,
            role,
            active: db_user.active,
            status_preference,
            online: db_user.online,
            push_subscriptions: db_user.push_subscriptions.0,
            created_at: db_user.created_at,
            updated_at: db_user.updated_at,
        })
    }
}

const SELECT_USER: &str = "SELECT id, full_name, email, role, active, status_preference, online, \
                           push_subscriptions, created_at, updated_at FROM users";

/// 用户Repository实现
pub struct PgUserRepository {
    pool: DbPool,
}

impl PgUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn map_db_error(err: sqlx::Error) -> RepositoryError {
        tracing::error!(error = %err, "database operation failed");
        RepositoryError::storage_with_source("database operation failed", err)
    }

    fn collect(rows: Vec<DbUser>) -> Result<Vec<User>, RepositoryError> {
        rows.into_iter().map(User::try_from).collect()
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, DbUser>(&format!("{SELECT_USER} WHERE id = $1"))
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::map_db_error)?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_roles(
        &self,
        roles: &[Role],
        online_only: bool,
    ) -> Result<Vec<User>, RepositoryError> {
        let role_names: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();
        let mut sql = format!("{SELECT_USER} WHERE role = ANY($1) AND active");
        if online_only {
            sql.push_str(" AND online");
        }

        let rows = sqlx::query_as::<_, DbUser>(&sql)
            .bind(role_names)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_db_error)?;

        Self::collect(rows)
    }

    async fn find_by_ids(
        &self,
        ids: &[UserId],
        online_only: bool,
    ) -> Result<Vec<User>, RepositoryError> {
        let raw_ids: Vec<Uuid> = ids.iter().map(|id| Uuid::from(*id)).collect();
        let mut sql = format!("{SELECT_USER} WHERE id = ANY($1) AND active");
        if online_only {
            sql.push_str(" AND online");
        }

        let rows = sqlx::query_as::<_, DbUser>(&sql)
            .bind(raw_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_db_error)?;

        Self::collect(rows)
    }

    async fn update_online(&self, id: UserId, online: bool) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE users SET online = $2, updated_at = NOW() WHERE id = $1")
                .bind(Uuid::from(id))
                .bind(online)
                .execute(&self.pool)
                .await
                .map_err(Self::map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_status_preference(
        &self,
        id: UserId,
        preference: StatusPreference,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET status_preference = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .bind(preference.as_str())
        .execute(&self.pool)
        .await
        .map_err(Self::map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn update_subscriptions(
        &self,
        id: UserId,
        subscriptions: Vec<PushSubscription>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET push_subscriptions = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .bind(Json(subscriptions))
        .execute(&self.pool)
        .await
        .map_err(Self::map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
