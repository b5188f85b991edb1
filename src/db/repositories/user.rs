//! User repository
//!
//! Users plus the `user_roles` pivot.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{bind_all, like_pattern, placeholders, with_pool, BindValue, DynDatabasePool, LastInsertId};
use crate::models::{ListParams, User, UserFilter};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Look up by username or email
    async fn find_by_login(&self, login: &str) -> Result<Option<User>>;

    /// Batch lookup for eager-loading; missing ids are skipped
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<User>>;

    /// Persist every mutable column of `user`
    async fn update(&self, user: &User) -> Result<User>;

    async fn delete(&self, id: i64) -> Result<bool>;

    /// Lowest user id, `None` on an empty table
    async fn first_id(&self) -> Result<Option<i64>>;

    async fn list(&self, filter: &UserFilter, params: &ListParams) -> Result<(Vec<User>, i64)>;

    /// Role names held by a user, in role id order
    async fn role_names(&self, user_id: i64) -> Result<Vec<String>>;

    /// Role names for several users at once
    async fn role_names_for(&self, user_ids: &[i64]) -> Result<HashMap<i64, Vec<String>>>;

    /// Replace the user's roles
    async fn sync_roles(&self, user_id: i64, role_ids: &[i64]) -> Result<()>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(value)
                .fetch_optional(pool)
                .await
                .with_context(|| format!("Failed to get user by {}", column))?
        });
        row.map(User::try_from).transpose()
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, display_name, bio, avatar, \
     status, last_login_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    display_name: Option<String>,
    bio: Option<String>,
    avatar: Option<String>,
    status: String,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            display_name: row.display_name,
            bio: row.bio,
            avatar: row.avatar,
            status: row
                .status
                .parse()
                .with_context(|| format!("Invalid status for user {}", row.id))?,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_users(rows: Vec<UserRow>) -> Result<Vec<User>> {
    rows.into_iter().map(User::try_from).collect()
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let id = with_pool!(self.pool, pool => {
            sqlx::query(
                r#"
                INSERT INTO users (username, email, password_hash, display_name, bio, avatar,
                                   status, last_login_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.display_name)
            .bind(&user.bio)
            .bind(&user.avatar)
            .bind(user.status.as_str())
            .bind(user.last_login_at)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to create user")?
            .last_id()
        });

        Ok(User {
            id,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get user by ID")?
        });
        row.map(User::try_from).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.find_one("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_one("email", email).await
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE username = ? OR email = ? ORDER BY id LIMIT 1",
            USER_COLUMNS
        );
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(login)
                .bind(login)
                .fetch_optional(pool)
                .await
                .context("Failed to find user by login")?
        });
        row.map(User::try_from).transpose()
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM users WHERE id IN ({})",
            USER_COLUMNS,
            placeholders(ids.len())
        );
        let binds: Vec<BindValue> = ids.iter().map(|id| BindValue::Int(*id)).collect();
        let rows = with_pool!(self.pool, pool => {
            bind_all!(sqlx::query_as::<_, UserRow>(&sql), binds)
                .fetch_all(pool)
                .await
                .context("Failed to load users")?
        });
        into_users(rows)
    }

    async fn update(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        with_pool!(self.pool, pool => {
            sqlx::query(
                r#"
                UPDATE users
                SET username = ?, email = ?, password_hash = ?, display_name = ?, bio = ?,
                    avatar = ?, status = ?, last_login_at = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.display_name)
            .bind(&user.bio)
            .bind(&user.avatar)
            .bind(user.status.as_str())
            .bind(user.last_login_at)
            .bind(now)
            .bind(user.id)
            .execute(pool)
            .await
            .context("Failed to update user")?;
        });

        self.get_by_id(user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {} not found after update", user.id))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete user")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn first_id(&self) -> Result<Option<i64>> {
        let id = with_pool!(self.pool, pool => {
            sqlx::query_scalar::<_, Option<i64>>("SELECT MIN(id) FROM users")
                .fetch_one(pool)
                .await
                .context("Failed to get first user id")?
        });
        Ok(id)
    }

    async fn list(&self, filter: &UserFilter, params: &ListParams) -> Result<(Vec<User>, i64)> {
        let mut where_sql = String::from(" WHERE 1 = 1");
        let mut binds = Vec::new();

        if let Some(status) = filter.status {
            where_sql.push_str(" AND u.status = ?");
            binds.push(BindValue::Text(status.as_str().to_string()));
        }
        if let Some(role) = filter.role.as_deref().filter(|r| !r.is_empty()) {
            where_sql.push_str(
                " AND EXISTS (SELECT 1 FROM user_roles ur JOIN roles r ON r.id = ur.role_id \
                 WHERE ur.user_id = u.id AND r.name = ?)",
            );
            binds.push(BindValue::Text(role.to_string()));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            where_sql.push_str(
                " AND (u.username LIKE ? ESCAPE '!' OR u.email LIKE ? ESCAPE '!' \
                 OR u.display_name LIKE ? ESCAPE '!')",
            );
            let pattern = like_pattern(search);
            for _ in 0..3 {
                binds.push(BindValue::Text(pattern.clone()));
            }
        }

        let count_sql = format!("SELECT COUNT(*) FROM users u{}", where_sql);
        let list_sql = format!(
            "SELECT {} FROM users u{} ORDER BY u.created_at DESC, u.id DESC LIMIT ? OFFSET ?",
            prefixed_columns("u"),
            where_sql
        );

        let (rows, total) = with_pool!(self.pool, pool => {
            let total: i64 = bind_all!(sqlx::query_scalar(&count_sql), binds)
                .fetch_one(pool)
                .await
                .context("Failed to count users")?;
            let rows: Vec<UserRow> = bind_all!(sqlx::query_as(&list_sql), binds)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(pool)
                .await
                .context("Failed to list users")?;
            (rows, total)
        });

        Ok((into_users(rows)?, total))
    }

    async fn role_names(&self, user_id: i64) -> Result<Vec<String>> {
        let names = with_pool!(self.pool, pool => {
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT r.name FROM user_roles ur
                JOIN roles r ON r.id = ur.role_id
                WHERE ur.user_id = ?
                ORDER BY r.id
                "#,
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
            .context("Failed to load user roles")?
        });
        Ok(names)
    }

    async fn role_names_for(&self, user_ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT ur.user_id, r.name FROM user_roles ur JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id IN ({}) ORDER BY r.id",
            placeholders(user_ids.len())
        );
        let binds: Vec<BindValue> = user_ids.iter().map(|id| BindValue::Int(*id)).collect();
        let pairs: Vec<(i64, String)> = with_pool!(self.pool, pool => {
            bind_all!(sqlx::query_as(&sql), binds)
                .fetch_all(pool)
                .await
                .context("Failed to load roles for users")?
        });

        let mut map: HashMap<i64, Vec<String>> = HashMap::new();
        for (user_id, name) in pairs {
            map.entry(user_id).or_default().push(name);
        }
        Ok(map)
    }

    async fn sync_roles(&self, user_id: i64, role_ids: &[i64]) -> Result<()> {
        with_pool!(self.pool, pool => {
            let mut tx = pool.begin().await.context("Failed to begin transaction")?;
            sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear user roles")?;
            for role_id in role_ids {
                sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
                    .bind(user_id)
                    .bind(*role_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to assign role")?;
            }
            tx.commit().await.context("Failed to commit role sync")?;
        });
        Ok(())
    }
}

fn prefixed_columns(alias: &str) -> String {
    USER_COLUMNS
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
