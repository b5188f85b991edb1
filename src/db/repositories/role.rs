//! Role and permission repository
//!
//! Roles, the permission catalogue, and the `role_permissions` pivot.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{bind_all, placeholders, with_pool, BindValue, DynDatabasePool, LastInsertId};
use crate::models::{Permission, Role};

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn list_roles(&self) -> Result<Vec<Role>>;

    async fn get_role(&self, id: i64) -> Result<Option<Role>>;

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    /// Roles whose name is in `names`
    async fn roles_by_names(&self, names: &[String]) -> Result<Vec<Role>>;

    async fn create_role(&self, role: &Role) -> Result<Role>;

    async fn update_role(&self, role: &Role) -> Result<Role>;

    async fn delete_role(&self, id: i64) -> Result<bool>;

    async fn list_permissions(&self) -> Result<Vec<Permission>>;

    async fn permissions_by_names(&self, names: &[String]) -> Result<Vec<Permission>>;

    async fn create_permission(&self, name: &str, description: Option<&str>) -> Result<Permission>;

    /// Permission names per role id, for every role
    async fn permission_names_by_role(&self) -> Result<HashMap<i64, Vec<String>>>;

    async fn permission_names_for_role(&self, role_id: i64) -> Result<Vec<String>>;

    /// Replace the permissions granted to a role
    async fn sync_permissions(&self, role_id: i64, permission_ids: &[i64]) -> Result<()>;

    /// Union of permissions across all roles the user holds
    async fn permission_names_for_user(&self, user_id: i64) -> Result<Vec<String>>;
}

pub struct SqlxRoleRepository {
    pool: DynDatabasePool,
}

impl SqlxRoleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RoleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    display_name: String,
    description: Option<String>,
    is_system: bool,
    created_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: row.id,
            name: row.name,
            display_name: row.display_name,
            description: row.description,
            is_system: row.is_system,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PermissionRow {
    id: i64,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Permission {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

const ROLE_COLUMNS: &str = "id, name, display_name, description, is_system, created_at";

#[async_trait]
impl RoleRepository for SqlxRoleRepository {
    async fn list_roles(&self) -> Result<Vec<Role>> {
        let sql = format!("SELECT {} FROM roles ORDER BY id", ROLE_COLUMNS);
        let rows = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, RoleRow>(&sql)
                .fetch_all(pool)
                .await
                .context("Failed to list roles")?
        });
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn get_role(&self, id: i64) -> Result<Option<Role>> {
        let sql = format!("SELECT {} FROM roles WHERE id = ?", ROLE_COLUMNS);
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, RoleRow>(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("Failed to get role")?
        });
        Ok(row.map(Role::from))
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let sql = format!("SELECT {} FROM roles WHERE name = ?", ROLE_COLUMNS);
        let row = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, RoleRow>(&sql)
                .bind(name)
                .fetch_optional(pool)
                .await
                .context("Failed to get role by name")?
        });
        Ok(row.map(Role::from))
    }

    async fn roles_by_names(&self, names: &[String]) -> Result<Vec<Role>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM roles WHERE name IN ({}) ORDER BY id",
            ROLE_COLUMNS,
            placeholders(names.len())
        );
        let binds: Vec<BindValue> = names.iter().map(|n| BindValue::Text(n.clone())).collect();
        let rows = with_pool!(self.pool, pool => {
            bind_all!(sqlx::query_as::<_, RoleRow>(&sql), binds)
                .fetch_all(pool)
                .await
                .context("Failed to load roles by name")?
        });
        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn create_role(&self, role: &Role) -> Result<Role> {
        let now = Utc::now();
        let id = with_pool!(self.pool, pool => {
            sqlx::query(
                "INSERT INTO roles (name, display_name, description, is_system, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&role.name)
            .bind(&role.display_name)
            .bind(&role.description)
            .bind(role.is_system)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to create role")?
            .last_id()
        });
        Ok(Role {
            id,
            created_at: now,
            ..role.clone()
        })
    }

    async fn update_role(&self, role: &Role) -> Result<Role> {
        with_pool!(self.pool, pool => {
            sqlx::query("UPDATE roles SET display_name = ?, description = ? WHERE id = ?")
                .bind(&role.display_name)
                .bind(&role.description)
                .bind(role.id)
                .execute(pool)
                .await
                .context("Failed to update role")?;
        });
        self.get_role(role.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Role {} not found after update", role.id))
    }

    async fn delete_role(&self, id: i64) -> Result<bool> {
        let affected = with_pool!(self.pool, pool => {
            sqlx::query("DELETE FROM roles WHERE id = ?")
                .bind(id)
                .execute(pool)
                .await
                .context("Failed to delete role")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>> {
        let rows = with_pool!(self.pool, pool => {
            sqlx::query_as::<_, PermissionRow>(
                "SELECT id, name, description, created_at FROM permissions ORDER BY name",
            )
            .fetch_all(pool)
            .await
            .context("Failed to list permissions")?
        });
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn permissions_by_names(&self, names: &[String]) -> Result<Vec<Permission>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, name, description, created_at FROM permissions WHERE name IN ({})",
            placeholders(names.len())
        );
        let binds: Vec<BindValue> = names.iter().map(|n| BindValue::Text(n.clone())).collect();
        let rows = with_pool!(self.pool, pool => {
            bind_all!(sqlx::query_as::<_, PermissionRow>(&sql), binds)
                .fetch_all(pool)
                .await
                .context("Failed to load permissions by name")?
        });
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn create_permission(&self, name: &str, description: Option<&str>) -> Result<Permission> {
        let now = Utc::now();
        let id = with_pool!(self.pool, pool => {
            sqlx::query("INSERT INTO permissions (name, description, created_at) VALUES (?, ?, ?)")
                .bind(name)
                .bind(description)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to create permission")?
                .last_id()
        });
        Ok(Permission {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
        })
    }

    async fn permission_names_by_role(&self) -> Result<HashMap<i64, Vec<String>>> {
        let pairs: Vec<(i64, String)> = with_pool!(self.pool, pool => {
            sqlx::query_as(
                r#"
                SELECT rp.role_id, p.name FROM role_permissions rp
                JOIN permissions p ON p.id = rp.permission_id
                ORDER BY p.name
                "#,
            )
            .fetch_all(pool)
            .await
            .context("Failed to load role permissions")?
        });

        let mut map: HashMap<i64, Vec<String>> = HashMap::new();
        for (role_id, name) in pairs {
            map.entry(role_id).or_default().push(name);
        }
        Ok(map)
    }

    async fn permission_names_for_role(&self, role_id: i64) -> Result<Vec<String>> {
        let names = with_pool!(self.pool, pool => {
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT p.name FROM role_permissions rp
                JOIN permissions p ON p.id = rp.permission_id
                WHERE rp.role_id = ?
                ORDER BY p.name
                "#,
            )
            .bind(role_id)
            .fetch_all(pool)
            .await
            .context("Failed to load permissions for role")?
        });
        Ok(names)
    }

    async fn sync_permissions(&self, role_id: i64, permission_ids: &[i64]) -> Result<()> {
        with_pool!(self.pool, pool => {
            let mut tx = pool.begin().await.context("Failed to begin transaction")?;
            sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
                .bind(role_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear role permissions")?;
            for permission_id in permission_ids {
                sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
                    .bind(role_id)
                    .bind(*permission_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to grant permission")?;
            }
            tx.commit().await.context("Failed to commit permission sync")?;
        });
        Ok(())
    }

    async fn permission_names_for_user(&self, user_id: i64) -> Result<Vec<String>> {
        let names = with_pool!(self.pool, pool => {
            sqlx::query_scalar::<_, String>(
                r#"
                SELECT DISTINCT p.name FROM user_roles ur
                JOIN role_permissions rp ON rp.role_id = ur.role_id
                JOIN permissions p ON p.id = rp.permission_id
                WHERE ur.user_id = ?
                ORDER BY p.name
                "#,
            )
            .bind(user_id)
            .fetch_all(pool)
            .await
            .context("Failed to load user permissions")?
        });
        Ok(names)
    }
}
