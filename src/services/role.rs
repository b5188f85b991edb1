//! Roles, permissions and authorization
//!
//! A user's effective permissions are cached under a key that embeds a global
//! version counter:
//!
//! ```text
//! rbac:v{version}:user:{user_id}:permissions
//! ```
//!
//! Every role or permission mutation increments `rbac:version`. Lookups made
//! afterwards compose a new key and miss; entries under the old version are
//! never read again and expire on their own TTL.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::cache::CacheService;
use crate::db::repositories::{RoleRepository, UserRepository};
use crate::events::{DomainEvent, EventBus};
use crate::models::{
    CreatePermissionInput, CreateRoleInput, Permission, Role, RoleWithPermissions, UpdateRoleInput,
};
use crate::services::error::{ServiceError, ServiceResult, Validator};
use crate::services::validation::{is_valid_permission_name, is_valid_role_name};

/// Cache key of the global permission version counter
pub const VERSION_KEY: &str = "rbac:version";

const MANAGE_ROLES: &str = "roles.manage";

pub fn permissions_cache_key(version: i64, user_id: i64) -> String {
    format!("rbac:v{}:user:{}:permissions", version, user_id)
}

pub struct RoleService {
    roles: Arc<dyn RoleRepository>,
    users: Arc<dyn UserRepository>,
    cache: CacheService,
    events: Arc<EventBus>,
}

impl RoleService {
    pub fn new(
        roles: Arc<dyn RoleRepository>,
        users: Arc<dyn UserRepository>,
        cache: CacheService,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            roles,
            users,
            cache,
            events,
        }
    }

    // ------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------

    /// Current value of the permission version counter
    pub async fn version(&self) -> i64 {
        self.cache.counter(VERSION_KEY).await
    }

    /// Invalidate every cached permission set
    pub async fn bump_version(&self) {
        match self.cache.increment(VERSION_KEY).await {
            Some(version) => tracing::debug!(version, "Permission version bumped"),
            None => tracing::error!("Permission version could not be bumped; cached permissions may be stale until they expire"),
        }
    }

    pub async fn permissions_for(&self, user_id: i64) -> ServiceResult<BTreeSet<String>> {
        let key = permissions_cache_key(self.version().await, user_id);
        let roles = self.roles.clone();

        self.cache
            .remember(&key, || async move {
                let names = roles.permission_names_for_user(user_id).await?;
                Ok::<_, ServiceError>(names.into_iter().collect())
            })
            .await
    }

    pub async fn has_permission(&self, user_id: i64, permission: &str) -> ServiceResult<bool> {
        Ok(self.permissions_for(user_id).await?.contains(permission))
    }

    /// `Forbidden` unless the user holds `permission`
    pub async fn authorize(&self, user_id: i64, permission: &str) -> ServiceResult<()> {
        if self.has_permission(user_id, permission).await? {
            Ok(())
        } else {
            Err(ServiceError::forbidden(format!(
                "This action requires the '{}' permission",
                permission
            )))
        }
    }

    pub async fn roles_for(&self, user_id: i64) -> ServiceResult<Vec<String>> {
        Ok(self.users.role_names(user_id).await?)
    }

    // ------------------------------------------------------------------
    // Role management
    // ------------------------------------------------------------------

    pub async fn list_roles(&self, actor_id: i64) -> ServiceResult<Vec<RoleWithPermissions>> {
        self.authorize(actor_id, MANAGE_ROLES).await?;

        let roles = self.roles.list_roles().await?;
        let mut by_role = self.roles.permission_names_by_role().await?;

        Ok(roles
            .into_iter()
            .map(|role| RoleWithPermissions {
                permissions: by_role.remove(&role.id).unwrap_or_default(),
                role,
            })
            .collect())
    }

    pub async fn get_role(&self, actor_id: i64, id: i64) -> ServiceResult<RoleWithPermissions> {
        self.authorize(actor_id, MANAGE_ROLES).await?;
        let role = self.find_role(id).await?;
        self.with_permissions(role).await
    }

    pub async fn create_role(
        &self,
        actor_id: i64,
        input: CreateRoleInput,
    ) -> ServiceResult<RoleWithPermissions> {
        self.authorize(actor_id, MANAGE_ROLES).await?;

        let name = input.name.trim().to_lowercase();
        let display_name = input.display_name.trim().to_string();

        let mut v = Validator::new();
        v.check(
            is_valid_role_name(&name),
            "name",
            "The name must be 2-50 lowercase letters, digits or underscores",
        )
        .check(
            !display_name.is_empty() && display_name.chars().count() <= 100,
            "display_name",
            "The display name is required and may not exceed 100 characters",
        );
        if v.is_empty() && self.roles.get_role_by_name(&name).await?.is_some() {
            v.add("name", "The role name has already been taken");
        }
        v.finish()?;

        let permission_ids = self.resolve_permissions(&input.permissions).await?;

        let role = Role {
            id: 0,
            name,
            display_name,
            description: input.description.filter(|d| !d.trim().is_empty()),
            is_system: false,
            created_at: chrono::Utc::now(),
        };
        let role = self.roles.create_role(&role).await?;
        if !permission_ids.is_empty() {
            self.roles.sync_permissions(role.id, &permission_ids).await?;
        }

        self.changed(Some(role.id), "created").await;
        self.with_permissions(role).await
    }

    pub async fn update_role(
        &self,
        actor_id: i64,
        id: i64,
        input: UpdateRoleInput,
    ) -> ServiceResult<RoleWithPermissions> {
        self.authorize(actor_id, MANAGE_ROLES).await?;
        let mut role = self.find_role(id).await?;

        if let Some(display_name) = input.display_name {
            let display_name = display_name.trim().to_string();
            if display_name.is_empty() || display_name.chars().count() > 100 {
                return Err(ServiceError::field(
                    "display_name",
                    "The display name is required and may not exceed 100 characters",
                ));
            }
            role.display_name = display_name;
        }
        if let Some(description) = input.description {
            role.description = Some(description).filter(|d| !d.trim().is_empty());
        }

        let role = self.roles.update_role(&role).await?;
        self.changed(Some(role.id), "updated").await;
        self.with_permissions(role).await
    }

    pub async fn delete_role(&self, actor_id: i64, id: i64) -> ServiceResult<()> {
        self.authorize(actor_id, MANAGE_ROLES).await?;
        let role = self.find_role(id).await?;

        if role.is_system {
            return Err(ServiceError::forbidden("System roles cannot be deleted"));
        }

        self.roles.delete_role(role.id).await?;
        self.changed(Some(role.id), "deleted").await;
        Ok(())
    }

    /// Replace the permissions of a role by name
    pub async fn sync_permissions(
        &self,
        actor_id: i64,
        role_id: i64,
        names: &[String],
    ) -> ServiceResult<RoleWithPermissions> {
        self.authorize(actor_id, MANAGE_ROLES).await?;
        let role = self.find_role(role_id).await?;

        let permission_ids = self.resolve_permissions(names).await?;
        self.roles.sync_permissions(role.id, &permission_ids).await?;

        self.changed(Some(role.id), "permissions_synced").await;
        self.with_permissions(role).await
    }

    pub async fn list_permissions(&self, actor_id: i64) -> ServiceResult<Vec<Permission>> {
        self.authorize(actor_id, MANAGE_ROLES).await?;
        Ok(self.roles.list_permissions().await?)
    }

    pub async fn create_permission(
        &self,
        actor_id: i64,
        input: CreatePermissionInput,
    ) -> ServiceResult<Permission> {
        self.authorize(actor_id, MANAGE_ROLES).await?;

        let name = input.name.trim().to_string();
        if !is_valid_permission_name(&name) {
            return Err(ServiceError::field(
                "name",
                "The name must be dotted lowercase words, e.g. articles.publish",
            ));
        }
        if !self
            .roles
            .permissions_by_names(std::slice::from_ref(&name))
            .await?
            .is_empty()
        {
            return Err(ServiceError::field(
                "name",
                "The permission name has already been taken",
            ));
        }

        let description = input.description.as_deref().map(str::trim).filter(|d| !d.is_empty());
        let permission = self.roles.create_permission(&name, description).await?;

        self.changed(None, "permission_created").await;
        Ok(permission)
    }

    async fn find_role(&self, id: i64) -> ServiceResult<Role> {
        self.roles
            .get_role(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Role"))
    }

    async fn with_permissions(&self, role: Role) -> ServiceResult<RoleWithPermissions> {
        let permissions = self.roles.permission_names_for_role(role.id).await?;
        Ok(RoleWithPermissions { role, permissions })
    }

    /// Map names to ids; any unknown name fails the whole call
    async fn resolve_permissions(&self, names: &[String]) -> ServiceResult<Vec<i64>> {
        let mut seen = HashSet::new();
        let names: Vec<String> = names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| seen.insert(n.clone()))
            .collect();
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let found = self.roles.permissions_by_names(&names).await?;
        let known: HashSet<&str> = found.iter().map(|p| p.name.as_str()).collect();
        let unknown: Vec<&str> = names
            .iter()
            .map(String::as_str)
            .filter(|n| !known.contains(n))
            .collect();

        if !unknown.is_empty() {
            return Err(ServiceError::field(
                "permissions",
                format!("Unknown permissions: {}", unknown.join(", ")),
            ));
        }
        Ok(found.into_iter().map(|p| p.id).collect())
    }

    async fn changed(&self, role_id: Option<i64>, action: &str) {
        self.bump_version().await;
        self.events
            .publish(DomainEvent::RoleChanged {
                role_id,
                action: action.to_string(),
            })
            .await;
    }
}
