//! User service
//!
//! Registration, bearer-token sessions, profile maintenance and the admin
//! operations behind `users.manage`.
//!
//! The first account ever registered receives the `admin` role; every later
//! account starts as an `author`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::db::repositories::{RoleRepository, SessionRepository, UserRepository};
use crate::db::unique_violation;
use crate::events::{DomainEvent, EventBus};
use crate::models::{
    ChangePasswordInput, ListParams, LoginInput, PagedResult, RegisterInput, Session,
    UpdateProfileInput, User, UserFilter, UserStatus, UserWithRoles,
};
use crate::services::error::{ServiceError, ServiceResult, Validator};
use crate::services::password::{hash_password, verify_password};
use crate::services::role::RoleService;
use crate::services::validation::{
    is_valid_email, is_valid_username, normalize_email, MIN_PASSWORD_LEN,
};

const MANAGE_USERS: &str = "users.manage";
const FIRST_USER_ROLE: &str = "admin";
const DEFAULT_ROLE: &str = "author";

/// Issued on login
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserWithRoles,
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    roles: Arc<dyn RoleRepository>,
    rbac: Arc<RoleService>,
    events: Arc<EventBus>,
    session_ttl: Duration,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        roles: Arc<dyn RoleRepository>,
        rbac: Arc<RoleService>,
        events: Arc<EventBus>,
        session_ttl_days: i64,
    ) -> Self {
        Self {
            users,
            sessions,
            roles,
            rbac,
            events,
            session_ttl: Duration::days(session_ttl_days.max(1)),
        }
    }

    pub async fn register(&self, input: RegisterInput) -> ServiceResult<UserWithRoles> {
        let username = input.username.trim().to_string();
        let email = normalize_email(&input.email);

        let mut v = Validator::new();
        v.check(
            is_valid_username(&username),
            "username",
            "The username must be 3-50 characters of letters, digits, '_' or '-'",
        )
        .check(is_valid_email(&email), "email", "The email must be a valid email address")
        .check(
            input.password.chars().count() >= MIN_PASSWORD_LEN,
            "password",
            format!("The password must be at least {} characters", MIN_PASSWORD_LEN),
        );
        if is_valid_username(&username) && self.users.get_by_username(&username).await?.is_some() {
            v.add("username", "The username has already been taken");
        }
        if is_valid_email(&email) && self.users.get_by_email(&email).await?.is_some() {
            v.add("email", "The email has already been taken");
        }
        v.finish()?;

        let mut user = User::new(username, email, hash_password(&input.password)?);
        user.display_name = input.display_name.filter(|d| !d.trim().is_empty());
        let user = self.users.create(&user).await.map_err(already_taken)?;

        // The lowest id belongs to the first user, whatever the insert order
        let role_name = if self.users.first_id().await? == Some(user.id) {
            FIRST_USER_ROLE
        } else {
            DEFAULT_ROLE
        };
        let role = self
            .roles
            .get_role_by_name(role_name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Seed role '{}' is missing", role_name))?;
        self.users.sync_roles(user.id, &[role.id]).await?;

        tracing::info!(user_id = user.id, role = role_name, "User registered");
        self.events
            .publish(DomainEvent::UserRegistered {
                user_id: user.id,
                username: user.username.clone(),
            })
            .await;

        Ok(UserWithRoles {
            user,
            roles: vec![role.name],
            permissions: None,
        })
    }

    /// Authenticate by username or email and open a session
    pub async fn login(&self, input: LoginInput) -> ServiceResult<AuthSession> {
        let invalid = || ServiceError::unauthorized("Invalid credentials");

        let login = input.login.trim();
        if login.is_empty() || input.password.is_empty() {
            return Err(invalid());
        }

        let mut user = self.users.find_by_login(login).await?.ok_or_else(invalid)?;
        if !verify_password(&input.password, &user.password_hash)? {
            return Err(invalid());
        }
        if user.is_banned() {
            return Err(ServiceError::forbidden("This account has been banned"));
        }

        let session = self
            .sessions
            .create(&Session::new(user.id, self.session_ttl))
            .await?;

        user.last_login_at = Some(Utc::now());
        let user = self.users.update(&user).await?;

        tracing::debug!(user_id = user.id, "User logged in");
        Ok(AuthSession {
            token: session.id,
            expires_at: session.expires_at,
            user: self.with_roles(user, true).await?,
        })
    }

    pub async fn logout(&self, token: &str) -> ServiceResult<()> {
        self.sessions.delete(token).await?;
        Ok(())
    }

    /// Resolve a bearer token to its user.
    ///
    /// Unknown or expired tokens yield `None`; expired sessions are deleted
    /// on sight. A banned user's token is `Forbidden`.
    pub async fn validate_session(&self, token: &str) -> ServiceResult<Option<User>> {
        let Some(session) = self.sessions.get_by_id(token).await? else {
            return Ok(None);
        };
        if session.is_expired() {
            self.sessions.delete(&session.id).await?;
            return Ok(None);
        }

        let Some(user) = self.users.get_by_id(session.user_id).await? else {
            return Ok(None);
        };
        if user.is_banned() {
            return Err(ServiceError::forbidden("This account has been banned"));
        }
        Ok(Some(user))
    }

    /// The user with roles and effective permissions
    pub async fn profile(&self, user_id: i64) -> ServiceResult<UserWithRoles> {
        let user = self.find(user_id).await?;
        self.with_roles(user, true).await
    }

    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> ServiceResult<UserWithRoles> {
        let mut user = self.find(user_id).await?;
        let mut v = Validator::new();

        if let Some(email) = input.email {
            let email = normalize_email(&email);
            if !is_valid_email(&email) {
                v.add("email", "The email must be a valid email address");
            } else if email != user.email {
                if self.users.get_by_email(&email).await?.is_some() {
                    v.add("email", "The email has already been taken");
                }
                user.email = email;
            }
        }
        if let Some(display_name) = input.display_name {
            v.check(
                display_name.chars().count() <= 100,
                "display_name",
                "The display name may not exceed 100 characters",
            );
            user.display_name = non_blank(display_name);
        }
        if let Some(bio) = input.bio {
            v.check(
                bio.chars().count() <= 1000,
                "bio",
                "The bio may not exceed 1000 characters",
            );
            user.bio = non_blank(bio);
        }
        if let Some(avatar) = input.avatar {
            v.check(
                avatar.len() <= 500,
                "avatar",
                "The avatar URL may not exceed 500 characters",
            );
            user.avatar = non_blank(avatar);
        }
        v.finish()?;

        let user = self.users.update(&user).await?;
        self.with_roles(user, true).await
    }

    /// Change the password and revoke every session except `current_session`
    pub async fn change_password(
        &self,
        user_id: i64,
        current_session: &str,
        input: ChangePasswordInput,
    ) -> ServiceResult<()> {
        let mut user = self.find(user_id).await?;

        if !verify_password(&input.current_password, &user.password_hash)? {
            return Err(ServiceError::field(
                "current_password",
                "The current password is incorrect",
            ));
        }
        if input.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::field(
                "new_password",
                format!("The password must be at least {} characters", MIN_PASSWORD_LEN),
            ));
        }

        user.password_hash = hash_password(&input.new_password)?;
        self.users.update(&user).await?;

        let revoked = self
            .sessions
            .delete_by_user_except(user_id, current_session)
            .await?;
        tracing::info!(user_id, revoked, "Password changed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub async fn list(
        &self,
        actor_id: i64,
        filter: &UserFilter,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<UserWithRoles>> {
        self.rbac.authorize(actor_id, MANAGE_USERS).await?;

        let (users, total) = self.users.list(filter, params).await?;
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        let mut roles = self.users.role_names_for(&ids).await?;

        let items = users
            .into_iter()
            .map(|user| UserWithRoles {
                roles: roles.remove(&user.id).unwrap_or_default(),
                user,
                permissions: None,
            })
            .collect();
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get(&self, actor_id: i64, id: i64) -> ServiceResult<UserWithRoles> {
        self.rbac.authorize(actor_id, MANAGE_USERS).await?;
        let user = self.find(id).await?;
        self.with_roles(user, true).await
    }

    pub async fn ban(&self, actor_id: i64, id: i64) -> ServiceResult<User> {
        self.rbac.authorize(actor_id, MANAGE_USERS).await?;
        if actor_id == id {
            return Err(ServiceError::forbidden("You cannot ban yourself"));
        }

        let mut user = self.find(id).await?;
        user.status = UserStatus::Banned;
        let user = self.users.update(&user).await?;
        let revoked = self.sessions.delete_by_user(id).await?;

        tracing::info!(user_id = id, actor_id, revoked, "User banned");
        self.events
            .publish(DomainEvent::UserBanned {
                user_id: id,
                actor_id,
            })
            .await;
        Ok(user)
    }

    pub async fn unban(&self, actor_id: i64, id: i64) -> ServiceResult<User> {
        self.rbac.authorize(actor_id, MANAGE_USERS).await?;

        let mut user = self.find(id).await?;
        user.status = UserStatus::Active;
        let user = self.users.update(&user).await?;

        self.events
            .publish(DomainEvent::UserUnbanned {
                user_id: id,
                actor_id,
            })
            .await;
        Ok(user)
    }

    pub async fn delete(&self, actor_id: i64, id: i64) -> ServiceResult<()> {
        self.rbac.authorize(actor_id, MANAGE_USERS).await?;
        if actor_id == id {
            return Err(ServiceError::forbidden("You cannot delete your own account"));
        }

        self.find(id).await?;
        self.users.delete(id).await?;

        tracing::info!(user_id = id, actor_id, "User deleted");
        self.events
            .publish(DomainEvent::UserDeleted {
                user_id: id,
                actor_id,
            })
            .await;
        Ok(())
    }

    /// Replace a user's roles by name
    pub async fn sync_roles(
        &self,
        actor_id: i64,
        id: i64,
        role_names: &[String],
    ) -> ServiceResult<UserWithRoles> {
        self.rbac.authorize(actor_id, MANAGE_USERS).await?;
        if actor_id == id {
            return Err(ServiceError::forbidden("You cannot change your own roles"));
        }
        let user = self.find(id).await?;

        let mut names: Vec<String> = role_names.iter().map(|n| n.trim().to_string()).collect();
        names.sort();
        names.dedup();
        if names.is_empty() {
            return Err(ServiceError::field("roles", "At least one role is required"));
        }

        let roles = self.roles.roles_by_names(&names).await?;
        if roles.len() != names.len() {
            let unknown: Vec<&str> = names
                .iter()
                .filter(|n| !roles.iter().any(|r| &r.name == *n))
                .map(String::as_str)
                .collect();
            return Err(ServiceError::field(
                "roles",
                format!("Unknown roles: {}", unknown.join(", ")),
            ));
        }

        let role_ids: Vec<i64> = roles.iter().map(|r| r.id).collect();
        self.users.sync_roles(id, &role_ids).await?;
        self.rbac.bump_version().await;

        self.events
            .publish(DomainEvent::UserRolesChanged {
                user_id: id,
                actor_id,
                roles: names,
            })
            .await;
        self.with_roles(user, true).await
    }

    pub async fn cleanup_expired_sessions(&self) -> ServiceResult<u64> {
        let removed = self.sessions.delete_expired().await?;
        if removed > 0 {
            tracing::info!(removed, "Expired sessions removed");
        }
        Ok(removed)
    }

    async fn find(&self, id: i64) -> ServiceResult<User> {
        self.users
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))
    }

    async fn with_roles(&self, user: User, permissions: bool) -> ServiceResult<UserWithRoles> {
        let roles = self.users.role_names(user.id).await?;
        let permissions = if permissions {
            Some(self.rbac.permissions_for(user.id).await?.into_iter().collect())
        } else {
            None
        };
        Ok(UserWithRoles {
            user,
            roles,
            permissions,
        })
    }
}

/// Unique-constraint failure on insert, reported like the up-front checks
fn already_taken(err: anyhow::Error) -> ServiceError {
    match unique_violation(&err) {
        Some(message) if message.trim_end_matches('\'').ends_with("email") => {
            ServiceError::field("email", "The email has already been taken")
        }
        Some(_) => ServiceError::field("username", "The username has already been taken"),
        None => err.into(),
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
