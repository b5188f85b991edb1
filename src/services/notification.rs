//! In-app notifications
//!
//! Most notifications are created by the event listeners; `send` lets a
//! holder of `notifications.send` message a user directly.

use std::sync::Arc;

use crate::db::repositories::{NotificationRepository, UserRepository};
use crate::models::{ListParams, NewNotification, Notification, PagedResult};
use crate::services::error::{ServiceError, ServiceResult, Validator};
use crate::services::role::RoleService;

pub const SEND: &str = "notifications.send";

pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    users: Arc<dyn UserRepository>,
    rbac: Arc<RoleService>,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        users: Arc<dyn UserRepository>,
        rbac: Arc<RoleService>,
    ) -> Self {
        Self {
            notifications,
            users,
            rbac,
        }
    }

    pub async fn notify(&self, user_id: i64, input: NewNotification) -> ServiceResult<Notification> {
        let notification = self.notifications.create(user_id, &input).await?;
        tracing::debug!(user_id, kind = %notification.kind, "Notification created");
        Ok(notification)
    }

    pub async fn list(
        &self,
        user_id: i64,
        unread_only: bool,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Notification>> {
        let params = params.normalized();
        let (items, total) = self.notifications.list(user_id, unread_only, &params).await?;
        Ok(PagedResult::new(items, total, &params))
    }

    pub async fn unread_count(&self, user_id: i64) -> ServiceResult<i64> {
        Ok(self.notifications.unread_count(user_id).await?)
    }

    /// Another user's notification is reported as missing
    pub async fn mark_read(&self, user_id: i64, id: i64) -> ServiceResult<Notification> {
        let notification = self
            .notifications
            .get_for_user(user_id, id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Notification"))?;
        if notification.is_read() {
            return Ok(notification);
        }

        self.notifications.mark_read(user_id, id).await?;
        self.notifications
            .get_for_user(user_id, id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Notification"))
    }

    pub async fn mark_all_read(&self, user_id: i64) -> ServiceResult<u64> {
        Ok(self.notifications.mark_all_read(user_id).await?)
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> ServiceResult<()> {
        if !self.notifications.delete(user_id, id).await? {
            return Err(ServiceError::not_found("Notification"));
        }
        Ok(())
    }

    /// Direct message from staff to a user
    pub async fn send(
        &self,
        actor_id: i64,
        user_id: i64,
        input: NewNotification,
    ) -> ServiceResult<Notification> {
        self.rbac.authorize(actor_id, SEND).await?;

        let mut v = Validator::new();
        v.check(
            !input.title.trim().is_empty() && input.title.chars().count() <= 255,
            "title",
            "The title is required and may not exceed 255 characters",
        )
        .check(
            !input.message.trim().is_empty(),
            "message",
            "The message is required",
        )
        .check(
            !input.kind.trim().is_empty() && input.kind.len() <= 50,
            "kind",
            "The kind is required and may not exceed 50 characters",
        );
        v.finish()?;

        if self.users.get_by_id(user_id).await?.is_none() {
            return Err(ServiceError::not_found("User"));
        }

        let mut data = input.data.clone();
        if data.is_null() {
            data = serde_json::json!({});
        }
        if let Some(map) = data.as_object_mut() {
            map.insert("sender_id".to_string(), actor_id.into());
        }

        self.notify(user_id, input.with_data(data)).await
    }
}
