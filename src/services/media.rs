//! Media library
//!
//! Uploads are stored flat under `upload.path` as `{uuid}.{ext}` and served
//! from `upload.public_prefix`. The SHA-256 of the content is recorded with
//! each upload.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::config::UploadConfig;
use crate::db::repositories::MediaRepository;
use crate::events::{DomainEvent, EventBus};
use crate::models::{ListParams, Media, MediaFilter, PagedResult, UploadInput};
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::role::RoleService;

pub const MANAGE_ANY: &str = "media.manage.any";
const MAX_ALT_LEN: usize = 255;

pub struct MediaService {
    media: Arc<dyn MediaRepository>,
    rbac: Arc<RoleService>,
    events: Arc<EventBus>,
    config: UploadConfig,
}

impl MediaService {
    pub fn new(
        media: Arc<dyn MediaRepository>,
        rbac: Arc<RoleService>,
        events: Arc<EventBus>,
        config: UploadConfig,
    ) -> Self {
        Self {
            media,
            rbac,
            events,
            config,
        }
    }

    pub async fn upload(&self, actor_id: i64, input: UploadInput) -> ServiceResult<Media> {
        let mime_type = input.mime_type.trim().to_lowercase();
        if input.bytes.is_empty() {
            return Err(ServiceError::field("file", "The file is empty"));
        }
        if !self.config.is_type_allowed(&mime_type) {
            return Err(ServiceError::field(
                "file",
                format!("File type '{}' is not allowed", mime_type),
            ));
        }
        if input.bytes.len() as u64 > self.config.max_file_size {
            return Err(ServiceError::field(
                "file",
                format!(
                    "The file may not be larger than {} bytes",
                    self.config.max_file_size
                ),
            ));
        }
        let alt_text = validate_alt(input.alt_text)?;

        let checksum = format!("{:x}", Sha256::digest(&input.bytes));
        let file_name = format!(
            "{}.{}",
            uuid::Uuid::new_v4(),
            self.config.get_extension(&mime_type)
        );

        tokio::fs::create_dir_all(&self.config.path)
            .await
            .with_context(|| format!("Failed to create upload directory {:?}", self.config.path))?;
        let path = self.file_path(&file_name);
        tokio::fs::write(&path, &input.bytes)
            .await
            .with_context(|| format!("Failed to write upload {:?}", path))?;

        let original_name = sanitize_name(&input.original_name);
        let media = Media {
            id: 0,
            user_id: actor_id,
            file_name,
            original_name,
            mime_type,
            size: input.bytes.len() as i64,
            checksum,
            alt_text,
            created_at: chrono::Utc::now(),
        };

        let media = match self.media.create(&media).await {
            Ok(media) => media,
            Err(e) => {
                // Do not leave an orphaned file behind
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e.into());
            }
        };

        tracing::info!(media_id = media.id, user_id = actor_id, size = media.size, "Media uploaded");
        self.events
            .publish(DomainEvent::MediaUploaded {
                media_id: media.id,
                user_id: actor_id,
            })
            .await;
        Ok(media)
    }

    /// Own uploads, or everyone's with `media.manage.any`
    pub async fn list(
        &self,
        actor_id: i64,
        filter: &MediaFilter,
        params: &ListParams,
    ) -> ServiceResult<PagedResult<Media>> {
        let params = params.normalized();
        let mut filter = filter.clone();
        if !self.rbac.has_permission(actor_id, MANAGE_ANY).await? {
            filter.user_id = Some(actor_id);
        }

        let (items, total) = self.media.list(&filter, &params).await?;
        Ok(PagedResult::new(items, total, &params))
    }

    pub async fn get(&self, actor_id: i64, id: i64) -> ServiceResult<Media> {
        self.find_owned(actor_id, id).await
    }

    pub async fn update_alt_text(
        &self,
        actor_id: i64,
        id: i64,
        alt_text: Option<String>,
    ) -> ServiceResult<Media> {
        let mut media = self.find_owned(actor_id, id).await?;
        let alt_text = validate_alt(alt_text)?;

        self.media.update_alt_text(id, alt_text.as_deref()).await?;
        media.alt_text = alt_text;
        Ok(media)
    }

    /// Remove the record and the stored file. A file already missing from
    /// disk is not an error.
    pub async fn delete(&self, actor_id: i64, id: i64) -> ServiceResult<()> {
        let media = self.find_owned(actor_id, id).await?;
        self.media.delete(id).await?;

        let path = self.file_path(&media.file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(media_id = id, path = ?path, "Media file already missing");
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to remove upload {:?}", path))
                    .into())
            }
        }

        self.events
            .publish(DomainEvent::MediaDeleted {
                media_id: id,
                actor_id,
            })
            .await;
        Ok(())
    }

    pub fn public_url(&self, media: &Media) -> String {
        format!(
            "{}/{}",
            self.config.public_prefix.trim_end_matches('/'),
            media.file_name
        )
    }

    fn file_path(&self, file_name: &str) -> PathBuf {
        self.config.path.join(file_name)
    }

    /// Media of another user is reported missing unless the actor manages
    /// all media
    async fn find_owned(&self, actor_id: i64, id: i64) -> ServiceResult<Media> {
        let media = self
            .media
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Media"))?;
        if media.user_id != actor_id && !self.rbac.has_permission(actor_id, MANAGE_ANY).await? {
            return Err(ServiceError::not_found("Media"));
        }
        Ok(media)
    }
}

fn validate_alt(alt_text: Option<String>) -> ServiceResult<Option<String>> {
    let alt_text = alt_text
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());
    if alt_text.as_ref().is_some_and(|a| a.chars().count() > MAX_ALT_LEN) {
        return Err(ServiceError::field(
            "alt_text",
            "The alt text may not exceed 255 characters",
        ));
    }
    Ok(alt_text)
}

/// Keep only the final path component of a client-supplied file name
fn sanitize_name(name: &str) -> String {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let base: String = base.chars().filter(|c| !c.is_control()).take(255).collect();
    if base.is_empty() {
        "upload".to_string()
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    fn png(bytes: &[u8]) -> UploadInput {
        UploadInput {
            original_name: "../../etc/photo.png".into(),
            mime_type: "image/png".into(),
            bytes: bytes.to_vec(),
            alt_text: Some(" A photo ".into()),
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_name("C:\\Users\\me\\cat.jpg"), "cat.jpg");
        assert_eq!(sanitize_name("  "), "upload");
    }

    #[tokio::test]
    async fn test_upload_stores_file_with_checksum() {
        let ctx = testing::context().await;
        let author = ctx.user("writer", "author").await;
        let service = &ctx.services.media;

        let media = service.upload(author.id, png(b"hello")).await.unwrap();
        assert!(media.file_name.ends_with(".png"));
        assert_eq!(media.original_name, "photo.png");
        assert_eq!(media.size, 5);
        assert_eq!(
            media.checksum,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(media.alt_text.as_deref(), Some("A photo"));
        assert_eq!(service.public_url(&media), format!("/uploads/{}", media.file_name));

        let stored = tokio::fs::read(ctx.upload_dir().join(&media.file_name)).await.unwrap();
        assert_eq!(stored, b"hello");
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let ctx = testing::context_with(|c| c.upload.max_file_size = 4).await;
        let author = ctx.user("writer", "author").await;
        let service = &ctx.services.media;

        assert!(matches!(
            service.upload(author.id, png(b"")).await,
            Err(ServiceError::Validation { .. })
        ));
        assert!(matches!(
            service.upload(author.id, png(b"too large")).await,
            Err(ServiceError::Validation { .. })
        ));
        let exe = UploadInput {
            mime_type: "application/x-msdownload".into(),
            ..png(b"MZ")
        };
        assert!(matches!(
            service.upload(author.id, exe).await,
            Err(ServiceError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_ownership_rules() {
        let ctx = testing::context().await;
        let owner = ctx.user("writer", "author").await;
        let other = ctx.user("other", "author").await;
        let editor = ctx.user("editor", "editor").await;
        let service = &ctx.services.media;

        let media = service.upload(owner.id, png(b"data")).await.unwrap();
        service.upload(other.id, png(b"more")).await.unwrap();

        assert!(matches!(
            service.get(other.id, media.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(service.get(editor.id, media.id).await.is_ok());

        let params = ListParams::default();
        let own = service.list(owner.id, &MediaFilter::default(), &params).await.unwrap();
        assert_eq!(own.total, 1);
        let all = service.list(editor.id, &MediaFilter::default(), &params).await.unwrap();
        assert_eq!(all.total, 2);

        let updated = service
            .update_alt_text(owner.id, media.id, Some("New alt".into()))
            .await
            .unwrap();
        assert_eq!(updated.alt_text.as_deref(), Some("New alt"));
        let cleared = service.update_alt_text(owner.id, media.id, None).await.unwrap();
        assert!(cleared.alt_text.is_none());
    }

    #[tokio::test]
    async fn test_delete_tolerates_missing_file() {
        let ctx = testing::context().await;
        let owner = ctx.user("writer", "author").await;
        let service = &ctx.services.media;

        let media = service.upload(owner.id, png(b"data")).await.unwrap();
        let path = ctx.upload_dir().join(&media.file_name);
        tokio::fs::remove_file(&path).await.unwrap();

        service.delete(owner.id, media.id).await.unwrap();
        assert!(matches!(
            service.get(owner.id, media.id).await,
            Err(ServiceError::NotFound(_))
        ));

        let second = service.upload(owner.id, png(b"again")).await.unwrap();
        service.delete(owner.id, second.id).await.unwrap();
        assert!(!ctx.upload_dir().join(&second.file_name).exists());
    }
}
