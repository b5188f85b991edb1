use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uploaded file record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: i64,
    pub user_id: i64,
    /// Stored name, `{uuid}.{ext}`
    pub file_name: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    /// SHA-256 of the content, lowercase hex
    pub checksum: String,
    pub alt_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaFilter {
    #[serde(default)]
    pub user_id: Option<i64>,
    /// e.g. `image/`
    #[serde(default)]
    pub mime_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadInput {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub alt_text: Option<String>,
}
