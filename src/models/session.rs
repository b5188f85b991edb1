use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Bearer-token session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque token (UUID v4), also the primary key
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: i64, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}
