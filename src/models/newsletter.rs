//! Newsletter subscribers
//!
//! Double opt-in: a subscription starts `pending` until the emailed token is
//! confirmed. The same token later unsubscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    SubscriberStatus {
        Pending => "pending",
        Subscribed => "subscribed",
        Unsubscribed => "unsubscribed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsletterSubscriber {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub status: SubscriberStatus,
    #[serde(skip_serializing, default)]
    pub token: String,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeInput {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignInput {
    pub subject: String,
    /// Markdown body
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub recipients: usize,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterStats {
    pub pending: i64,
    pub subscribed: i64,
    pub unsubscribed: i64,
    pub total: i64,
}
