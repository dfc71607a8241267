//! Chat room and message models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::User;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message joined with its author's username.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub content: String,
    pub user_id: i64,
    pub username: String,
    pub room_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Page descriptor returned alongside message listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

/// User as shown in the chat directory, with presence derived from activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryUser {
    #[serde(flatten)]
    pub user: User,
    pub is_online: bool,
    pub status: &'static str,
}
