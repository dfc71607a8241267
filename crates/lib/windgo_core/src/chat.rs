//! Message paging and presence helpers.

use chrono::{DateTime, Duration, Utc};

use crate::models::auth::User;
use crate::models::chat::{DirectoryUser, Pagination};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// A user counts as online when active within this window.
pub const ONLINE_WINDOW_SECS: i64 = 5 * 60;

/// Normalized page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Page defaults to 1, limit to 50 and is capped at 100. Zero counts as
    /// unset.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let limit = limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE);
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    pub fn pagination(&self, total: i64) -> Pagination {
        let limit = i64::from(self.limit);
        Pagination {
            page: self.page,
            limit: self.limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

/// Attach presence derived from `last_active_at`.
pub fn with_presence(user: User, now: DateTime<Utc>) -> DirectoryUser {
    let is_online = user
        .last_active_at
        .is_some_and(|at| now - at <= Duration::seconds(ONLINE_WINDOW_SECS));
    DirectoryUser {
        user,
        is_online,
        status: if is_online { "online" } else { "offline" },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::{AuthProvider, Role};

    #[test]
    fn page_defaults_and_caps() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, limit: 50 });
        assert_eq!(PageRequest::new(Some(0), Some(500)).limit, 100);
        assert_eq!(PageRequest::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        let req = PageRequest::new(Some(1), Some(50));
        assert_eq!(req.pagination(0).total_pages, 0);
        assert_eq!(req.pagination(50).total_pages, 1);
        assert_eq!(req.pagination(51).total_pages, 2);
    }

    #[test]
    fn presence_window() {
        let now = Utc::now();
        let user = |last: Option<DateTime<Utc>>| User {
            id: 1,
            username: "u".into(),
            email: "u@x".into(),
            role: Role::User,
            provider: AuthProvider::Local,
            github_id: None,
            avatar_url: None,
            last_active_at: last,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        assert!(with_presence(user(Some(now - Duration::minutes(4))), now).is_online);
        let away = with_presence(user(Some(now - Duration::minutes(6))), now);
        assert_eq!(away.status, "offline");
        assert!(!with_presence(user(None), now).is_online);
    }
}
