use serde::{Deserialize, Serialize};

use crate::constants::LEADERBOARD_PAGE_MAX;

pub mod event;
pub mod leaderboard;
pub mod team;
pub mod tracked_item;

#[inline]
const fn default_page() -> i64 {
    0
}

#[inline]
const fn default_limit() -> i64 {
    50
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_page")]
    pub page: i64,
}

impl Pagination {
    /// Clamps the requested window and returns it as `(offset, limit)`.
    ///
    /// `offset + limit` always fits in an `i64`.
    pub fn window(&self) -> (i64, i64) {
        let limit = self.limit.clamp(1, LEADERBOARD_PAGE_MAX);
        let page = self.page.clamp(0, (i64::MAX - limit) / limit);

        (page * limit, limit)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub total_items: i64,
    pub total_pages: i64,
    #[serde(default = "default_limit")]
    pub page_size: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total_items: i64, page_size: i64, page: i64) -> Self {
        let total_pages = match page_size {
            0 => 0,
            size => (total_items + size - 1) / size,
        };

        Self {
            items,
            page,
            page_size,
            total_items,
            total_pages,
        }
    }
}
