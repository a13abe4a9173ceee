//! Common types used across the workspace

use serde::{Deserialize, Serialize};

/// Default maximum BOM depth walked by the explosion and cascade engines
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// Default cap on auto-productions triggered by one root production
pub const DEFAULT_MAX_PRODUCTIONS: u32 = 500;

/// Window used for the cached minimum balance and stock-out date
pub const RUPTURA_WINDOW_DAYS: u32 = 7;

/// Guards bounding the work of one traversal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineLimits {
    pub max_depth: u32,
    pub max_productions: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_productions: DEFAULT_MAX_PRODUCTIONS,
        }
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page.clamp(1, 500))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 50,
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PaginationMeta {
    pub fn new(pagination: &Pagination, total_items: u64) -> Self {
        let per_page = pagination.per_page.clamp(1, 500);
        Self {
            page: pagination.page.max(1),
            per_page,
            total_items,
            total_pages: total_items.div_ceil(u64::from(per_page)) as u32,
        }
    }
}
