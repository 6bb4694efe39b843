//! Data models shared across storage, capture and API handlers.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub const MAX_PAGE_SIZE: i64 = 100;

/// Query parameters for paginated endpoints.
#[derive(Debug, Clone, Default, Deserialize, Validate, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PaginationQuery {
    /// Zero-based page number (default: 0).
    #[validate(range(min = 0, max = 100_000))]
    pub page: Option<i64>,
    /// Page size (default: configured, max: 100).
    #[validate(range(min = 1, max = 100))]
    pub size: Option<i64>,
}

impl PaginationQuery {
    pub fn to_page_request(&self, default_size: i64) -> PageRequest {
        PageRequest::new(
            self.page.unwrap_or(0),
            self.size.unwrap_or(default_size),
        )
    }
}

/// A normalized page window over a timestamp-descending result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    size: i64,
}

impl PageRequest {
    pub fn new(page: i64, size: i64) -> Self {
        Self {
            page: page.max(0),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn size(&self) -> i64 {
        self.size
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_mul(self.size)
    }
}

/// One page of results plus the totals needed to navigate the rest.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total_elements: i64,
    pub total_pages: i64,
    pub page: i64,
    pub size: i64,
}

impl<T: Serialize> Page<T> {
    pub fn new(items: Vec<T>, total_elements: i64, request: PageRequest) -> Self {
        let size = request.size();
        Self {
            items,
            total_elements,
            total_pages: (total_elements + size - 1) / size,
            page: request.page(),
            size,
        }
    }

    pub fn map<U: Serialize>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            page: self.page,
            size: self.size,
        }
    }
}

pub mod audit_log;
pub mod user;
