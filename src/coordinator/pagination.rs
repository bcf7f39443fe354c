//! Pagination sanitization.

use crate::config::CoordinatorSettings;

/// Sanitized paging parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u64,
    /// Items per page.
    pub page_size: u64,
    /// Items to skip: `(page - 1) * page_size`.
    pub offset: u64,
}

/// Sanitize caller-supplied paging.
///
/// Non-positive pages default to 1; non-positive page sizes fall back to the
/// configured default and oversized ones are clamped to the configured
/// maximum.
#[must_use]
pub fn sanitize(page: i64, page_size: i64, settings: &CoordinatorSettings) -> Pagination {
    let page = if page <= 0 { 1 } else { page as u64 };
    let page_size = if page_size <= 0 {
        settings.default_page_size
    } else {
        (page_size as u64).min(settings.max_page_size)
    };
    Pagination {
        page,
        page_size,
        offset: (page - 1) * page_size,
    }
}
