//! Paginated reader over a subject's own records

use crate::error::{AuditLogError, Result};
use crate::storage::LogStore;
use crate::types::LogRecord;
use std::sync::Arc;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Verified caller identity
///
/// Only constructible with a non-empty subject, so holding one proves the
/// caller was authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    subject: String,
}

impl RequestContext {
    pub fn new(subject: impl Into<String>) -> Result<Self> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(AuditLogError::Unauthorized(
                "identity has no subject".to_string(),
            ));
        }
        Ok(Self { subject })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// 1-based page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Build from raw query parameters
    ///
    /// Each value falls back to its default independently when absent,
    /// non-numeric, negative or zero. A large page is kept and reads past
    /// the end.
    pub fn from_params(page: Option<&str>, page_size: Option<&str>) -> Self {
        Self {
            page: positive_or(page, DEFAULT_PAGE),
            page_size: positive_or(page_size, DEFAULT_PAGE_SIZE),
        }
    }

    /// Records skipped before this page
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Reads pages of a subject's records
#[derive(Clone)]
pub struct PaginatedReader {
    store: Arc<dyn LogStore>,
}

impl PaginatedReader {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    /// Records of the caller, ordered by timestamp then arrival
    ///
    /// Returns an empty page past the end.
    pub async fn list_by_subject(
        &self,
        ctx: &RequestContext,
        page: PageRequest,
    ) -> Result<Vec<LogRecord>> {
        let records = self
            .store
            .list_by_subject(ctx.subject(), page.page_size, page.offset())
            .await?;

        tracing::debug!(
            subject = %ctx.subject(),
            page = page.page,
            page_size = page.page_size,
            returned = records.len(),
            "Listed log records"
        );

        Ok(records)
    }
}
