use std::sync::Arc;

use axum::http::HeaderName;

use crate::dlq::DlqHandler;
use crate::error::{AuditLogError, Result};
use crate::identity::IdentityVerifier;
use crate::provider::EventProvider;
use crate::reader::PaginatedReader;
use crate::storage::LogStore;

/// Shared application state accessible to all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub reader: PaginatedReader,
    pub store: Arc<dyn LogStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub dlq: Arc<dyn DlqHandler>,
    /// Broker reported by `/health`; absent when running read-only
    pub provider: Option<Arc<dyn EventProvider>>,
    /// Header consulted when `Authorization` carries no bearer token
    pub identity_header: HeaderName,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LogStore>,
        verifier: Arc<dyn IdentityVerifier>,
        dlq: Arc<dyn DlqHandler>,
        identity_header: &str,
    ) -> Result<Self> {
        let identity_header = HeaderName::from_bytes(identity_header.as_bytes()).map_err(|e| {
            AuditLogError::Config(format!("Invalid identity header '{}': {}", identity_header, e))
        })?;

        Ok(Self {
            reader: PaginatedReader::new(store.clone()),
            store,
            verifier,
            dlq,
            provider: None,
            identity_header,
        })
    }

    pub fn with_provider(mut self, provider: Arc<dyn EventProvider>) -> Self {
        self.provider = Some(provider);
        self
    }
}
