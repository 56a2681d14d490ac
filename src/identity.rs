//! Identity verification: caller token → subject
//!
//! The HTTP layer only needs a subject for each request. Where that
//! subject comes from is decided by an [`IdentityVerifier`]: a static map
//! for development, or a remote verification endpoint in production.

use crate::config::IdentityConfig;
use crate::error::{AuditLogError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Resolve a token to its subject, or fail with `Unauthorized`
    async fn verify(&self, token: &str) -> Result<String>;
}

/// Fixed token → subject map
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, subject: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), subject.into());
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<String> {
        self.tokens
            .get(token)
            .filter(|subject| !subject.is_empty())
            .cloned()
            .ok_or_else(|| AuditLogError::Unauthorized("unknown token".to_string()))
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    subject: String,
}

/// Verifies tokens against a remote endpoint
///
/// POSTs `{"token": ...}` and expects `{"subject": ...}` back. A 401 or
/// 403 answer is an invalid token; any other failure is a server error.
pub struct RemoteIdentityVerifier {
    client: reqwest::Client,
    url: String,
}

impl RemoteIdentityVerifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuditLogError::Config(format!("identity client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IdentityVerifier for RemoteIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&VerifyRequest { token })
            .send()
            .await
            .map_err(|e| AuditLogError::Server(format!("identity service unreachable: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuditLogError::Unauthorized("token rejected".to_string()));
        }
        if !status.is_success() {
            return Err(AuditLogError::Server(format!(
                "identity service returned {}",
                status
            )));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| AuditLogError::Server(format!("identity response: {}", e)))?;

        if body.subject.trim().is_empty() {
            return Err(AuditLogError::Unauthorized("token has no subject".to_string()));
        }

        Ok(body.subject)
    }
}

/// Pick a verifier from config: remote when `verify_url` is set
pub fn verifier_from_config(config: &IdentityConfig) -> Result<Arc<dyn IdentityVerifier>> {
    match config.verify_url {
        Some(ref url) => {
            tracing::info!(url = %url, "Using remote identity verification");
            Ok(Arc::new(RemoteIdentityVerifier::new(
                url.clone(),
                Duration::from_secs(config.verify_timeout_secs),
            )?))
        }
        None => {
            if config.tokens.is_empty() {
                tracing::warn!("No identity tokens configured, every read will be rejected");
            }
            Ok(Arc::new(StaticTokenVerifier::new(config.tokens.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier = StaticTokenVerifier::default()
            .with_token("t1", "u1")
            .with_token("blank", "");

        assert_eq!(verifier.verify("t1").await.unwrap(), "u1");
        assert!(matches!(
            verifier.verify("nope").await,
            Err(AuditLogError::Unauthorized(_))
        ));
        assert!(verifier.verify("blank").await.is_err());
    }

    async fn spawn_identity_service() -> String {
        async fn verify(
            Json(body): Json<serde_json::Value>,
        ) -> (StatusCode, Json<serde_json::Value>) {
            match body["token"].as_str() {
                Some("good") => (StatusCode::OK, Json(serde_json::json!({"subject": "u1"}))),
                Some("broken") => (StatusCode::BAD_GATEWAY, Json(serde_json::json!({}))),
                _ => (StatusCode::UNAUTHORIZED, Json(serde_json::json!({}))),
            }
        }

        let app = Router::new().route("/verify", post(verify));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/verify", addr)
    }

    #[tokio::test]
    async fn test_remote_verifier() {
        let url = spawn_identity_service().await;
        let verifier = RemoteIdentityVerifier::new(url, Duration::from_secs(5)).unwrap();

        assert_eq!(verifier.verify("good").await.unwrap(), "u1");
        assert!(matches!(
            verifier.verify("bad").await,
            Err(AuditLogError::Unauthorized(_))
        ));
        assert!(matches!(
            verifier.verify("broken").await,
            Err(AuditLogError::Server(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_verifier_unreachable() {
        let verifier = RemoteIdentityVerifier::new(
            "http://127.0.0.1:1/verify",
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(matches!(
            verifier.verify("good").await,
            Err(AuditLogError::Server(_))
        ));
    }

    #[tokio::test]
    async fn test_verifier_from_config_defaults_to_static() {
        let mut config = IdentityConfig::default();
        config.tokens.insert("t".into(), "u9".into());
        let verifier = verifier_from_config(&config).unwrap();
        assert_eq!(verifier.verify("t").await.unwrap(), "u9");
    }
}
