use bytes::Bytes;

use crate::bootstrap;
use crate::codec;
use crate::config::{AuditLogConfig, BrokerKind};
use crate::error::Result;

/// Execute the `publish` command: send one event through the configured broker.
pub async fn execute(
    config: &AuditLogConfig,
    topic: &str,
    payload: &str,
    raw: bool,
) -> Result<()> {
    let body = prepare_payload(payload, raw)?;

    if config.broker == BrokerKind::Memory {
        tracing::warn!("Publishing to the in-memory broker reaches no other process");
    }

    let provider = bootstrap::connect_provider(config).await?;
    let sequence = provider.publish(topic, body).await?;

    println!("Published to {} (sequence {})", topic, sequence);
    Ok(())
}

/// Canonical encoding of a validated event, or the bytes untouched with `raw`
fn prepare_payload(payload: &str, raw: bool) -> Result<Bytes> {
    if raw {
        return Ok(Bytes::copy_from_slice(payload.as_bytes()));
    }
    let event = codec::decode(payload.as_bytes())?;
    Ok(Bytes::from(codec::encode(&event)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditLogError;

    #[test]
    fn test_prepare_validates_and_drops_unknown_fields() {
        let body = prepare_payload(
            r#"{"user_id":"u1","action":"login","ip":"1.2.3.4","browser":"ff","timestamp":"2024-01-01T00:00:00Z","extra":1}"#,
            false,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["user_id"], "u1");
        assert!(value.get("extra").is_none());
    }

    #[test]
    fn test_prepare_rejects_invalid_unless_raw() {
        assert!(matches!(
            prepare_payload("{not json", false),
            Err(AuditLogError::Decode(_))
        ));
        assert_eq!(&prepare_payload("{not json", true).unwrap()[..], b"{not json");
    }
}
