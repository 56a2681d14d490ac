//! Event envelope codec
//!
//! Turns raw broker payloads into typed [`Event`]s. Decoding is pure; the
//! consumer decides what happens to a payload that fails here.

use crate::error::{AuditLogError, Result};
use crate::types::Event;

/// Decode a raw payload into an event
///
/// Rejects malformed JSON, non-object payloads, missing or mistyped
/// fields, and events without a subject. Unknown fields are ignored.
pub fn decode(payload: &[u8]) -> Result<Event> {
    let event: Event =
        serde_json::from_slice(payload).map_err(|e| AuditLogError::Decode(e.to_string()))?;

    if event.user_id.trim().is_empty() {
        return Err(AuditLogError::Decode(
            "field `user_id` must not be empty".to_string(),
        ));
    }

    Ok(event)
}

/// Encode an event into its wire form
pub fn encode(event: &Event) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(event)?)
}
