//! The event envelope: the wire record pushed onto the inbox and onto every
//! destination list.
//!
//! # Wire Format
//!
//! ```text
//! {"channel":"com.example.admin","event":"user.created","data":[1,2,{"id":7}]}
//! ```
//!
//! Readers must not depend on field order. `data` is an ordered sequence of
//! arbitrary JSON values and may be empty; `channel` and `event` may not.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while decoding an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Payload was not a JSON envelope.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required string field was present but empty.
    #[error("envelope field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// Result type for envelope operations.
pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// One published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub channel: String,
    pub event: String,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

impl Envelope {
    pub fn new(
        channel: impl Into<String>,
        event: impl Into<String>,
        data: Vec<serde_json::Value>,
    ) -> Self {
        Envelope {
            channel: channel.into(),
            event: event.into(),
            data,
        }
    }

    /// Decodes and validates a raw payload.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeError::Json` if the payload is not a JSON envelope and
    /// `EnvelopeError::EmptyField` if `channel` or `event` is empty.
    pub fn parse(payload: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(payload)?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Encodes the envelope for the wire.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeError::EmptyField` for an envelope that `parse` would reject.
    pub fn to_payload(&self) -> Result<String> {
        self.validate()?;
        Ok(serde_json::to_string(self)?)
    }

    /// `"<channel>::<event>"`, the name used in log lines.
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.channel, self.event)
    }

    fn validate(&self) -> Result<()> {
        if self.channel.is_empty() {
            return Err(EnvelopeError::EmptyField("channel"));
        }
        if self.event.is_empty() {
            return Err(EnvelopeError::EmptyField("event"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::arb_envelope;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        /// Whatever a publisher encodes, the broker decodes to the same envelope.
        #[test]
        fn payload_decodes_to_same_envelope(envelope in arb_envelope()) {
            let payload = envelope.to_payload().unwrap();
            let decoded = Envelope::parse(&payload).unwrap();
            prop_assert_eq!(decoded, envelope);
        }
    }

    #[test]
    fn parse_ignores_field_order() {
        let envelope = Envelope::parse(r#"{"data":[1,2],"event":"e","channel":"ch1"}"#).unwrap();
        assert_eq!(envelope, Envelope::new("ch1", "e", vec![json!(1), json!(2)]));
    }

    #[test]
    fn parse_preserves_data_order() {
        let envelope =
            Envelope::parse(r#"{"channel":"c","event":"e","data":[3,"x",{"k":1},null]}"#).unwrap();
        assert_eq!(
            envelope.data,
            vec![json!(3), json!("x"), json!({"k": 1}), json!(null)]
        );
    }

    #[test]
    fn parse_accepts_missing_data() {
        let envelope = Envelope::parse(r#"{"channel":"c","event":"e"}"#).unwrap();
        assert!(envelope.data.is_empty());
    }

    #[test]
    fn parse_rejects_empty_channel() {
        let err = Envelope::parse(r#"{"channel":"","event":"e","data":[]}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::EmptyField("channel")));
    }

    #[test]
    fn parse_rejects_empty_event() {
        let err = Envelope::parse(r#"{"channel":"c","event":"","data":[]}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::EmptyField("event")));
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(matches!(
            Envelope::parse("not json"),
            Err(EnvelopeError::Json(_))
        ));
    }

    #[test]
    fn to_payload_rejects_invalid_envelope() {
        let envelope = Envelope::new("", "e", Vec::new());
        assert!(envelope.to_payload().is_err());
    }

    #[test]
    fn qualified_name_joins_channel_and_event() {
        let envelope = Envelope::new("my.app", "test.event", Vec::new());
        assert_eq!(envelope.qualified_name(), "my.app::test.event");
    }
}
