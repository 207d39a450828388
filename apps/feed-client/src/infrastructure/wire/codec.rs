//! Feed Codec
//!
//! Decodes one JSON frame per message, dispatching on the `type` tag.
//! An unrecognized tag is not an error: it decodes to
//! [`FeedMessage::Unknown`] so forward-compatible servers never break
//! this client. Malformed payloads are errors for the caller to log
//! and drop — never to escalate into a reconnect.

use super::messages::{
    ConnectionMessage, FeedMessage, HeartbeatMessage, PortfolioUpdateMessage, PriceUpdateMessage,
    PositionUpdateMessage, SubscriptionConfirmedMessage, TradingAlertMessage,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame has no `type` field.
    #[error("frame is missing the type tag")]
    MissingType,

    /// Frame is not a JSON object.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the feed protocol.
#[derive(Debug, Default, Clone)]
pub struct FeedCodec;

impl FeedCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a single frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not valid JSON, is not an
    /// object, lacks a `type` tag, or a known type's payload does not
    /// match its schema.
    pub fn decode(&self, text: &str) -> Result<FeedMessage, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            let preview: String = trimmed.chars().take(50).collect();
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {preview}..."
            )));
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        let Some(msg_type) = value.get("type").and_then(|v| v.as_str()) else {
            return Err(CodecError::MissingType);
        };

        let message = match msg_type {
            "price_update" => {
                let m: PriceUpdateMessage = serde_json::from_value(value)?;
                FeedMessage::PriceUpdate(m)
            }
            "portfolio_update" => {
                let m: PortfolioUpdateMessage = serde_json::from_value(value)?;
                FeedMessage::PortfolioUpdate(m)
            }
            "position_update" => {
                let m: PositionUpdateMessage = serde_json::from_value(value)?;
                FeedMessage::PositionUpdate(m)
            }
            "trading_alert" => {
                let m: TradingAlertMessage = serde_json::from_value(value)?;
                FeedMessage::TradingAlert(m)
            }
            "heartbeat" => {
                let m: HeartbeatMessage = serde_json::from_value(value)?;
                FeedMessage::Heartbeat(m)
            }
            "subscription_confirmed" => {
                let m: SubscriptionConfirmedMessage = serde_json::from_value(value)?;
                FeedMessage::SubscriptionConfirmed(m)
            }
            "connection" => {
                let m: ConnectionMessage = serde_json::from_value(value)?;
                FeedMessage::Connection(m)
            }
            "pong" => FeedMessage::Pong,
            other => FeedMessage::Unknown(other.to_string()),
        };

        Ok(message)
    }

    /// Encode a value to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: serde::Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}
