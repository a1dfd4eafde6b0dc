//! Wire records for the support-chat endpoints.
//!
//! These types mirror the JSON the backend produces. The backend is not
//! under our control, so every optional field is parsed leniently: a value
//! of the wrong JSON type is treated as absent rather than failing the
//! whole record.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Maximum allowed message length in characters.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Role value the backend uses for messages written by the app user.
pub const DEFAULT_SELF_ROLE: &str = "user";

/// Role value the backend uses for desk staff replies.
pub const DEFAULT_COUNTERPART_ROLE: &str = "admin";

/// Backend-assigned record identifier.
///
/// The backend emits either JSON numbers or strings. Both forms are kept
/// as received; use [`RawId::canonical`] when comparing identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    /// Numeric identifier (`"id": 42`).
    Number(i64),
    /// String identifier (`"id": "42"` or an opaque token).
    Text(String),
    /// Any other JSON number: above `i64::MAX` or written as a float.
    Wide(serde_json::Number),
}

impl RawId {
    /// Returns the identifier rendered as a string, so that `42`, `42.0`
    /// and `"42"` name the same record.
    ///
    /// Returns `None` for a blank string id, which identifies nothing.
    #[must_use]
    pub fn canonical(&self) -> Option<String> {
        match self {
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Self::Wide(n) => Some(match n.as_f64() {
                Some(f) if n.is_f64() && f.fract() == 0.0 => format!("{f:.0}"),
                _ => n.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for RawId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical().as_deref().unwrap_or_default())
    }
}

/// A chat record exactly as the backend returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Backend id, if present and well-typed.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub id: Option<RawId>,
    /// Message body.
    pub message: String,
    /// Author role (`"user"` for the app user, anything else for staff).
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub from_role: Option<String>,
    /// Creation time as produced by the backend (RFC 3339 or
    /// `YYYY-MM-DD HH:MM:SS`).
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl RawMessage {
    /// Creates a record with only a body and role set.
    pub fn new(message: impl Into<String>, from_role: impl Into<String>) -> Self {
        Self {
            id: None,
            message: message.into(),
            from_role: Some(from_role.into()),
            created_at: None,
        }
    }

    /// Sets the backend id.
    #[must_use]
    pub fn with_id(mut self, id: RawId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the creation time string.
    #[must_use]
    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }
}

/// Body of a send call: `{ "message": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    /// Text to send.
    pub message: String,
}

/// Error returned when a send request fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Message is empty or whitespace only.
    #[error("message is empty")]
    Empty,
    /// Message exceeds the maximum allowed length.
    #[error("message too long ({len} chars, max {max} chars)")]
    TooLong {
        /// Actual length in characters.
        len: usize,
        /// Maximum allowed length in characters.
        max: usize,
    },
}

impl SendRequest {
    /// Creates a request for the given text.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Validates against [`MAX_MESSAGE_LEN`].
    ///
    /// # Errors
    ///
    /// See [`validate_with_limit`](Self::validate_with_limit).
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_with_limit(MAX_MESSAGE_LEN)
    }

    /// Checks that the text is non-blank and at most `max` characters.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] for blank text, or
    /// [`ValidationError::TooLong`] if it has more than `max` characters.
    pub fn validate_with_limit(&self, max: usize) -> Result<(), ValidationError> {
        if self.message.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        let len = self.message.chars().count();
        if len > max {
            return Err(ValidationError::TooLong { len, max });
        }
        Ok(())
    }
}

/// Deserializes an optional field, mapping a wrongly-typed value to `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}
