//! Typed post lifecycle events.
//!
//! Every routing key has exactly one payload schema. Decoding takes the
//! routing key and the raw bytes together and rejects any payload that does
//! not match the schema for its key, so handlers only ever see well-formed
//! [`PostEvent`] values.
//!
//! # Wire format
//!
//! Payloads are JSON objects with camelCase keys:
//!
//! ```text
//! post.created  {"postId": "...", "userId": "...", "content": "...", "createdAt": "..."}
//! post.deleted  {"postId": "...", "userId": "...", "mediaIds": ["...", ...]}
//! ```

use crate::ids::{MediaId, PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the shared topic exchange every service publishes to.
pub const EXCHANGE_NAME: &str = "chirp_events";

/// Routing key for [`PostEvent::Created`].
pub const POST_CREATED: &str = "post.created";

/// Routing key for [`PostEvent::Deleted`].
pub const POST_DELETED: &str = "post.deleted";

/// Prefix under which exhausted or undecodable deliveries are republished.
pub const DEAD_LETTER_PREFIX: &str = "dead_letter";

/// Build the dead-letter routing key for `routing_key`.
#[must_use]
pub fn dead_letter_key(routing_key: &str) -> String {
    format!("{DEAD_LETTER_PREFIX}.{routing_key}")
}

/// Errors raised while encoding or decoding event payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventDecodeError {
    /// No schema is registered for the routing key
    #[error("Unknown routing key: {0}")]
    UnknownRoutingKey(String),

    /// The payload does not match the schema for its routing key
    #[error("Malformed payload for '{routing_key}': {reason}")]
    MalformedPayload {
        /// Routing key the payload arrived under
        routing_key: String,
        /// Parser message
        reason: String,
    },

    /// The event could not be serialized
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

/// Payload of `post.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostCreated {
    /// The new post.
    pub post_id: PostId,
    /// Its author.
    pub user_id: UserId,
    /// Its text body.
    pub content: String,
    /// When it was created.
    pub created_at: DateTime<Utc>,
}

/// Payload of `post.deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PostDeleted {
    /// The removed post.
    pub post_id: PostId,
    /// Its author, who performed the delete.
    pub user_id: UserId,
    /// Media that was attached to it.
    pub media_ids: Vec<MediaId>,
}

/// A post lifecycle event, tagged by its routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostEvent {
    /// A post was created.
    Created(PostCreated),
    /// A post was deleted.
    Deleted(PostDeleted),
}

impl PostEvent {
    /// Routing key this event is published under.
    #[must_use]
    pub const fn routing_key(&self) -> &'static str {
        match self {
            Self::Created(_) => POST_CREATED,
            Self::Deleted(_) => POST_DELETED,
        }
    }

    /// The post the event is about.
    #[must_use]
    pub const fn post_id(&self) -> PostId {
        match self {
            Self::Created(e) => e.post_id,
            Self::Deleted(e) => e.post_id,
        }
    }

    /// Serialize the payload (without the routing key).
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodeError::SerializationFailed`] if JSON encoding fails.
    pub fn to_payload(&self) -> Result<Vec<u8>, EventDecodeError> {
        let result = match self {
            Self::Created(e) => serde_json::to_vec(e),
            Self::Deleted(e) => serde_json::to_vec(e),
        };
        result.map_err(|e| EventDecodeError::SerializationFailed(e.to_string()))
    }

    /// Decode a payload that arrived under `routing_key`.
    ///
    /// # Errors
    ///
    /// - [`EventDecodeError::UnknownRoutingKey`] for keys with no schema
    /// - [`EventDecodeError::MalformedPayload`] when the JSON does not match
    ///   the schema for the key
    pub fn decode(routing_key: &str, payload: &[u8]) -> Result<Self, EventDecodeError> {
        let malformed = |e: serde_json::Error| EventDecodeError::MalformedPayload {
            routing_key: routing_key.to_string(),
            reason: e.to_string(),
        };

        match routing_key {
            POST_CREATED => serde_json::from_slice(payload)
                .map(Self::Created)
                .map_err(malformed),
            POST_DELETED => serde_json::from_slice(payload)
                .map(Self::Deleted)
                .map_err(malformed),
            other => Err(EventDecodeError::UnknownRoutingKey(other.to_string())),
        }
    }
}

impl From<PostCreated> for PostEvent {
    fn from(event: PostCreated) -> Self {
        Self::Created(event)
    }
}

impl From<PostDeleted> for PostEvent {
    fn from(event: PostDeleted) -> Self {
        Self::Deleted(event)
    }
}

/// An event as it travels over the bus: routing key plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedEvent {
    /// Routing key, e.g. `post.created`.
    pub routing_key: String,
    /// Encoded payload.
    pub data: Vec<u8>,
}

impl SerializedEvent {
    /// Create a serialized event from its parts.
    #[must_use]
    pub const fn new(routing_key: String, data: Vec<u8>) -> Self {
        Self { routing_key, data }
    }

    /// Serialize a typed event.
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodeError::SerializationFailed`] if encoding fails.
    pub fn from_event(event: &PostEvent) -> Result<Self, EventDecodeError> {
        Ok(Self {
            routing_key: event.routing_key().to_string(),
            data: event.to_payload()?,
        })
    }

    /// Decode into a typed event.
    ///
    /// # Errors
    ///
    /// See [`PostEvent::decode`].
    pub fn decode(&self) -> Result<PostEvent, EventDecodeError> {
        PostEvent::decode(&self.routing_key, &self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created() -> PostEvent {
        PostEvent::Created(PostCreated {
            post_id: PostId::new(),
            user_id: UserId::new(),
            content: "hello".to_string(),
            created_at: Utc::now(),
        })
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn event_serialization_roundtrip() {
        let event = created();
        let serialized = SerializedEvent::from_event(&event).expect("encode");
        assert_eq!(serialized.routing_key, POST_CREATED);
        assert_eq!(serialized.decode().expect("decode"), event);
    }

    #[test]
    #[allow(clippy::expect_used)]
    fn payload_uses_camel_case_fields() {
        let post_id = PostId::new();
        let event = PostEvent::Deleted(PostDeleted {
            post_id,
            user_id: UserId::new(),
            media_ids: vec![],
        });
        let json: serde_json::Value =
            serde_json::from_slice(&event.to_payload().expect("encode")).expect("json");
        assert_eq!(json["postId"], post_id.to_string());
        assert!(json["mediaIds"].as_array().is_some_and(Vec::is_empty));
    }

    #[test]
    fn payload_must_match_its_routing_key() {
        let created = created().to_payload();
        assert!(matches!(
            created.map(|p| PostEvent::decode(POST_DELETED, &p)),
            Ok(Err(EventDecodeError::MalformedPayload { .. }))
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = PostEvent::decode(POST_CREATED, b"{\"postId\": 12}");
        assert!(matches!(err, Err(EventDecodeError::MalformedPayload { .. })));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = PostEvent::decode("user.created", b"{}");
        assert_eq!(
            err,
            Err(EventDecodeError::UnknownRoutingKey("user.created".to_string()))
        );
    }

    #[test]
    fn dead_letter_keys_are_prefixed() {
        assert_eq!(dead_letter_key(POST_DELETED), "dead_letter.post.deleted");
    }
}
