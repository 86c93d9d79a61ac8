//! Event and envelope model.
//!
//! Each aggregate owns a closed sum type of payloads implementing
//! [`DomainEvent`]. Payload enums are serialized adjacently tagged
//! (`#[serde(tag = "type", content = "data")]`) with one newtype variant per
//! event type, so the variant tag is the stored `event_type` and the variant
//! body is the stored `data`. [`Event::to_stored`] and [`Event::from_stored`]
//! are the only places payload shape is checked.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EventStoreError;
use crate::repository::StoredEvent;

/// Metadata attached to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// The user whose command produced the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Uuid>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
    /// Correlation ID for tracing a command through its effects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// Causation ID linking this event to the event/command that caused it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,
    /// A second stream this event should be linked into after it is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_to: Option<String>,
}

impl EventMetadata {
    /// Metadata with only a timestamp.
    #[must_use]
    pub fn at(occurred_at: DateTime<Utc>) -> Self {
        Self {
            actor: None,
            occurred_at,
            correlation_id: None,
            causation_id: None,
            link_to: None,
        }
    }

    /// Returns these defaults with every field set in `overrides` replaced.
    #[must_use]
    pub fn merge(mut self, overrides: MetadataOverrides) -> Self {
        if let Some(actor) = overrides.actor {
            self.actor = Some(actor);
        }
        if let Some(occurred_at) = overrides.occurred_at {
            self.occurred_at = occurred_at;
        }
        if let Some(correlation_id) = overrides.correlation_id {
            self.correlation_id = Some(correlation_id);
        }
        if let Some(causation_id) = overrides.causation_id {
            self.causation_id = Some(causation_id);
        }
        if let Some(link_to) = overrides.link_to {
            self.link_to = Some(link_to);
        }
        self
    }
}

/// Per-event metadata overrides supplied with an [`EventInit`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataOverrides {
    /// Overrides the acting user.
    pub actor: Option<Uuid>,
    /// Overrides the event timestamp.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Overrides the correlation id.
    pub correlation_id: Option<Uuid>,
    /// Overrides the causation id.
    pub causation_id: Option<Uuid>,
    /// Requests a link into a second stream.
    pub link_to: Option<String>,
}

/// Trait implemented by every aggregate's event sum type.
pub trait DomainEvent:
    Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static
{
    /// Every event type name this sum type can decode.
    const EVENT_TYPES: &'static [&'static str];

    /// Returns the event type name (the serde variant tag).
    fn event_type(&self) -> &'static str;
}

/// An immutable, materialized event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<P> {
    /// Globally unique event identifier.
    pub event_id: Uuid,
    /// Typed payload.
    pub data: P,
    /// Event metadata.
    pub metadata: EventMetadata,
}

impl<P: DomainEvent> Event<P> {
    /// Creates an event with a fresh v4 identifier.
    #[must_use]
    pub fn new(data: P, metadata: EventMetadata) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            data,
            metadata,
        }
    }

    /// Returns the event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        self.data.event_type()
    }

    /// Encodes this event into its storage form.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Infrastructure` if the payload does not
    /// serialize as an adjacently tagged object.
    pub fn to_stored(&self) -> Result<StoredEvent, EventStoreError> {
        let value = serde_json::to_value(&self.data).map_err(|e| {
            EventStoreError::Infrastructure(format!("event serialization failed: {e}"))
        })?;
        let Value::Object(mut tagged) = value else {
            return Err(EventStoreError::Infrastructure(format!(
                "event {} did not serialize as a tagged object",
                self.event_type()
            )));
        };
        Ok(StoredEvent {
            event_id: self.event_id,
            event_type: self.event_type().to_owned(),
            data: tagged.remove("data").unwrap_or(Value::Null),
            metadata: self.metadata.clone(),
        })
    }

    /// Decodes a stored event into this payload type.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::Infrastructure` if the event type is not
    /// part of `P` or the data does not match the variant's shape.
    pub fn from_stored(stored: &StoredEvent) -> Result<Self, EventStoreError> {
        let mut tagged = serde_json::Map::with_capacity(2);
        tagged.insert("type".to_owned(), Value::String(stored.event_type.clone()));
        tagged.insert("data".to_owned(), stored.data.clone());
        let data = serde_json::from_value(Value::Object(tagged)).map_err(|e| {
            EventStoreError::Infrastructure(format!(
                "event deserialization failed for {}: {e}",
                stored.event_type
            ))
        })?;
        Ok(Self {
            event_id: stored.event_id,
            data,
            metadata: stored.metadata.clone(),
        })
    }
}

/// The pre-materialization form of an event emitted by an aggregate.
#[derive(Debug, Clone)]
pub struct EventInit<P> {
    /// Typed payload.
    pub data: P,
    /// Metadata fields that replace the aggregate's defaults.
    pub metadata: MetadataOverrides,
}

impl<P> EventInit<P> {
    /// Creates an init with no overrides.
    #[must_use]
    pub fn new(data: P) -> Self {
        Self {
            data,
            metadata: MetadataOverrides::default(),
        }
    }

    /// Requests a link of the materialized event into `stream_name`.
    #[must_use]
    pub fn link_to(mut self, stream_name: impl Into<String>) -> Self {
        self.metadata.link_to = Some(stream_name.into());
        self
    }

    /// Overrides the acting user.
    #[must_use]
    pub fn actor(mut self, actor: Uuid) -> Self {
        self.metadata.actor = Some(actor);
        self
    }

    /// Overrides the event timestamp.
    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.metadata.occurred_at = Some(occurred_at);
        self
    }
}

impl<P> From<P> for EventInit<P> {
    fn from(data: P) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Noted {
        pub text: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Cleared {}

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "data")]
    pub(crate) enum NoteEvent {
        Noted(Noted),
        Cleared(Cleared),
    }

    impl DomainEvent for NoteEvent {
        const EVENT_TYPES: &'static [&'static str] = &["Noted", "Cleared"];

        fn event_type(&self) -> &'static str {
            match self {
                Self::Noted(_) => "Noted",
                Self::Cleared(_) => "Cleared",
            }
        }
    }

    pub(crate) fn noted(text: &str) -> Event<NoteEvent> {
        Event::new(
            NoteEvent::Noted(Noted {
                text: text.to_owned(),
            }),
            EventMetadata::at(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()),
        )
    }

    #[test]
    fn test_to_stored_splits_tag_from_data() {
        let event = noted("hello");

        let stored = event.to_stored().unwrap();

        assert_eq!(stored.event_id, event.event_id);
        assert_eq!(stored.event_type, "Noted");
        assert_eq!(stored.data, serde_json::json!({"text": "hello"}));
        assert_eq!(stored.metadata, event.metadata);
    }

    #[test]
    fn test_from_stored_restores_typed_payload() {
        let event = noted("hello");
        let stored = event.to_stored().unwrap();

        let decoded = Event::<NoteEvent>::from_stored(&stored).unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn test_from_stored_rejects_unknown_event_type() {
        let mut stored = noted("hello").to_stored().unwrap();
        stored.event_type = "SomethingElse".to_owned();

        match Event::<NoteEvent>::from_stored(&stored) {
            Err(EventStoreError::Infrastructure(msg)) => {
                assert!(msg.starts_with("event deserialization failed for SomethingElse"));
            }
            other => panic!("expected Infrastructure, got {other:?}"),
        }
    }

    #[test]
    fn test_from_stored_rejects_malformed_data() {
        let mut stored = noted("hello").to_stored().unwrap();
        stored.data = serde_json::json!({"text": 42});

        let result = Event::<NoteEvent>::from_stored(&stored);

        assert!(matches!(result, Err(EventStoreError::Infrastructure(_))));
    }

    #[test]
    fn test_merge_only_replaces_supplied_fields() {
        let actor = Uuid::new_v4();
        let correlation = Uuid::new_v4();
        let defaults = EventMetadata {
            actor: Some(actor),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            correlation_id: Some(correlation),
            causation_id: Some(correlation),
            link_to: None,
        };
        let later = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        let merged = defaults.merge(MetadataOverrides {
            occurred_at: Some(later),
            link_to: Some("Organization$o1".to_owned()),
            ..MetadataOverrides::default()
        });

        assert_eq!(merged.actor, Some(actor));
        assert_eq!(merged.correlation_id, Some(correlation));
        assert_eq!(merged.occurred_at, later);
        assert_eq!(merged.link_to.as_deref(), Some("Organization$o1"));
    }
}
