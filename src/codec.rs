//! Typed event encoding and tag-based decoding.
//!
//! Producers encode a typed event under its type tag. Consumers decode by
//! looking the tag up in an [`EventRegistry`]. An unknown tag is reported as
//! [`Error::UnrecognizedEventType`] and never skipped, since it means the
//! producer and consumer disagree about the schema.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{EventData, RecordedEvent};

/// A domain event with a stable type tag.
pub trait Event: Serialize + DeserializeOwned {
    const EVENT_TYPE: &'static str;
}

/// Serialize a typed event as JSON under its type tag.
pub fn encode<T: Event>(event: &T) -> Result<EventData> {
    EventData::json(T::EVENT_TYPE, event).map_err(Error::Encode)
}

type Decoder<E> = Box<dyn Fn(&[u8]) -> serde_json::Result<E> + Send + Sync>;

/// Maps type tags to decoders producing a common event type `E`.
pub struct EventRegistry<E> {
    decoders: HashMap<&'static str, Decoder<E>>,
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }
}

impl<E: 'static> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}

impl<E: 'static> EventRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its type tag, converting into `E` with `wrap`.
    pub fn register<T, F>(mut self, wrap: F) -> Self
    where
        T: Event + 'static,
        F: Fn(T) -> E + Send + Sync + 'static,
    {
        self.decoders.insert(
            T::EVENT_TYPE,
            Box::new(move |data: &[u8]| serde_json::from_slice::<T>(data).map(&wrap)),
        );
        self
    }

    pub fn knows(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    /// Registered tags, sorted.
    pub fn event_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.decoders.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn decode(&self, event: &RecordedEvent) -> Result<E> {
        let decoder = self.decoders.get(event.event_type.as_str()).ok_or_else(|| {
            Error::UnrecognizedEventType {
                event_type: event.event_type.clone(),
                stream: event.stream.clone(),
                revision: event.revision,
            }
        })?;

        decoder(&event.data).map_err(|source| Error::Decode {
            event_type: event.event_type.clone(),
            stream: event.stream.clone(),
            revision: event.revision,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use chrono::Utc;
    use serde::Deserialize;
    use uuid::Uuid;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Created {
        id: String,
    }

    impl Event for Created {
        const EVENT_TYPE: &'static str = "Created";
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Cancelled {
        reason: String,
    }

    impl Event for Cancelled {
        const EVENT_TYPE: &'static str = "Cancelled";
    }

    #[derive(Debug, PartialEq)]
    enum OrderEvent {
        Created(Created),
        Cancelled(Cancelled),
    }

    fn registry() -> EventRegistry<OrderEvent> {
        EventRegistry::new()
            .register(OrderEvent::Created)
            .register(OrderEvent::Cancelled)
    }

    fn recorded(data: EventData) -> RecordedEvent {
        RecordedEvent {
            id: data.id,
            stream: "orders".to_string(),
            revision: 3,
            position: 7,
            event_type: data.event_type,
            content_type: data.content_type,
            data: data.data,
            metadata: data.metadata,
            created: Utc::now(),
        }
    }

    #[test]
    fn test_decode_dispatches_on_tag() {
        let registry = registry();

        let created = recorded(encode(&Created { id: "1".to_string() }).unwrap());
        assert_eq!(
            registry.decode(&created).unwrap(),
            OrderEvent::Created(Created { id: "1".to_string() })
        );

        let cancelled = recorded(
            encode(&Cancelled {
                reason: "late".to_string(),
            })
            .unwrap(),
        );
        assert!(matches!(
            registry.decode(&cancelled).unwrap(),
            OrderEvent::Cancelled(_)
        ));
    }

    #[test]
    fn test_unknown_tag_is_unrecognized() {
        let registry = registry();
        let unknown = recorded(EventData::binary("Shipped", Bytes::from_static(b"{}")));

        match registry.decode(&unknown).unwrap_err() {
            Error::UnrecognizedEventType {
                event_type,
                stream,
                revision,
            } => {
                assert_eq!(event_type, "Shipped");
                assert_eq!(stream, "orders");
                assert_eq!(revision, 3);
            }
            other => panic!("expected unrecognized type, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let registry = registry();
        let broken = recorded(
            EventData::binary("Created", Bytes::from_static(b"not json")).with_id(Uuid::nil()),
        );
        assert!(matches!(
            registry.decode(&broken).unwrap_err(),
            Error::Decode { .. }
        ));
    }

    #[test]
    fn test_event_types_sorted() {
        assert_eq!(registry().event_types(), vec!["Cancelled", "Created"]);
        assert!(registry().knows("Created"));
        assert!(!registry().knows("Shipped"));
    }
}
