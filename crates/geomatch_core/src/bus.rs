//! Request bus carrying search and visibility events
//!
//! Messages are keyed by the event kind and carry a comma-joined payload:
//! `"{id},{lat},{lon}"` for `user_search`/`user_visibility` and `"{id}"` for
//! `user_remove`. There is no schema versioning.

use crate::{CoreError, Coordinate, Result, UserHandle};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

pub const DEFAULT_TOPIC: &str = "geo-match-search";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UserSearch,
    UserVisibility,
    UserRemove,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UserSearch => "user_search",
            EventKind::UserVisibility => "user_visibility",
            EventKind::UserRemove => "user_remove",
        }
    }

    pub fn parse(key: &str) -> Option<EventKind> {
        match key {
            "user_search" => Some(EventKind::UserSearch),
            "user_visibility" => Some(EventKind::UserVisibility),
            "user_remove" => Some(EventKind::UserRemove),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded bus event.
///
/// `location` is always present for search and visibility events and always
/// absent for removals; the constructors enforce this.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchRequestEvent {
    pub user: UserHandle,
    pub kind: EventKind,
    pub location: Option<Coordinate>,
}

impl SearchRequestEvent {
    pub fn search(user: UserHandle, location: Coordinate) -> Self {
        Self {
            user,
            kind: EventKind::UserSearch,
            location: Some(location),
        }
    }

    pub fn visibility(user: UserHandle, location: Coordinate) -> Self {
        Self {
            user,
            kind: EventKind::UserVisibility,
            location: Some(location),
        }
    }

    pub fn remove(user: UserHandle) -> Self {
        Self {
            user,
            kind: EventKind::UserRemove,
            location: None,
        }
    }

    pub fn payload(&self) -> String {
        match self.location {
            Some(c) => format!("{},{},{}", self.user, c.latitude, c.longitude),
            None => self.user.to_string(),
        }
    }

    pub fn to_message(&self, topic: &str) -> BusMessage {
        BusMessage {
            topic: topic.to_string(),
            key: self.kind.as_str().to_string(),
            payload: self.payload(),
        }
    }

    pub fn from_message(message: &BusMessage) -> Result<Self> {
        Self::decode(&message.key, &message.payload)
    }

    pub fn decode(key: &str, payload: &str) -> Result<Self> {
        let kind = EventKind::parse(key)
            .ok_or_else(|| CoreError::malformed_payload(key, payload, "unknown event kind"))?;
        let bad = |reason: &str| CoreError::malformed_payload(key, payload, reason);

        let parts: Vec<&str> = payload.split(',').map(str::trim).collect();
        let user = parts
            .first()
            .and_then(|raw| raw.parse::<UserHandle>().ok())
            .ok_or_else(|| bad("user id is not an integer"))?;

        match kind {
            EventKind::UserRemove => {
                if parts.len() != 1 {
                    return Err(bad("expected a single field"));
                }
                Ok(Self::remove(user))
            }
            EventKind::UserSearch | EventKind::UserVisibility => {
                if parts.len() != 3 {
                    return Err(bad("expected three fields"));
                }
                let latitude: f64 = parts[1]
                    .parse()
                    .map_err(|_| bad("latitude is not a number"))?;
                let longitude: f64 = parts[2]
                    .parse()
                    .map_err(|_| bad("longitude is not a number"))?;
                Ok(Self {
                    user,
                    kind,
                    location: Some(Coordinate::new(latitude, longitude)),
                })
            }
        }
    }
}

/// Raw message as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: String,
    pub key: String,
    pub payload: String,
}

pub type BusStream = Pin<Box<dyn Stream<Item = Result<BusMessage>> + Send>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestBus: Send + Sync + fmt::Debug {
    fn topic(&self) -> &str;

    async fn publish(&self, event: &SearchRequestEvent) -> Result<()>;

    /// Opens a subscription on the topic. Failure here is fatal for the
    /// consumer that asked for it.
    async fn subscribe(&self) -> Result<BusStream>;
}

/// Bus living inside the process, backed by a tokio broadcast channel.
///
/// Messages published while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct InProcessBus {
    topic: String,
    tx: broadcast::Sender<BusMessage>,
}

impl InProcessBus {
    pub fn new(topic: impl Into<String>, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            topic: topic.into(),
            tx,
        }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC, 256)
    }
}

#[async_trait]
impl RequestBus for InProcessBus {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, event: &SearchRequestEvent) -> Result<()> {
        let message = event.to_message(&self.topic);
        tracing::debug!(
            "Publishing {} '{}' on {}",
            message.key,
            message.payload,
            self.topic
        );
        if self.tx.send(message).is_err() {
            tracing::warn!(
                "No subscribers on {}, dropped {} for {}",
                self.topic,
                event.kind,
                event.user
            );
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<BusStream> {
        let topic = self.topic.clone();
        let stream = BroadcastStream::new(self.tx.subscribe()).map(move |item| {
            item.map_err(|e| CoreError::BusReceiveFailed {
                topic: topic.clone(),
                cause: Box::new(e),
            })
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn payloads_use_wire_format() {
        let search = SearchRequestEvent::search(UserHandle(12), Coordinate::new(55.5, 37.25));
        assert_eq!(search.payload(), "12,55.5,37.25");
        assert_eq!(search.to_message("t").key, "user_search");

        let remove = SearchRequestEvent::remove(UserHandle(12));
        assert_eq!(remove.payload(), "12");
        assert_eq!(remove.to_message("t").key, "user_remove");
    }

    #[test]
    fn decode_accepts_what_encode_produces() {
        let event = SearchRequestEvent::visibility(UserHandle(-3), Coordinate::new(-33.8688, 151.2093));
        let message = event.to_message(DEFAULT_TOPIC);
        assert_eq!(SearchRequestEvent::from_message(&message).unwrap(), event);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        for (key, payload) in [
            ("user_search", "12,abc,3"),
            ("user_search", "12,1"),
            ("user_search", "x,1,2"),
            ("user_remove", "12,1,2"),
            ("user_remove", ""),
            ("user_teleport", "12"),
        ] {
            let err = SearchRequestEvent::decode(key, payload).unwrap_err();
            assert!(
                matches!(err, CoreError::MalformedPayload { .. }),
                "{key} {payload}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn in_process_bus_delivers_to_subscribers() {
        let bus = InProcessBus::new("geo-test", 8);
        let mut first = bus.subscribe().await.unwrap();
        let mut second = bus.subscribe().await.unwrap();

        bus.publish(&SearchRequestEvent::remove(UserHandle(4)))
            .await
            .unwrap();

        let expected = BusMessage {
            topic: "geo-test".to_string(),
            key: "user_remove".to_string(),
            payload: "4".to_string(),
        };
        assert_eq!(first.next().await.unwrap().unwrap(), expected);
        assert_eq!(second.next().await.unwrap().unwrap(), expected);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = InProcessBus::default();
        bus.publish(&SearchRequestEvent::remove(UserHandle(1)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn lagging_subscriber_sees_receive_error() {
        let bus = InProcessBus::new("geo-test", 1);
        let mut stream = bus.subscribe().await.unwrap();
        for id in 0..3 {
            bus.publish(&SearchRequestEvent::remove(UserHandle(id)))
                .await
                .unwrap();
        }
        assert!(matches!(
            stream.next().await,
            Some(Err(CoreError::BusReceiveFailed { .. }))
        ));
        // the stream keeps going after a lag
        assert_eq!(stream.next().await.unwrap().unwrap().payload, "2");
    }
}
