//! Request bus on a `bus_message` table
//!
//! Publishing creates a record; subscribers follow the table with a live
//! query and see every record created after they subscribed. A record is
//! deleted once a subscriber has picked it up. Records still in the table
//! when a subscriber starts (published while nobody was listening) are
//! delivered to it first, oldest first.

use crate::bus::{BusMessage, BusStream, SearchRequestEvent};
use crate::db::Db;
use crate::{CoreError, RequestBus, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use surrealdb::{Notification, RecordId};

const TABLE: &str = "bus_message";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BusRecord {
    #[serde(default, skip_serializing)]
    id: Option<RecordId>,
    topic: String,
    key: String,
    payload: String,
    published_at: DateTime<Utc>,
}

impl BusRecord {
    fn into_message(self) -> BusMessage {
        BusMessage {
            topic: self.topic,
            key: self.key,
            payload: self.payload,
        }
    }
}

async fn prune(db: &Db, id: RecordId) {
    let deleted: std::result::Result<Option<BusRecord>, _> = db.delete(id).await;
    if let Err(e) = deleted {
        tracing::warn!("Failed to prune consumed bus record: {}", e);
    }
}

#[derive(Debug, Clone)]
pub struct SurrealBus {
    db: Db,
    topic: String,
}

impl SurrealBus {
    pub fn new(db: Db, topic: impl Into<String>) -> Self {
        Self {
            db,
            topic: topic.into(),
        }
    }

    /// Removes and returns the records already waiting on this topic.
    async fn take_backlog(&self) -> Result<Vec<BusRecord>> {
        let subscription_failed = |e: surrealdb::Error| CoreError::BusSubscriptionFailed {
            topic: self.topic.clone(),
            cause: Box::new(e),
        };
        let mut response = self
            .db
            .query("SELECT * FROM bus_message WHERE topic = $topic ORDER BY published_at ASC")
            .bind(("topic", self.topic.clone()))
            .await
            .map_err(subscription_failed)?;
        let records: Vec<BusRecord> = response.take(0).map_err(subscription_failed)?;

        for id in records.iter().filter_map(|r| r.id.clone()) {
            prune(&self.db, id).await;
        }
        Ok(records)
    }
}

#[async_trait]
impl RequestBus for SurrealBus {
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
        let _: Option<BusRecord> = self
            .db
            .create(TABLE)
            .content(BusRecord {
                id: None,
                topic: message.topic,
                key: message.key,
                payload: message.payload,
                published_at: Utc::now(),
            })
            .await
            .map_err(|e| CoreError::bus_publish(&self.topic, event.kind.as_str(), e))?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<BusStream> {
        // live query first, so nothing created during the backlog read is lost
        let live = self
            .db
            .select::<Vec<BusRecord>>(TABLE)
            .live()
            .await
            .map_err(|e| CoreError::BusSubscriptionFailed {
                topic: self.topic.clone(),
                cause: Box::new(e),
            })?;
        let backlog = self.take_backlog().await?;
        if backlog.is_empty() {
            tracing::info!("Subscribed to {} via live query", self.topic);
        } else {
            tracing::info!(
                "Subscribed to {} via live query, {} earlier messages pending",
                self.topic,
                backlog.len()
            );
        }

        // the live query can also report records that were in the backlog
        let delivered: Arc<HashSet<String>> = Arc::new(
            backlog
                .iter()
                .filter_map(|r| r.id.as_ref().map(|id| id.to_string()))
                .collect(),
        );
        let pending = futures::stream::iter(
            backlog
                .into_iter()
                .map(|record| Ok(record.into_message())),
        );

        let topic = self.topic.clone();
        let db = self.db.clone();
        let live = live.filter_map(move |item: surrealdb::Result<Notification<BusRecord>>| {
            let topic = topic.clone();
            let db = db.clone();
            let delivered = delivered.clone();
            async move {
                let notification = match item {
                    Ok(notification) => notification,
                    Err(e) => {
                        return Some(Err(CoreError::BusReceiveFailed {
                            topic,
                            cause: Box::new(e),
                        }));
                    }
                };
                if !matches!(notification.action, surrealdb::Action::Create) {
                    return None;
                }
                let record = notification.data;
                if record.topic != topic {
                    return None;
                }
                if let Some(id) = record.id.clone() {
                    if delivered.contains(&id.to_string()) {
                        return None;
                    }
                    prune(&db, id).await;
                }
                Some(Ok(record.into_message()))
            }
        });
        Ok(Box::pin(pending.chain(live)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::client::create_test_db;
    use crate::{Coordinate, UserHandle};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let db = create_test_db().await.unwrap();
        let bus = SurrealBus::new(db.clone(), "geo-match-search");
        let other_topic = SurrealBus::new(db, "elsewhere");

        let mut stream = bus.subscribe().await.unwrap();

        other_topic
            .publish(&SearchRequestEvent::remove(UserHandle(1)))
            .await
            .unwrap();
        bus.publish(&SearchRequestEvent::search(
            UserHandle(2),
            Coordinate::new(55.75, 37.61),
        ))
        .await
        .unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(message.key, "user_search");
        assert_eq!(message.payload, "2,55.75,37.61");
        assert_eq!(
            SearchRequestEvent::from_message(&message).unwrap().user,
            UserHandle(2)
        );
    }

    #[tokio::test]
    async fn messages_published_before_subscribing_are_delivered() {
        let db = create_test_db().await.unwrap();
        let bus = SurrealBus::new(db.clone(), "geo-match-search");
        let other_topic = SurrealBus::new(db.clone(), "elsewhere");

        other_topic
            .publish(&SearchRequestEvent::remove(UserHandle(9)))
            .await
            .unwrap();
        bus.publish(&SearchRequestEvent::visibility(
            UserHandle(3),
            Coordinate::new(48.85, 2.35),
        ))
        .await
        .unwrap();

        let mut stream = bus.subscribe().await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first.key, "user_visibility");
        assert_eq!(first.payload, "3,48.85,2.35");

        bus.publish(&SearchRequestEvent::remove(UserHandle(4)))
            .await
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.key, "user_remove");
        assert_eq!(second.payload, "4");

        // the backlog was consumed, the other topic's record was left alone
        let mut response = db
            .query("SELECT * FROM bus_message WHERE topic = $topic")
            .bind(("topic", "geo-match-search"))
            .await
            .unwrap();
        let remaining: Vec<BusRecord> = response.take(0).unwrap();
        assert!(remaining.iter().all(|r| r.payload != "3,48.85,2.35"));

        let mut response = db
            .query("SELECT * FROM bus_message WHERE topic = $topic")
            .bind(("topic", "elsewhere"))
            .await
            .unwrap();
        let untouched: Vec<BusRecord> = response.take(0).unwrap();
        assert_eq!(untouched.len(), 1);
    }
}
