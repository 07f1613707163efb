#![cfg(test)]

use crate::bus::{BusStream, InProcessBus, SearchRequestEvent};
use crate::transport::OutboundMessage;
use crate::{ChatTransport, RequestBus, Result, UserHandle};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Photo(String),
    Message(OutboundMessage),
}

impl Sent {
    /// Text content, empty for photos.
    pub fn text(&self) -> &str {
        match self {
            Sent::Text(text) => text,
            Sent::Message(message) => &message.text,
            Sent::Photo(_) => "",
        }
    }
}

/// Transport that keeps everything it was asked to send.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(UserHandle, Sent)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_to(&self, user: UserHandle) -> Vec<Sent> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| *to == user)
            .map(|(_, sent)| sent.clone())
            .collect()
    }

    pub fn last_to(&self, user: UserHandle) -> Option<Sent> {
        self.sent_to(user).pop()
    }

    /// Whether any text sent to `user` contains `needle`.
    pub fn saw(&self, user: UserHandle, needle: &str) -> bool {
        self.sent_to(user).iter().any(|s| s.text().contains(needle))
    }

    pub fn total(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_text(&self, user: UserHandle, text: &str) -> Result<()> {
        self.sent.lock().push((user, Sent::Text(text.to_string())));
        Ok(())
    }

    async fn send_photo(&self, user: UserHandle, file_ref: &str) -> Result<()> {
        self.sent
            .lock()
            .push((user, Sent::Photo(file_ref.to_string())));
        Ok(())
    }

    async fn send_message(&self, user: UserHandle, message: OutboundMessage) -> Result<()> {
        self.sent.lock().push((user, Sent::Message(message)));
        Ok(())
    }
}

/// In-process bus that also remembers what was published.
#[derive(Debug, Default)]
pub struct RecordingBus {
    inner: InProcessBus,
    published: Mutex<Vec<SearchRequestEvent>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<SearchRequestEvent> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl RequestBus for RecordingBus {
    fn topic(&self) -> &str {
        self.inner.topic()
    }

    async fn publish(&self, event: &SearchRequestEvent) -> Result<()> {
        self.published.lock().push(*event);
        self.inner.publish(event).await
    }

    async fn subscribe(&self) -> Result<BusStream> {
        self.inner.subscribe().await
    }
}
