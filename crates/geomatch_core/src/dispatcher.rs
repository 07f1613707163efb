//! Match dispatcher
//!
//! A single consumer loop over the request bus. Each search or visibility
//! event is answered with the candidates found within the dispatch radius;
//! messages are handled one at a time.

use crate::bus::{BusMessage, EventKind, SearchRequestEvent};
use crate::render::CardRenderer;
use crate::{CoreError, GeoIndex, RequestBus, Result, UserHandle};
use futures::StreamExt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Candidates found; `delivered` of them were rendered successfully.
    Delivered { found: usize, delivered: usize },
    NobodyNearby,
    Removed,
}

#[derive(Debug, Clone)]
pub struct MatchDispatcher {
    bus: Arc<dyn RequestBus>,
    geo: Arc<dyn GeoIndex>,
    cards: CardRenderer,
    radius_km: f64,
}

impl MatchDispatcher {
    pub fn new(
        bus: Arc<dyn RequestBus>,
        geo: Arc<dyn GeoIndex>,
        cards: CardRenderer,
        radius_km: f64,
    ) -> Self {
        Self {
            bus,
            geo,
            cards,
            radius_km,
        }
    }

    /// Consumes the bus until the subscription ends.
    ///
    /// Only a failure to subscribe is returned; everything after that is
    /// logged and the loop moves on to the next message.
    pub async fn run(&self) -> Result<()> {
        let mut stream = self.bus.subscribe().await?;
        tracing::info!(
            "Match dispatcher listening on {} (radius {} km)",
            self.bus.topic(),
            self.radius_km
        );

        while let Some(item) = stream.next().await {
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    crate::log_error!("Failed to read from request bus", e);
                    continue;
                }
            };

            match self.handle_message(&message).await {
                Ok(outcome) => tracing::debug!(
                    "Handled {} '{}': {:?}",
                    message.key,
                    message.payload,
                    outcome
                ),
                Err(e @ CoreError::MalformedPayload { .. }) => {
                    tracing::warn!("Dropping bus message: {}", e);
                }
                Err(e) => {
                    crate::log_error!(format!("Failed to dispatch {}", message.key), e);
                }
            }
        }

        tracing::info!("Request bus subscription closed, match dispatcher stopping");
        Ok(())
    }

    pub async fn handle_message(&self, message: &BusMessage) -> Result<DispatchOutcome> {
        let event = SearchRequestEvent::from_message(message)?;
        self.dispatch(&event).await
    }

    pub async fn dispatch(&self, event: &SearchRequestEvent) -> Result<DispatchOutcome> {
        let center = match (event.kind, event.location) {
            (EventKind::UserRemove, _) => {
                tracing::debug!("User {} left the index", event.user);
                return Ok(DispatchOutcome::Removed);
            }
            (_, Some(center)) => center,
            (kind, None) => {
                return Err(CoreError::malformed_payload(
                    kind.as_str(),
                    event.payload(),
                    "missing coordinate",
                ));
            }
        };

        let candidates = self
            .geo
            .find_nearby(event.user, center, self.radius_km)
            .await?;

        if candidates.is_empty() {
            self.cards.nobody_nearby(event.user).await?;
            return Ok(DispatchOutcome::NobodyNearby);
        }

        let delivered = self.deliver(event.user, &candidates).await;
        Ok(DispatchOutcome::Delivered {
            found: candidates.len(),
            delivered,
        })
    }

    async fn deliver(&self, to: UserHandle, candidates: &[UserHandle]) -> usize {
        let mut delivered = 0;
        for candidate in candidates {
            match self.cards.present_candidate(to, *candidate).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    crate::log_error!(format!("Failed to show {} to {}", candidate, to), e);
                }
            }
        }
        delivered
    }
}
