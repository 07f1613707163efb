//! Visibility coordination across the geo index, request bus and session
//! store
//!
//! Enabling visibility writes the index, then publishes, then flips the
//! session flag; disabling removes, publishes, then flips. A failing step
//! stops the sequence and earlier steps stay applied. Every step is
//! idempotent, so repeating the whole operation converges.

use crate::bus::SearchRequestEvent;
use crate::{
    ConversationTracker, CoreError, Coordinate, GeoIndex, RequestBus, Result, SessionKey,
    SessionStore, Step, UserHandle,
};
use std::sync::Arc;

const VISIBLE: &str = "true";
const HIDDEN: &str = "false";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnableOutcome {
    Enabled(Coordinate),
    /// No usable fix is stored; the user was moved to
    /// [`Step::SetLocationForVisibility`] and nothing was published.
    LocationRequired,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToggleOutcome {
    Enabled(Coordinate),
    LocationRequired,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct VisibilityCoordinator {
    geo: Arc<dyn GeoIndex>,
    bus: Arc<dyn RequestBus>,
    sessions: Arc<dyn SessionStore>,
    tracker: ConversationTracker,
}

impl VisibilityCoordinator {
    pub fn new(
        geo: Arc<dyn GeoIndex>,
        bus: Arc<dyn RequestBus>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let tracker = ConversationTracker::new(sessions.clone());
        Self {
            geo,
            bus,
            sessions,
            tracker,
        }
    }

    pub async fn enable_visibility(&self, user: UserHandle) -> Result<EnableOutcome> {
        let stored = match self.geo.get_user_location(user).await {
            Ok(coordinate) if coordinate.is_valid() => Some(coordinate),
            Ok(coordinate) => {
                tracing::debug!("Stored location {} for {} is not usable", coordinate, user);
                None
            }
            Err(CoreError::LocationNotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        match stored {
            Some(coordinate) => {
                self.complete_enable(user, coordinate).await?;
                Ok(EnableOutcome::Enabled(coordinate))
            }
            None => {
                self.tracker
                    .set_state(user, Step::SetLocationForVisibility)
                    .await?;
                Ok(EnableOutcome::LocationRequired)
            }
        }
    }

    /// Finishes a pending enable once the user has sent a location.
    ///
    /// An unusable fix leaves the user waiting in
    /// [`Step::SetLocationForVisibility`].
    pub async fn complete_enable_with_location(
        &self,
        user: UserHandle,
        coordinate: Coordinate,
    ) -> Result<EnableOutcome> {
        if !coordinate.is_valid() {
            return Ok(EnableOutcome::LocationRequired);
        }
        self.complete_enable(user, coordinate).await?;
        self.tracker.clear_state(user).await?;
        Ok(EnableOutcome::Enabled(coordinate))
    }

    async fn complete_enable(&self, user: UserHandle, coordinate: Coordinate) -> Result<()> {
        self.geo.add_user_location(user, coordinate).await?;
        self.bus
            .publish(&SearchRequestEvent::visibility(user, coordinate))
            .await?;
        self.set_flag(user, VISIBLE).await?;
        tracing::info!("User {} is now visible at {}", user, coordinate);
        Ok(())
    }

    pub async fn disable_visibility(&self, user: UserHandle) -> Result<()> {
        self.geo.remove_user_location(user).await?;
        self.bus.publish(&SearchRequestEvent::remove(user)).await?;
        self.set_flag(user, HIDDEN).await?;
        tracing::info!("User {} is now hidden", user);
        Ok(())
    }

    /// Reads the visibility flag. A missing flag is written as hidden.
    pub async fn is_visible(&self, user: UserHandle) -> Result<bool> {
        let key = SessionKey::Visibility(user).to_string();
        match self.sessions.get(&key).await? {
            Some(flag) => Ok(flag == VISIBLE),
            None => {
                self.sessions.set(&key, HIDDEN).await?;
                Ok(false)
            }
        }
    }

    /// Brings the visibility flag in line with geo index membership, which
    /// is what matching reads. Returns whether the user is visible.
    ///
    /// Never publishes; it only repairs a flag left behind by a sequence
    /// that stopped halfway.
    pub async fn reconcile(&self, user: UserHandle) -> Result<bool> {
        let indexed = match self.geo.get_user_location(user).await {
            Ok(_) => true,
            Err(CoreError::LocationNotFound { .. }) => false,
            Err(e) => return Err(e),
        };
        let expected = if indexed { VISIBLE } else { HIDDEN };

        let key = SessionKey::Visibility(user).to_string();
        let flag = self.sessions.get(&key).await?;
        if flag.as_deref() != Some(expected) {
            if let Some(flag) = flag {
                tracing::warn!(
                    "Visibility flag '{}' for {} disagreed with the geo index, set to '{}'",
                    flag,
                    user,
                    expected
                );
            }
            self.sessions.set(&key, expected).await?;
        }
        Ok(indexed)
    }

    pub async fn toggle_visibility(&self, user: UserHandle) -> Result<ToggleOutcome> {
        if self.is_visible(user).await? {
            self.disable_visibility(user).await?;
            return Ok(ToggleOutcome::Disabled);
        }
        Ok(match self.enable_visibility(user).await? {
            EnableOutcome::Enabled(coordinate) => ToggleOutcome::Enabled(coordinate),
            EnableOutcome::LocationRequired => ToggleOutcome::LocationRequired,
        })
    }

    /// Asks the match dispatcher to look around `coordinate` for `user`.
    pub async fn request_search(&self, user: UserHandle, coordinate: Coordinate) -> Result<()> {
        self.bus
            .publish(&SearchRequestEvent::search(user, coordinate))
            .await
    }

    async fn set_flag(&self, user: UserHandle, value: &str) -> Result<()> {
        self.sessions
            .set(&SessionKey::Visibility(user).to_string(), value)
            .await
    }
}
