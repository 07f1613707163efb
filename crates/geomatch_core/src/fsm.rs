//! Conversation tracker
//!
//! Two flows share the `state:{id}` key and never interleave for one user:
//! onboarding (`TitleName` through `Photo`) and search filters
//! (`SearchGender` through `SearchLocation`). `SetLocationForVisibility` is a
//! single-step flow used while enabling visibility.

use crate::{Result, SessionKey, SessionStore, UserHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    TitleName,
    Gender,
    Age,
    Bio,
    Photo,
    SearchGender,
    SearchAge,
    SearchLocation,
    SetLocationForVisibility,
}

impl Step {
    pub const ALL: [Step; 9] = [
        Step::TitleName,
        Step::Gender,
        Step::Age,
        Step::Bio,
        Step::Photo,
        Step::SearchGender,
        Step::SearchAge,
        Step::SearchLocation,
        Step::SetLocationForVisibility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::TitleName => "title_name",
            Step::Gender => "gender",
            Step::Age => "age",
            Step::Bio => "bio",
            Step::Photo => "photo",
            Step::SearchGender => "search_gender",
            Step::SearchAge => "search_age",
            Step::SearchLocation => "search_location",
            Step::SetLocationForVisibility => "set_location_for_visibility",
        }
    }

    pub fn parse(tag: &str) -> Option<Step> {
        Step::ALL.into_iter().find(|step| step.as_str() == tag)
    }

    /// Onboarding transition table. Every other step has no successor.
    pub fn successor(&self) -> Option<Step> {
        match self {
            Step::TitleName => Some(Step::Gender),
            Step::Gender => Some(Step::Age),
            Step::Age => Some(Step::Bio),
            Step::Bio => Some(Step::Photo),
            _ => None,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads and advances each user's conversation step.
#[derive(Debug, Clone)]
pub struct ConversationTracker {
    store: Arc<dyn SessionStore>,
}

impl ConversationTracker {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn set_state(&self, user: UserHandle, step: Step) -> Result<()> {
        tracing::debug!("User {} -> {}", user, step);
        self.store
            .set(&SessionKey::State(user).to_string(), step.as_str())
            .await
    }

    /// Current step, or `None` when idle. Unrecognised tags read as idle.
    pub async fn get_state(&self, user: UserHandle) -> Result<Option<Step>> {
        let key = SessionKey::State(user).to_string();
        let Some(tag) = self.store.get(&key).await? else {
            return Ok(None);
        };
        if tag.is_empty() {
            return Ok(None);
        }
        let step = Step::parse(&tag);
        if step.is_none() {
            tracing::warn!("Unknown state tag '{}' stored for user {}", tag, user);
        }
        Ok(step)
    }

    pub async fn clear_state(&self, user: UserHandle) -> Result<()> {
        tracing::debug!("User {} -> idle", user);
        self.store.delete(&SessionKey::State(user).to_string()).await
    }

    /// Moves the user to the successor of their current onboarding step.
    ///
    /// Returns `None` without touching storage when the current step has no
    /// successor, the user is idle or the stored tag is unknown.
    pub async fn next_step(&self, user: UserHandle) -> Result<Option<Step>> {
        let Some(next) = self.get_state(user).await?.and_then(|s| s.successor()) else {
            return Ok(None);
        };
        self.set_state(user, next).await?;
        Ok(Some(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySessionStore;
    use pretty_assertions::assert_eq;

    fn tracker() -> (Arc<MemorySessionStore>, ConversationTracker) {
        let store = Arc::new(MemorySessionStore::new());
        (store.clone(), ConversationTracker::new(store))
    }

    #[test]
    fn tags_round_trip() {
        for step in Step::ALL {
            assert_eq!(Step::parse(step.as_str()), Some(step));
        }
        assert_eq!(Step::parse("nonsense"), None);
    }

    #[tokio::test]
    async fn onboarding_walks_the_table() {
        let (_, tracker) = tracker();
        let user = UserHandle(1);
        tracker.set_state(user, Step::TitleName).await.unwrap();

        let mut seen = vec![];
        while let Some(step) = tracker.next_step(user).await.unwrap() {
            seen.push(step);
        }
        assert_eq!(seen, vec![Step::Gender, Step::Age, Step::Bio, Step::Photo]);
        assert_eq!(tracker.get_state(user).await.unwrap(), Some(Step::Photo));
    }

    #[tokio::test]
    async fn next_step_without_successor_leaves_state() {
        let (store, tracker) = tracker();
        let user = UserHandle(2);

        for step in [
            Step::Photo,
            Step::SearchGender,
            Step::SearchAge,
            Step::SearchLocation,
            Step::SetLocationForVisibility,
        ] {
            tracker.set_state(user, step).await.unwrap();
            assert_eq!(tracker.next_step(user).await.unwrap(), None);
            assert_eq!(tracker.get_state(user).await.unwrap(), Some(step));
        }

        store.set("state:2", "mystery").await.unwrap();
        assert_eq!(tracker.next_step(user).await.unwrap(), None);
        assert_eq!(
            store.get("state:2").await.unwrap().as_deref(),
            Some("mystery")
        );

        tracker.clear_state(user).await.unwrap();
        assert_eq!(tracker.next_step(user).await.unwrap(), None);
        assert_eq!(store.get("state:2").await.unwrap(), None);
    }
}
