use super::onboarding::text_of;
use super::{UpdateHandler, commands::VISIBILITY_ON, prompt};
use crate::coordinator::EnableOutcome;
use crate::profile::Gender;
use crate::transport::InboundKind;
use crate::validation::{parse_age_range, validate_location};
use crate::{Coordinate, CoreError, Result, SessionKey, Step, UserHandle};

const SEARCH_STARTED: &str = "Looking for people nearby. Results will arrive shortly.";

/// Reads a `search_location` value written by [`UpdateHandler::save_search_location`].
fn parse_stored_location(raw: &str) -> Option<Coordinate> {
    let (lat, lon) = raw.split_once(',')?;
    let coordinate = Coordinate::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?);
    coordinate.is_valid().then_some(coordinate)
}

impl UpdateHandler {
    /// `/search`: asks for the filters first.
    pub(super) async fn start_search_filters(&self, user: UserHandle) -> Result<()> {
        self.tracker.set_state(user, Step::SearchGender).await?;
        self.transport
            .send_text(user, prompt(Step::SearchGender))
            .await
    }

    /// The "find people" button: goes straight to the location question.
    pub(super) async fn start_search_at_location(&self, user: UserHandle) -> Result<()> {
        self.tracker.set_state(user, Step::SearchLocation).await?;
        self.transport
            .send_text(
                user,
                &format!("Starting a search. {}", prompt(Step::SearchLocation)),
            )
            .await
    }

    pub(super) async fn save_search_gender(
        &self,
        user: UserHandle,
        kind: &InboundKind,
    ) -> Result<()> {
        let Some(text) = text_of(kind) else {
            return self.reprompt(user, Step::SearchGender, None).await;
        };
        let gender = match Gender::parse(text) {
            Ok(gender) => gender,
            Err(e) => return self.reprompt(user, Step::SearchGender, Some(&e)).await,
        };
        self.sessions
            .set(&SessionKey::SearchGender(user).to_string(), gender.as_str())
            .await?;
        self.tracker.set_state(user, Step::SearchAge).await?;
        self.transport.send_text(user, prompt(Step::SearchAge)).await
    }

    pub(super) async fn save_search_age(&self, user: UserHandle, kind: &InboundKind) -> Result<()> {
        let Some(text) = text_of(kind) else {
            return self.reprompt(user, Step::SearchAge, None).await;
        };
        let range = match parse_age_range(text) {
            Ok(range) => range,
            Err(e) => return self.reprompt(user, Step::SearchAge, Some(&e)).await,
        };
        self.sessions
            .set(&SessionKey::SearchAge(user).to_string(), &range.to_string())
            .await?;
        self.tracker.set_state(user, Step::SearchLocation).await?;
        self.transport
            .send_text(user, prompt(Step::SearchLocation))
            .await
    }

    pub(super) async fn save_search_location(
        &self,
        user: UserHandle,
        kind: &InboundKind,
    ) -> Result<()> {
        let InboundKind::Location(coordinate) = kind else {
            return self.reprompt(user, Step::SearchLocation, None).await;
        };
        let coordinate = match validate_location(*coordinate) {
            Ok(coordinate) => coordinate,
            Err(e) => return self.reprompt(user, Step::SearchLocation, Some(&e)).await,
        };

        // hidden users stay out of the index; the session copy serves "next"
        if self.coordinator.is_visible(user).await? {
            self.geo.add_user_location(user, coordinate).await?;
        }
        self.sessions
            .set(
                &SessionKey::SearchLocation(user).to_string(),
                &format!("{},{}", coordinate.latitude, coordinate.longitude),
            )
            .await?;
        self.coordinator.request_search(user, coordinate).await?;
        self.tracker.clear_state(user).await?;
        self.transport.send_text(user, SEARCH_STARTED).await
    }

    pub(super) async fn save_visibility_location(
        &self,
        user: UserHandle,
        kind: &InboundKind,
    ) -> Result<()> {
        let InboundKind::Location(coordinate) = kind else {
            return self
                .reprompt(user, Step::SetLocationForVisibility, None)
                .await;
        };
        match self
            .coordinator
            .complete_enable_with_location(user, *coordinate)
            .await?
        {
            EnableOutcome::Enabled(_) => self.transport.send_text(user, VISIBILITY_ON).await,
            EnableOutcome::LocationRequired => {
                let problem = validate_location(*coordinate).err();
                self.reprompt(user, Step::SetLocationForVisibility, problem.as_ref())
                    .await
            }
        }
    }

    /// Where "next" searches from: the indexed location, or for hidden
    /// users the coordinate of their last search.
    async fn search_center(&self, user: UserHandle) -> Result<Option<Coordinate>> {
        match self.geo.get_user_location(user).await {
            Ok(center) => Ok(Some(center)),
            Err(CoreError::LocationNotFound { .. }) => {
                let stored = self
                    .sessions
                    .get(&SessionKey::SearchLocation(user).to_string())
                    .await?;
                Ok(stored.as_deref().and_then(parse_stored_location))
            }
            Err(e) => Err(e),
        }
    }

    /// Shows the nearest candidate within the on-demand radius.
    ///
    /// Candidates already shown are not skipped, so repeated calls can show
    /// the same person again.
    pub async fn search_next_user(&self, user: UserHandle) -> Result<()> {
        let Some(center) = self.search_center(user).await? else {
            return self
                .transport
                .send_text(
                    user,
                    &format!(
                        "We don't know where you are yet. Use {}search and share your location.",
                        self.prefix
                    ),
                )
                .await;
        };

        let nearby = self
            .geo
            .find_nearby(user, center, self.on_demand_radius_km)
            .await?;
        match nearby.first() {
            Some(candidate) => self.cards.present_candidate(user, *candidate).await,
            None => self.cards.nobody_nearby(user).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bus::SearchRequestEvent;
    use crate::geo::tests::north_of;
    use crate::handlers::tests::Harness;
    use crate::profile::NewUser;
    use crate::render::NOBODY_NEARBY;
    use crate::test_helpers::Sent;
    use crate::transport::{CallbackAction, InboundKind};
    use crate::{Coordinate, GeoIndex, ProfileRepository, SessionStore, Step, UserHandle};
    use pretty_assertions::assert_eq;

    const HOME: Coordinate = Coordinate::new(52.52, 13.405);

    #[tokio::test]
    async fn search_flow_collects_filters_then_publishes() {
        let h = Harness::new();
        h.command(1, "search").await;
        assert_eq!(h.state(1).await, Some(Step::SearchGender));

        h.text(1, "m").await;
        assert_eq!(h.state(1).await, Some(Step::SearchAge));
        assert_eq!(
            h.sessions.get("search_gender:1").await.unwrap().as_deref(),
            Some("male")
        );

        h.text(1, "30-20").await;
        assert_eq!(h.state(1).await, Some(Step::SearchAge));
        h.text(1, "20-30").await;
        assert_eq!(h.state(1).await, Some(Step::SearchLocation));
        assert_eq!(
            h.sessions.get("search_age:1").await.unwrap().as_deref(),
            Some("20-30")
        );

        h.text(1, "somewhere").await;
        assert_eq!(h.state(1).await, Some(Step::SearchLocation));

        h.send(1, InboundKind::Location(HOME)).await;
        assert_eq!(h.state(1).await, None);
        assert_eq!(h.bus.published(), vec![SearchRequestEvent::search(UserHandle(1), HOME)]);
        // hidden searchers are not written to the index
        assert!(!h.geo.contains(UserHandle(1)));
        assert_eq!(
            h.sessions.get("search_location:1").await.unwrap().as_deref(),
            Some("52.52,13.405")
        );
    }

    #[tokio::test]
    async fn hidden_searcher_can_ask_for_next() {
        let h = Harness::new();
        h.profiles
            .create_user(NewUser {
                handle: UserHandle(2),
                first_name: "n2".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        h.geo
            .add_user_location(UserHandle(2), north_of(HOME, 3.0))
            .await
            .unwrap();

        h.callback(1, "start_search").await;
        h.send(1, InboundKind::Location(HOME)).await;
        assert!(!h.geo.contains(UserHandle(1)));

        h.callback(1, "search_next").await;
        let sent = h.transport.sent_to(UserHandle(1));
        let Some(Sent::Message(card)) = sent.last() else {
            panic!("expected a card, got {:?}", sent.last());
        };
        assert_eq!(
            card.actions().next(),
            Some(CallbackAction::Connect(UserHandle(2)))
        );
    }

    #[test]
    fn stored_search_location_parsing() {
        assert_eq!(
            super::parse_stored_location("52.52,13.405"),
            Some(Coordinate::new(52.52, 13.405))
        );
        assert_eq!(super::parse_stored_location("0,0"), None);
        assert_eq!(super::parse_stored_location("north"), None);
    }

    #[tokio::test]
    async fn visible_searcher_location_is_refreshed() {
        let h = Harness::new();
        h.handler
            .coordinator
            .complete_enable_with_location(UserHandle(1), north_of(HOME, 20.0))
            .await
            .unwrap();

        h.callback(1, "start_search").await;
        assert_eq!(h.state(1).await, Some(Step::SearchLocation));
        h.send(1, InboundKind::Location(HOME)).await;

        assert_eq!(h.geo.get_user_location(UserHandle(1)).await.unwrap(), HOME);
    }

    #[tokio::test]
    async fn visibility_location_completes_enable() {
        let h = Harness::new();
        h.command(1, "toggle_visibility").await;
        assert_eq!(h.state(1).await, Some(Step::SetLocationForVisibility));

        h.send(1, InboundKind::Location(Coordinate::new(0.0, 0.0))).await;
        assert_eq!(h.state(1).await, Some(Step::SetLocationForVisibility));
        assert!(h.bus.published().is_empty());

        h.send(1, InboundKind::Location(HOME)).await;
        assert_eq!(h.state(1).await, None);
        assert_eq!(
            h.bus.published(),
            vec![SearchRequestEvent::visibility(UserHandle(1), HOME)]
        );
        assert_eq!(
            h.sessions.get("visibility:1").await.unwrap().as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn search_next_shows_nearest_only() {
        let h = Harness::new();
        h.geo.add_user_location(UserHandle(1), HOME).await.unwrap();
        for (handle, km) in [(2, 8.0), (3, 2.0), (4, 12.0)] {
            h.profiles
                .create_user(NewUser {
                    handle: UserHandle(handle),
                    first_name: format!("n{handle}"),
                    ..Default::default()
                })
                .await
                .unwrap();
            h.geo
                .add_user_location(UserHandle(handle), north_of(HOME, km))
                .await
                .unwrap();
        }

        h.callback(1, "search_next").await;
        let sent = h.transport.sent_to(UserHandle(1));
        assert_eq!(sent.len(), 1);
        let Sent::Message(card) = &sent[0] else {
            panic!("expected a card, got {:?}", sent[0]);
        };
        assert_eq!(
            card.actions().next(),
            Some(CallbackAction::Connect(UserHandle(3)))
        );
    }

    #[tokio::test]
    async fn search_next_without_neighbours() {
        let h = Harness::new();
        h.geo.add_user_location(UserHandle(1), HOME).await.unwrap();
        h.callback(1, "search_next").await;
        assert_eq!(h.last_text(1), NOBODY_NEARBY);
    }

    #[tokio::test]
    async fn search_next_without_location_asks_to_search() {
        let h = Harness::new();
        h.callback(1, "search_next").await;
        assert!(h.last_text(1).contains("/search"));
    }
}
