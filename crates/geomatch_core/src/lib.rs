//! Geomatch Core - session tracking and match dispatch
//!
//! This crate holds everything the bot needs apart from the chat platform
//! itself: the per-user conversation tracker, the geographic visibility
//! index, the search-request bus and the dispatcher that answers it, plus
//! the message-routing layer that ties them together.

pub mod bus;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod fsm;
pub mod geo;
pub mod handlers;
pub mod id;
pub mod menu;
pub mod profile;
pub mod render;
pub mod session;
pub mod transport;
pub mod utils;
pub mod validation;

mod test_helpers;

// Macros are automatically available at crate root due to #[macro_export]

pub use bus::{BusMessage, EventKind, InProcessBus, RequestBus, SearchRequestEvent};
pub use config::GeomatchConfig;
pub use coordinator::{EnableOutcome, ToggleOutcome, VisibilityCoordinator};
pub use dispatcher::MatchDispatcher;
pub use error::{CoreError, Result};
pub use fsm::{ConversationTracker, Step};
pub use geo::{Coordinate, GeoIndex, MemoryGeoIndex};
pub use handlers::{UpdateHandler, UpdateHandlerBuilder};
pub use id::UserHandle;
pub use menu::{CommandTable, MenuRenderer, MenuStyle};
pub use profile::{Gender, MemoryProfileRepository, ProfileRepository, UserProfile};
pub use session::{ChatPairing, MemorySessionStore, SessionKey, SessionStore};
pub use transport::{CallbackAction, ChatTransport, InboundEvent, InboundKind, OutboundMessage};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        CallbackAction, ChatTransport, CommandTable, ConversationTracker, Coordinate, CoreError,
        GeoIndex, InboundEvent, InboundKind, MatchDispatcher, OutboundMessage, ProfileRepository,
        RequestBus, Result, SessionStore, Step, UpdateHandler, UserHandle, VisibilityCoordinator,
    };
}
