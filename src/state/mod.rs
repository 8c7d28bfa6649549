pub mod color;
pub mod game;
pub mod ledger;
pub mod scheduler;
pub mod state_machine;
mod ui;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    dao::room_store::RoomStore,
    state::{game::PlayerId, game::Session},
};

pub use self::state_machine::{ClientPhase, InvalidTransition};
pub use self::ui::UiHub;

/// Everything one client needs to talk about its room: the shared store, the
/// local player and the local copy of the room record.
///
/// Several contexts can live in one process; nothing here is global.
pub struct ClientContext {
    store: Arc<dyn RoomStore>,
    config: Arc<AppConfig>,
    me: PlayerId,
    session: Session,
}

impl ClientContext {
    pub fn new(
        store: Arc<dyn RoomStore>,
        config: Arc<AppConfig>,
        me: PlayerId,
        session: Session,
    ) -> Self {
        Self {
            store,
            config,
            me,
            session,
        }
    }

    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Local player id.
    pub fn me(&self) -> PlayerId {
        self.me
    }

    pub fn room_id(&self) -> &str {
        &self.session.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Replace the local copy wholesale, e.g. after a lifecycle write.
    pub fn replace_session(&mut self, session: Session) {
        self.session = session;
    }

    pub fn is_host(&self) -> bool {
        self.session.is_host(self.me)
    }

    /// Whether the local player owns the round currently in play.
    pub fn is_local_active(&self) -> bool {
        self.session
            .playing_turn()
            .and_then(|turn| turn.active_player())
            .is_some_and(|id| id == self.me)
    }
}
