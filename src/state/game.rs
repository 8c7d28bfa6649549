use std::{fmt, time::SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{PlayerEntity, SessionEntity, SessionPhaseEntity, TurnConfigEntity},
    state::scheduler::TurnState,
};

/// Stable identifier minted when a player joins a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub id: PlayerId,
    /// Display name; two players may share one.
    pub name: String,
    pub is_host: bool,
}

/// Insertion-ordered roster keyed by player id.
pub type Roster = IndexMap<PlayerId, Player>;

/// Rounds and timing chosen by the host when creating the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TurnConfig {
    pub rounds_per_player: u32,
    pub seconds_per_round: u32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            rounds_per_player: 5,
            seconds_per_round: 30,
        }
    }
}

/// Coarse room lifecycle shared through the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Room,
    Playing,
}

/// Local copy of one room, reconciled from the store on every poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// Room code.
    pub id: String,
    pub roster: Roster,
    pub config: TurnConfig,
    pub phase: SessionPhase,
    /// Turn bookkeeping; `None` until a game is started or when the stored
    /// state is unusable.
    pub turn: Option<TurnState>,
    pub created_at: SystemTime,
}

impl Session {
    /// Fresh room holding only its host.
    pub fn new(id: String, host: Player, config: TurnConfig) -> Self {
        let mut roster = Roster::new();
        roster.insert(host.id, host);
        Self {
            id,
            roster,
            config,
            phase: SessionPhase::Room,
            turn: None,
            created_at: SystemTime::now(),
        }
    }

    pub fn host_id(&self) -> Option<PlayerId> {
        self.roster
            .values()
            .find(|player| player.is_host)
            .map(|player| player.id)
    }

    pub fn is_host(&self, id: PlayerId) -> bool {
        self.roster.get(&id).is_some_and(|player| player.is_host)
    }

    /// Display name for an id, falling back to a short form of the id for
    /// players who already left the roster.
    pub fn player_name(&self, id: PlayerId) -> String {
        self.roster
            .get(&id)
            .map(|player| player.name.clone())
            .unwrap_or_else(|| format!("player {}", &id.0.simple().to_string()[..8]))
    }

    /// Active turn state, only while a game is running.
    pub fn playing_turn(&self) -> Option<&TurnState> {
        if self.phase == SessionPhase::Playing {
            self.turn.as_ref()
        } else {
            None
        }
    }
}

impl From<TurnConfigEntity> for TurnConfig {
    fn from(value: TurnConfigEntity) -> Self {
        Self {
            rounds_per_player: value.rounds_per_player.max(1),
            seconds_per_round: value.seconds_per_round.max(1),
        }
    }
}

impl From<TurnConfig> for TurnConfigEntity {
    fn from(value: TurnConfig) -> Self {
        Self {
            rounds_per_player: value.rounds_per_player,
            seconds_per_round: value.seconds_per_round,
        }
    }
}

impl From<SessionPhaseEntity> for SessionPhase {
    fn from(value: SessionPhaseEntity) -> Self {
        match value {
            SessionPhaseEntity::Room => SessionPhase::Room,
            SessionPhaseEntity::Playing => SessionPhase::Playing,
        }
    }
}

impl From<SessionPhase> for SessionPhaseEntity {
    fn from(value: SessionPhase) -> Self {
        match value {
            SessionPhase::Room => SessionPhaseEntity::Room,
            SessionPhase::Playing => SessionPhaseEntity::Playing,
        }
    }
}

impl From<SessionEntity> for Session {
    fn from(value: SessionEntity) -> Self {
        let config = TurnConfig::from(value.settings);
        let roster = value
            .players
            .into_iter()
            .map(|(id, player)| {
                let id = PlayerId(id);
                (
                    id,
                    Player {
                        id,
                        name: player.name,
                        is_host: player.is_host,
                    },
                )
            })
            .collect();

        let turn = value.turn.and_then(|turn| {
            TurnState::from_entity(turn, &config)
                .inspect_err(|reason| {
                    warn!(room = %value.id, %reason, "ignoring unusable turn state");
                })
                .ok()
        });

        Self {
            id: value.id,
            roster,
            config,
            phase: value.phase.into(),
            turn,
            created_at: value.created_at,
        }
    }
}

impl From<Session> for SessionEntity {
    fn from(value: Session) -> Self {
        Self {
            id: value.id,
            players: value
                .roster
                .into_values()
                .map(|player| {
                    (
                        player.id.0,
                        PlayerEntity {
                            name: player.name,
                            is_host: player.is_host,
                        },
                    )
                })
                .collect(),
            phase: value.phase.into(),
            settings: value.config.into(),
            turn: value.turn.map(Into::into),
            created_at: value.created_at,
        }
    }
}
