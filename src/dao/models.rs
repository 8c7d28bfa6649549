use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use uuid::Uuid;

/// Whole room record as written to the shared store under the room code.
///
/// Keyed maps are persisted as ordered lists of `[key, value]` pairs so that
/// insertion order survives backends which only keep plain JSON values.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionEntity {
    /// Room code.
    pub id: String,
    /// Insertion-ordered roster.
    #[serde_as(as = "Vec<(_, _)>")]
    pub players: IndexMap<Uuid, PlayerEntity>,
    /// Coarse lifecycle of the room.
    #[serde(default)]
    pub phase: SessionPhaseEntity,
    /// Turn configuration chosen by the host.
    pub settings: TurnConfigEntity,
    /// Turn bookkeeping, absent until the host starts the first game.
    #[serde(default)]
    pub turn: Option<TurnStateEntity>,
    /// Creation timestamp of the room.
    pub created_at: SystemTime,
}

/// Roster entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Display name, not necessarily unique.
    pub name: String,
    /// Whether this player created the room.
    #[serde(default)]
    pub is_host: bool,
}

/// Persisted room lifecycle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhaseEntity {
    /// Players are gathering; no game is running.
    #[default]
    Room,
    /// A game has been started by the host.
    Playing,
}

/// Persisted turn configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnConfigEntity {
    pub rounds_per_player: u32,
    pub seconds_per_round: u32,
}

/// Persisted turn state. Every field defaults so that partially written or
/// legacy records still decode; consistency is checked on conversion.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TurnStateEntity {
    pub epoch: u32,
    pub turn_order: Vec<Uuid>,
    pub current_player_index: usize,
    pub current_round: u32,
    pub current_color: Option<ColorEntity>,
    pub round_started_at: Option<SystemTime>,
    pub seconds_remaining: Option<u32>,
    pub player_ready: bool,
    #[serde_as(as = "Vec<(_, _)>")]
    pub scores: IndexMap<Uuid, ScoreRecordEntity>,
}

/// Persisted per-player accumulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoreRecordEntity {
    pub total_score: u64,
    pub rounds_completed: u32,
    pub per_round_scores: Vec<u32>,
}

/// Persisted RGB triple.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColorEntity {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}
