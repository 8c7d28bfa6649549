//! Turn rotation: whose round is in progress and how a resolved round advances it.

use std::time::SystemTime;

use serde::Serialize;
use thiserror::Error;

use crate::{
    dao::models::TurnStateEntity,
    state::{
        color::Rgb,
        game::{PlayerId, TurnConfig},
        ledger::{ScoreLedger, ScoreRecord},
    },
};

/// Position of play, ordered so that later positions compare greater.
///
/// `epoch` comes first: a restarted game starts back at index 0 but must still
/// be ordered after everything that happened in the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TurnPointer {
    pub epoch: u32,
    pub player_index: usize,
    pub round: u32,
}

/// Reasons a stored turn state is rejected and treated as "not started".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnStateError {
    #[error("turn order is empty")]
    EmptyTurnOrder,
    #[error("player index {index} is past the turn order of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("round {round} is outside 1..={rounds_per_player}")]
    RoundOutOfRange { round: u32, rounds_per_player: u32 },
}

/// Error returned when asking the scheduler to resolve a round after the
/// last player already finished.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("every player already finished their rounds")]
pub struct TurnsExhausted;

/// What a resolved round did to the rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResolution {
    /// Player whose round was resolved.
    pub player: PlayerId,
    pub points: u32,
    /// The player has now played all of their rounds.
    pub player_finished: bool,
    /// Nobody is left to play.
    pub game_complete: bool,
}

/// How a polled turn state related to the local copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The polled copy was behind ours and has been ignored.
    Stale,
    /// Same turn pointer; fields merged.
    Merged,
    /// The polled copy was ahead and replaced ours.
    Adopted,
}

/// Shared turn bookkeeping for one game.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnState {
    pub epoch: u32,
    /// Fixed once play starts.
    pub turn_order: Vec<PlayerId>,
    /// Only ever increases within an epoch; equal to the turn order length
    /// once everyone has played.
    pub current_player_index: usize,
    /// 1-based round of the active player.
    pub current_round: u32,
    pub current_color: Option<Rgb>,
    pub round_started_at: Option<SystemTime>,
    pub seconds_remaining: Option<u32>,
    /// Readiness handshake of the active player's first round.
    pub player_ready: bool,
    pub scores: ScoreLedger,
}

impl TurnState {
    /// Fresh rotation over `turn_order` with zeroed scores.
    pub fn new(turn_order: Vec<PlayerId>, epoch: u32) -> Self {
        let scores = ScoreLedger::for_players(&turn_order);
        Self {
            epoch,
            turn_order,
            current_player_index: 0,
            current_round: 1,
            current_color: None,
            round_started_at: None,
            seconds_remaining: None,
            player_ready: false,
            scores,
        }
    }

    pub fn pointer(&self) -> TurnPointer {
        TurnPointer {
            epoch: self.epoch,
            player_index: self.current_player_index,
            round: self.current_round,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_player_index >= self.turn_order.len()
    }

    pub fn active_player(&self) -> Option<PlayerId> {
        self.turn_order.get(self.current_player_index).copied()
    }

    /// Whether the upcoming round needs the active player's confirmation:
    /// only the very first round of each player's turn does.
    pub fn readiness_gated(&self) -> bool {
        match self.active_player() {
            Some(id) => self.scores.rounds_completed(&id) == 0 && self.current_round == 1,
            None => false,
        }
    }

    /// Share of all rounds of the game that have been resolved, in percent.
    pub fn progress_percent(&self, rounds_per_player: u32) -> u32 {
        let total = u64::from(rounds_per_player) * self.turn_order.len() as u64;
        if total == 0 {
            return 0;
        }
        let done = if self.is_complete() {
            total
        } else {
            self.current_player_index as u64 * u64::from(rounds_per_player)
                + u64::from(self.current_round.saturating_sub(1))
        };
        ((done as f64 / total as f64) * 100.0).round() as u32
    }

    /// Start a round on the active player's behalf with a freshly drawn color.
    pub fn start_round(&mut self, color: Rgb, seconds: u32) {
        self.current_color = Some(color);
        self.round_started_at = Some(SystemTime::now());
        self.seconds_remaining = Some(seconds);
    }

    /// Resolve the active player's round with `points` (zero for a timeout or
    /// a host skip) and advance the rotation.
    pub fn resolve_round(
        &mut self,
        points: u32,
        config: &TurnConfig,
    ) -> Result<RoundResolution, TurnsExhausted> {
        let player = self.active_player().ok_or(TurnsExhausted)?;
        self.scores.record_round(player, points);

        let player_finished = self.current_round >= config.rounds_per_player;
        if player_finished {
            self.scores.mark_completed(player, config.rounds_per_player);
            self.current_player_index += 1;
            self.current_round = 1;
        } else {
            self.current_round += 1;
        }

        self.current_color = None;
        self.player_ready = false;
        self.seconds_remaining = None;
        self.round_started_at = None;

        Ok(RoundResolution {
            player,
            points,
            player_finished,
            game_complete: self.is_complete(),
        })
    }

    /// Fold a polled copy into ours without ever moving the pointer backwards.
    ///
    /// On an equal pointer the readiness flag is OR-ed, scores keep the record
    /// with more rounds, and round fields prefer the writer's copy: ours when
    /// we are the active player, theirs otherwise.
    pub fn reconcile(&mut self, remote: TurnState, local_is_active: bool) -> Reconciled {
        let ours = self.pointer();
        let theirs = remote.pointer();

        if theirs < ours {
            return Reconciled::Stale;
        }
        if theirs > ours {
            *self = remote;
            return Reconciled::Adopted;
        }

        self.player_ready |= remote.player_ready;
        self.scores.merge_newer(&remote.scores);
        if local_is_active {
            self.current_color = self.current_color.or(remote.current_color);
            self.round_started_at = self.round_started_at.or(remote.round_started_at);
            self.seconds_remaining = self.seconds_remaining.or(remote.seconds_remaining);
        } else {
            self.current_color = remote.current_color.or(self.current_color);
            self.round_started_at = remote.round_started_at.or(self.round_started_at);
            self.seconds_remaining = remote.seconds_remaining.or(self.seconds_remaining);
        }
        Reconciled::Merged
    }

    /// Build from a stored record, rejecting states that break the pointer invariants.
    pub fn from_entity(value: TurnStateEntity, config: &TurnConfig) -> Result<Self, TurnStateError> {
        if value.turn_order.is_empty() {
            return Err(TurnStateError::EmptyTurnOrder);
        }
        let len = value.turn_order.len();
        if value.current_player_index > len {
            return Err(TurnStateError::IndexOutOfRange {
                index: value.current_player_index,
                len,
            });
        }
        if value.current_round == 0 || value.current_round > config.rounds_per_player {
            return Err(TurnStateError::RoundOutOfRange {
                round: value.current_round,
                rounds_per_player: config.rounds_per_player,
            });
        }

        Ok(Self {
            epoch: value.epoch,
            turn_order: value.turn_order.into_iter().map(PlayerId).collect(),
            current_player_index: value.current_player_index,
            current_round: value.current_round,
            current_color: value.current_color.map(Into::into),
            round_started_at: value.round_started_at,
            seconds_remaining: value.seconds_remaining,
            player_ready: value.player_ready,
            scores: value
                .scores
                .into_iter()
                .map(|(id, record)| (PlayerId(id), ScoreRecord::from(record)))
                .collect(),
        })
    }
}

impl From<TurnState> for TurnStateEntity {
    fn from(value: TurnState) -> Self {
        Self {
            epoch: value.epoch,
            turn_order: value.turn_order.into_iter().map(|id| id.0).collect(),
            current_player_index: value.current_player_index,
            current_round: value.current_round,
            current_color: value.current_color.map(Into::into),
            round_started_at: value.round_started_at,
            seconds_remaining: value.seconds_remaining,
            player_ready: value.player_ready,
            scores: value
                .scores
                .into_iter()
                .map(|(id, record)| (id.0, record.into()))
                .collect(),
        }
    }
}
