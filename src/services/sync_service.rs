//! Poll-diff step: turns a freshly read room record into typed local events,
//! and decides how a local turn write folds into the stored record.

use std::time::Duration;

use tracing::debug;

use crate::{
    config::AppConfig,
    state::{
        color::Rgb,
        game::{PlayerId, Session, SessionPhase},
        scheduler::{Reconciled, TurnPointer, TurnState},
    },
};

/// Local transition raised by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The record went from the room screen to a running game, or a game was restarted.
    GameStarted,
    /// The host took the room back to the room screen.
    ReturnedToRoom,
    /// Player index or round moved.
    TurnProgressed {
        from: Option<TurnPointer>,
        to: TurnPointer,
    },
    /// Target color changed; display only.
    ColorChanged(Option<Rgb>),
    /// Roster size or any score changed.
    LeaderboardChanged,
    /// Every player finished, observed for the first time.
    GameCompleted,
    /// The record is gone.
    RoomClosed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observed {
    phase: SessionPhase,
    epoch: Option<u32>,
    pointer: Option<TurnPointer>,
    color: Option<Rgb>,
    roster_len: usize,
    scores: Vec<(PlayerId, u64, u32)>,
    complete: bool,
}

impl Observed {
    fn of(session: &Session) -> Self {
        let turn = session.turn.as_ref();
        Self {
            phase: session.phase,
            epoch: turn.map(|turn| turn.epoch),
            pointer: turn.map(TurnState::pointer),
            color: turn.and_then(|turn| turn.current_color),
            roster_len: session.roster.len(),
            scores: turn.map(|turn| turn.scores.fingerprint()).unwrap_or_default(),
            complete: session.playing_turn().is_some_and(TurnState::is_complete),
        }
    }
}

/// Remembers what the local client last acted upon and reports what changed since.
#[derive(Debug, Clone, Default)]
pub struct SyncTracker {
    baseline: Option<Observed>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `session` as already handled, without raising anything.
    pub fn rebase(&mut self, session: &Session) {
        self.baseline = Some(Observed::of(session));
    }

    /// Compare the merged view of a poll against the baseline, then make it
    /// the new baseline. `None` means the record was not found.
    ///
    /// Lifecycle changes are reported alone since they reset everything else.
    /// Otherwise the four turn checks run every time, in a fixed order.
    pub fn diff(&mut self, session: Option<&Session>) -> Vec<SyncEvent> {
        let Some(session) = session else {
            self.baseline = None;
            return vec![SyncEvent::RoomClosed];
        };

        let now = Observed::of(session);
        let Some(before) = self.baseline.replace(now.clone()) else {
            return Vec::new();
        };

        match (before.phase, now.phase) {
            (SessionPhase::Room, SessionPhase::Playing) => return vec![SyncEvent::GameStarted],
            (SessionPhase::Playing, SessionPhase::Room) => return vec![SyncEvent::ReturnedToRoom],
            (SessionPhase::Playing, SessionPhase::Playing) if now.epoch > before.epoch => {
                return vec![SyncEvent::GameStarted];
            }
            _ => {}
        }

        let mut events = Vec::new();
        if now.phase == SessionPhase::Playing {
            if let Some(to) = now.pointer.filter(|to| Some(*to) != before.pointer) {
                events.push(SyncEvent::TurnProgressed {
                    from: before.pointer,
                    to,
                });
            }
            if now.color != before.color {
                events.push(SyncEvent::ColorChanged(now.color));
            }
        }
        if now.roster_len != before.roster_len || now.scores != before.scores {
            events.push(SyncEvent::LeaderboardChanged);
        }
        if now.complete && !before.complete {
            events.push(SyncEvent::GameCompleted);
        }
        events
    }
}

/// Fold a polled record into the local copy.
///
/// The roster, settings and lifecycle always come from the store; the turn
/// state goes through [`TurnState::reconcile`] so it never moves backwards.
pub fn absorb(local: &mut Session, remote: Session, local_is_active: bool) {
    let Session {
        roster,
        config,
        phase,
        turn,
        created_at,
        ..
    } = remote;
    local.roster = roster;
    local.config = config;
    local.created_at = created_at;

    let was_playing = local.phase == SessionPhase::Playing;
    local.phase = phase;
    if phase == SessionPhase::Room || !was_playing {
        local.turn = turn;
        return;
    }

    match (local.turn.as_mut(), turn) {
        (Some(ours), Some(theirs)) => {
            if ours.reconcile(theirs, local_is_active) == Reconciled::Stale {
                debug!(room = %local.id, pointer = ?ours.pointer(), "ignoring stale turn state");
            }
        }
        (None, theirs) => local.turn = theirs,
        (Some(_), None) => {
            debug!(room = %local.id, "stored turn state unusable; keeping local copy");
        }
    }
}

/// How a local turn write relates to what is currently stored.
#[derive(Debug, Clone, PartialEq)]
pub enum WritePlan {
    /// Store this record; its turn state is also the new local copy.
    Write(Session),
    /// The room is gone; writing would bring it back.
    RoomClosed,
    /// The host ended the game in the meantime.
    GameEnded,
    /// Someone already moved the turn further; our copy is outdated.
    Behind,
}

/// Read-merge-write: keep the stored roster and lifecycle, replace only the
/// turn state, and never overwrite a turn that is further along.
pub fn plan_turn_write(stored: Option<Session>, local: &TurnState) -> WritePlan {
    let Some(mut stored) = stored else {
        return WritePlan::RoomClosed;
    };
    if stored.phase != SessionPhase::Playing {
        return WritePlan::GameEnded;
    }

    let mut merged = local.clone();
    if let Some(theirs) = stored.turn.take() {
        if theirs.pointer() > merged.pointer() {
            return WritePlan::Behind;
        }
        if theirs.pointer() == merged.pointer() {
            merged.reconcile(theirs, true);
        }
    }
    stored.turn = Some(merged);
    WritePlan::Write(stored)
}

/// Poll interval for a roster size: slower as more clients share the store.
pub fn poll_interval(players: usize, config: &AppConfig) -> Duration {
    if players > config.large_room_threshold {
        config.large_room_poll_interval
    } else if players > config.medium_room_threshold {
        config.medium_room_poll_interval
    } else {
        config.poll_interval
    }
}
