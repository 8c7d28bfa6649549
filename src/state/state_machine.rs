use serde::Serialize;
use thiserror::Error;

/// High-level phases a client can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "detail")]
pub enum ClientPhase {
    /// Not attached to any room.
    Lobby,
    /// Inside a room, waiting for the host to start.
    Room,
    /// A game is running; the sub-phase tracks the current round.
    InGame(TurnPhase),
    /// Every player finished; final standings are shown.
    GameComplete,
}

/// Fine-grained phase while a game is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Deciding what the next round needs.
    AwaitingTurnStart,
    /// Local player must confirm before their first round.
    ReadyPrompt,
    /// Waiting for the active player to confirm.
    WaitingForReady,
    /// Cosmetic countdown before the round.
    Countdown,
    /// Round timer is running.
    RoundActive(Role),
    /// Local player's round has been scored; dwell before advancing.
    RoundResolved,
}

/// Local role during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Local player is guessing.
    Active,
    /// Local player is watching someone else.
    Spectator,
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// Created or joined a room.
    EnterRoom,
    /// The host started a game.
    GameStarted,
    /// A new round is about to be set up; also used to reset after the turn
    /// pointer moved under us.
    TurnStarting,
    /// Local player owns the gated round.
    PromptReady,
    /// Someone else owns the gated round.
    WaitForReady,
    /// Readiness is settled or not needed.
    BeginCountdown,
    /// Countdown elapsed; the round runs with the given local role.
    CountdownFinished(Role),
    /// Local player's guess or timeout has been scored.
    RoundResolved,
    /// Every player finished.
    Complete,
    /// The host restarted the game with the same roster.
    Restarted,
    /// The host took everyone back to the room.
    ReturnToRoom,
    /// Local player left, or the room disappeared.
    Leave,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: ClientPhase,
    /// The event that cannot be applied from this phase.
    pub event: ClientEvent,
}

/// Per-client state machine driving which screen the UI shows.
#[derive(Debug, Clone)]
pub struct ClientStateMachine {
    phase: ClientPhase,
}

impl Default for ClientStateMachine {
    fn default() -> Self {
        Self {
            phase: ClientPhase::Lobby,
        }
    }
}

impl ClientStateMachine {
    /// Create a new state machine in the lobby.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> ClientPhase {
        self.phase
    }

    pub fn turn_phase(&self) -> Option<TurnPhase> {
        match self.phase {
            ClientPhase::InGame(turn) => Some(turn),
            _ => None,
        }
    }

    pub fn in_game(&self) -> bool {
        matches!(self.phase, ClientPhase::InGame(_))
    }

    /// Validate and apply an event, returning the new phase.
    pub fn apply(&mut self, event: ClientEvent) -> Result<ClientPhase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        Ok(next)
    }

    /// Whether `event` would be accepted from the current phase.
    pub fn can_apply(&self, event: ClientEvent) -> bool {
        self.compute_transition(event).is_ok()
    }

    fn compute_transition(&self, event: ClientEvent) -> Result<ClientPhase, InvalidTransition> {
        use ClientPhase::*;
        use TurnPhase::*;

        let next = match (self.phase, event) {
            (Lobby, ClientEvent::EnterRoom) => Room,
            (Room, ClientEvent::GameStarted) => InGame(AwaitingTurnStart),
            (InGame(_), ClientEvent::TurnStarting) => InGame(AwaitingTurnStart),
            (InGame(AwaitingTurnStart), ClientEvent::PromptReady) => InGame(ReadyPrompt),
            (InGame(AwaitingTurnStart), ClientEvent::WaitForReady) => InGame(WaitingForReady),
            (
                InGame(AwaitingTurnStart | ReadyPrompt | WaitingForReady),
                ClientEvent::BeginCountdown,
            ) => InGame(Countdown),
            (InGame(Countdown), ClientEvent::CountdownFinished(role)) => InGame(RoundActive(role)),
            (InGame(RoundActive(Role::Active)), ClientEvent::RoundResolved) => {
                InGame(RoundResolved)
            }
            (InGame(_), ClientEvent::Complete) => GameComplete,
            (GameComplete, ClientEvent::Restarted) => InGame(AwaitingTurnStart),
            (InGame(_) | GameComplete, ClientEvent::ReturnToRoom) => Room,
            (_, ClientEvent::Leave) => Lobby,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
