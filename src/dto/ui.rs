//! Events pushed to the rendering layer of one client.

use serde::{Deserialize, Serialize};

use crate::{
    dto::settings::RoomSettings,
    state::{
        color::Rgb,
        game::PlayerId,
        ledger::{LeaderboardEntry, PlayerStats},
    },
};

/// Everything the UI of one client may be asked to show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// Back on the landing screen.
    Lobby,
    /// Roster or settings of the current room changed.
    RoomUpdated(RoomView),
    /// The host started a game.
    GameStarted {
        total_players: usize,
        rounds_per_player: u32,
    },
    /// Whose round is coming up.
    TurnDisplay(TurnView),
    /// Local player must confirm before their first round.
    ReadyPrompt {
        rounds_per_player: u32,
        seconds_per_round: u32,
    },
    /// Waiting on the active player's confirmation.
    WaitingForReady {
        player_id: PlayerId,
        player_name: String,
        /// Skip and force start are offered.
        host_controls: bool,
    },
    Countdown {
        label: String,
        remaining: u32,
    },
    /// Local player's round is running.
    RoundStarted { color: Rgb, seconds: u32 },
    /// Someone else's round is running.
    Spectating {
        player_id: PlayerId,
        player_name: String,
        color: Option<Rgb>,
        seconds_remaining: Option<u32>,
        host_controls: bool,
    },
    TimerTick { seconds_remaining: u32 },
    /// Display-only refresh of the active target color.
    ColorUpdated { color: Option<Rgb> },
    RoundResolved(RoundOutcome),
    LeaderboardUpdated {
        entries: Vec<LeaderboardEntry>,
        /// Figures of the local player, absent when they are not in the turn order.
        stats: Option<PlayerStats>,
        progress_percent: u32,
    },
    /// Local player played all of their rounds.
    CompletionNotice {
        total_score: u64,
        rounds_played: u32,
    },
    /// The completion notice went away; the player watches from now on.
    SpectatorMode,
    GameComplete {
        leaderboard: Vec<LeaderboardEntry>,
        winner: Option<String>,
    },
    Notice { level: NoticeLevel, message: String },
    /// The room disappeared from the store.
    RoomClosed,
}

/// Input coming from the player's UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Confirm readiness for the first round.
    ConfirmReady,
    SubmitGuess { guess: Rgb },
    /// Host: resolve the active player's round with zero points.
    HostSkip,
    /// Host: mark the active player ready on their behalf.
    HostForceStart,
    /// Dismiss the completion notice and keep watching.
    ConfirmSpectate,
    StartGame,
    RestartGame,
    BackToRoom,
    Leave,
}

/// Severity of a [`UiEvent::Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Room screen contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomView {
    pub room_code: String,
    pub players: Vec<PlayerView>,
    pub settings: RoomSettings,
    pub you_are_host: bool,
    /// The host may press start.
    pub can_start: bool,
    /// RFC 3339 creation time.
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub is_you: bool,
}

/// Banner shown while a round is set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnView {
    pub player_id: PlayerId,
    pub player_name: String,
    pub is_you: bool,
    /// 1-based position of the active player in the turn order.
    pub position: usize,
    pub total_players: usize,
    pub round: u32,
    pub rounds_per_player: u32,
    pub progress_percent: u32,
}

/// Result of the local player's round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundOutcome {
    pub target: Rgb,
    /// `None` when the timer ran out.
    pub guess: Option<Rgb>,
    pub accuracy: f64,
    pub points: u32,
    pub timed_out: bool,
    pub headline: &'static str,
}

impl RoundOutcome {
    pub fn guessed(target: Rgb, guess: Rgb, accuracy: f64, points: u32) -> Self {
        Self {
            target,
            guess: Some(guess),
            accuracy,
            points,
            timed_out: false,
            headline: headline(accuracy),
        }
    }

    pub fn timed_out(target: Rgb) -> Self {
        Self {
            target,
            guess: None,
            accuracy: 0.0,
            points: 0,
            timed_out: true,
            headline: "Time's up!",
        }
    }
}

/// Short verdict for an accuracy percentage.
pub fn headline(accuracy: f64) -> &'static str {
    if accuracy >= 90.0 {
        "Excellent!"
    } else if accuracy >= 70.0 {
        "Great job!"
    } else if accuracy >= 50.0 {
        "Good effort!"
    } else {
        "Keep practicing!"
    }
}
