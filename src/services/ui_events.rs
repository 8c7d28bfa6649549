use tracing::debug;

use crate::{
    dto::{
        format_system_time,
        settings::RoomSettings,
        ui::{NoticeLevel, PlayerView, RoomView, RoundOutcome, TurnView, UiEvent},
    },
    state::{
        ClientContext, UiHub,
        color::Rgb,
        game::SessionPhase,
        ledger::PlayerStats,
    },
};

/// Tell the UI the client is back on the landing screen.
pub fn broadcast_lobby(ui: &UiHub) {
    ui.broadcast(UiEvent::Lobby);
}

/// Broadcast the room roster and settings.
pub fn broadcast_room_updated(ui: &UiHub, ctx: &ClientContext) {
    ui.broadcast(UiEvent::RoomUpdated(room_view(ctx)));
}

/// Broadcast that a game (or a restart) began.
pub fn broadcast_game_started(ui: &UiHub, ctx: &ClientContext) {
    let session = ctx.session();
    let total_players = session
        .playing_turn()
        .map(|turn| turn.turn_order.len())
        .unwrap_or(session.roster.len());
    ui.broadcast(UiEvent::GameStarted {
        total_players,
        rounds_per_player: session.config.rounds_per_player,
    });
}

/// Broadcast whose round is being set up.
pub fn broadcast_turn_display(ui: &UiHub, ctx: &ClientContext) {
    let session = ctx.session();
    let Some(turn) = session.playing_turn() else {
        return;
    };
    let Some(active) = turn.active_player() else {
        return;
    };
    ui.broadcast(UiEvent::TurnDisplay(TurnView {
        player_id: active,
        player_name: session.player_name(active),
        is_you: active == ctx.me(),
        position: turn.current_player_index + 1,
        total_players: turn.turn_order.len(),
        round: turn.current_round,
        rounds_per_player: session.config.rounds_per_player,
        progress_percent: turn.progress_percent(session.config.rounds_per_player),
    }));
}

/// Ask the local player to confirm their first round.
pub fn broadcast_ready_prompt(ui: &UiHub, ctx: &ClientContext) {
    let config = ctx.session().config;
    ui.broadcast(UiEvent::ReadyPrompt {
        rounds_per_player: config.rounds_per_player,
        seconds_per_round: config.seconds_per_round,
    });
}

/// Show the waiting screen for someone else's first round.
pub fn broadcast_waiting_for_ready(ui: &UiHub, ctx: &ClientContext) {
    let session = ctx.session();
    let Some(active) = session.playing_turn().and_then(|turn| turn.active_player()) else {
        return;
    };
    ui.broadcast(UiEvent::WaitingForReady {
        player_id: active,
        player_name: session.player_name(active),
        host_controls: ctx.is_host(),
    });
}

pub fn broadcast_countdown(ui: &UiHub, remaining: u32) {
    ui.broadcast(UiEvent::Countdown {
        label: remaining.to_string(),
        remaining,
    });
}

pub fn broadcast_round_started(ui: &UiHub, color: Rgb, seconds: u32) {
    ui.broadcast(UiEvent::RoundStarted { color, seconds });
}

/// Show someone else's running round.
pub fn broadcast_spectating(ui: &UiHub, ctx: &ClientContext) {
    let session = ctx.session();
    let Some(turn) = session.playing_turn() else {
        return;
    };
    let Some(active) = turn.active_player() else {
        return;
    };
    ui.broadcast(UiEvent::Spectating {
        player_id: active,
        player_name: session.player_name(active),
        color: turn.current_color,
        seconds_remaining: turn.seconds_remaining,
        host_controls: ctx.is_host(),
    });
}

pub fn broadcast_timer_tick(ui: &UiHub, seconds_remaining: u32) {
    ui.broadcast(UiEvent::TimerTick { seconds_remaining });
}

pub fn broadcast_color_updated(ui: &UiHub, color: Option<Rgb>) {
    ui.broadcast(UiEvent::ColorUpdated { color });
}

pub fn broadcast_round_resolved(ui: &UiHub, outcome: RoundOutcome) {
    ui.broadcast(UiEvent::RoundResolved(outcome));
}

/// Broadcast the standings along with the local player's figures.
pub fn broadcast_leaderboard(ui: &UiHub, ctx: &ClientContext) {
    let session = ctx.session();
    let Some(turn) = session.turn.as_ref() else {
        return;
    };
    let rounds = session.config.rounds_per_player;
    let stats = turn
        .scores
        .get(&ctx.me())
        .map(|record| PlayerStats::from_record(record, rounds));
    ui.broadcast(UiEvent::LeaderboardUpdated {
        entries: turn.scores.leaderboard(&session.roster),
        stats,
        progress_percent: turn.progress_percent(rounds),
    });
}

/// Tell the local player they played all of their rounds.
pub fn broadcast_completion_notice(ui: &UiHub, ctx: &ClientContext) {
    let record = ctx
        .session()
        .turn
        .as_ref()
        .and_then(|turn| turn.scores.get(&ctx.me()).cloned())
        .unwrap_or_default();
    ui.broadcast(UiEvent::CompletionNotice {
        total_score: record.total_score,
        rounds_played: record.rounds_completed,
    });
}

pub fn broadcast_spectator_mode(ui: &UiHub) {
    ui.broadcast(UiEvent::SpectatorMode);
}

/// Broadcast the final standings.
pub fn broadcast_game_complete(ui: &UiHub, ctx: &ClientContext) {
    let session = ctx.session();
    let leaderboard = session
        .turn
        .as_ref()
        .map(|turn| turn.scores.leaderboard(&session.roster))
        .unwrap_or_default();
    let winner = leaderboard.first().map(|entry| entry.name.clone());
    debug!(room = %session.id, winner = ?winner, "final standings computed");
    ui.broadcast(UiEvent::GameComplete {
        leaderboard,
        winner,
    });
}

pub fn broadcast_notice(ui: &UiHub, level: NoticeLevel, message: impl Into<String>) {
    ui.broadcast(UiEvent::Notice {
        level,
        message: message.into(),
    });
}

pub fn broadcast_room_closed(ui: &UiHub) {
    ui.broadcast(UiEvent::RoomClosed);
}

fn room_view(ctx: &ClientContext) -> RoomView {
    let session = ctx.session();
    let config = ctx.config();
    let you_are_host = ctx.is_host();
    let players = session
        .roster
        .values()
        .map(|player| PlayerView {
            id: player.id,
            name: player.name.clone(),
            is_host: player.is_host,
            is_you: player.id == ctx.me(),
        })
        .collect::<Vec<_>>();
    let can_start = you_are_host
        && session.phase == SessionPhase::Room
        && (config.min_players..=config.max_players).contains(&players.len());

    RoomView {
        room_code: session.id.clone(),
        players,
        settings: RoomSettings::from(session.config),
        you_are_host,
        can_start,
        created_at: format_system_time(session.created_at),
    }
}
