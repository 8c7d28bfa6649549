//! Per-client coordination engine.
//!
//! Owns the local state machine and the local copy of the room, reacts to UI
//! commands, to its own phase timer and to polled records, and writes turn
//! state back through the room store. It never runs two steps at once; the
//! caller (see [`crate::services::client_runtime`]) feeds it one input at a time.

use std::{mem, sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    dto::ui::{ClientCommand, NoticeLevel, RoundOutcome},
    error::ServiceError,
    services::{
        room_service::{self, StartedGame},
        sync_service::{self, SyncEvent, SyncTracker, WritePlan},
        ui_events,
    },
    state::{
        ClientContext, UiHub,
        color::{Rgb, score_guess},
        game::Session,
        state_machine::{ClientEvent, ClientPhase, ClientStateMachine, Role, TurnPhase},
    },
};

const ROUND_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    CountdownStep,
    RoundTick,
    ResolvedDwell,
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    kind: TimerKind,
    deadline: Instant,
}

/// Coordination engine of one client.
pub struct Coordinator {
    ctx: ClientContext,
    ui: UiHub,
    machine: ClientStateMachine,
    tracker: SyncTracker,
    /// At most one phase timer is pending; every exit edge replaces or clears it.
    timer: Option<PendingTimer>,
    notice_deadline: Option<Instant>,
    completed: bool,
    detached: bool,
    countdown_remaining: u32,
    pending_points: u32,
    spectated_seconds: Option<u32>,
}

impl Coordinator {
    pub fn new(ctx: ClientContext, ui: UiHub) -> Self {
        Self {
            ctx,
            ui,
            machine: ClientStateMachine::new(),
            tracker: SyncTracker::new(),
            timer: None,
            notice_deadline: None,
            completed: false,
            detached: false,
            countdown_remaining: 0,
            pending_points: 0,
            spectated_seconds: None,
        }
    }

    /// Move from the lobby into the room held by the context. A room that is
    /// already playing is followed straight into its current turn.
    pub async fn enter_room(&mut self) -> Result<(), ServiceError> {
        self.machine.apply(ClientEvent::EnterRoom)?;
        info!(room = %self.ctx.room_id(), player = %self.ctx.me(), "entered room");
        ui_events::broadcast_room_updated(&self.ui, &self.ctx);
        if self.ctx.session().playing_turn().is_some() {
            self.begin_game().await;
        }
        self.settle();
        Ok(())
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    pub fn phase(&self) -> ClientPhase {
        self.machine.phase()
    }

    pub fn ui(&self) -> &UiHub {
        &self.ui
    }

    /// The client left or its room closed; no further input is expected.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn timer_deadline(&self) -> Option<Instant> {
        self.timer.map(|timer| timer.deadline)
    }

    pub fn notice_deadline(&self) -> Option<Instant> {
        self.notice_deadline
    }

    /// Delay before the next poll.
    pub fn poll_interval(&self) -> Duration {
        let config = self.ctx.config();
        if self.machine.turn_phase() == Some(TurnPhase::WaitingForReady) {
            config.readiness_poll_interval
        } else {
            sync_service::poll_interval(self.ctx.session().roster.len(), config)
        }
    }

    /// Apply one UI command.
    pub async fn handle_command(&mut self, command: ClientCommand) -> Result<(), ServiceError> {
        if self.detached {
            return Err(ServiceError::InvalidState("client left the room".into()));
        }
        debug!(room = %self.ctx.room_id(), ?command, "command");

        let result = match command {
            ClientCommand::ConfirmReady => self.confirm_ready().await,
            ClientCommand::SubmitGuess { guess } => self.submit_guess(guess),
            ClientCommand::HostSkip => self.host_skip().await,
            ClientCommand::HostForceStart => self.host_force_start().await,
            ClientCommand::ConfirmSpectate => self.confirm_spectate(),
            ClientCommand::StartGame => self.start_game().await,
            ClientCommand::RestartGame => self.restart_game().await,
            ClientCommand::BackToRoom => self.back_to_room().await,
            ClientCommand::Leave => self.leave().await,
        };
        self.settle();
        result
    }

    /// Run the pending phase timer, whatever its deadline.
    pub async fn fire_timer(&mut self) {
        let Some(timer) = self.timer.take() else {
            return;
        };
        match timer.kind {
            TimerKind::CountdownStep => self.countdown_step().await,
            TimerKind::RoundTick => self.round_tick().await,
            TimerKind::ResolvedDwell => {
                let points = mem::take(&mut self.pending_points);
                self.resolve_and_advance(points).await;
            }
        }
        self.settle();
    }

    /// Drop the completion notice, on timeout or on request.
    pub fn dismiss_notice(&mut self) {
        if self.notice_deadline.take().is_some() {
            ui_events::broadcast_spectator_mode(&self.ui);
        }
    }

    /// One synchronization tick: read the record, fold it in, react to what changed.
    pub async fn poll(&mut self) {
        if self.detached {
            return;
        }
        let room = self.ctx.room_id().to_owned();
        let fetched = match self.ctx.store().get(&room).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(room = %room, error = %err, "poll failed; retrying on next tick");
                return;
            }
        };

        let was_finished = self.local_player_finished();
        let events = match fetched {
            Some(entity) => {
                let local_is_active = self.ctx.is_local_active();
                sync_service::absorb(self.ctx.session_mut(), Session::from(entity), local_is_active);
                self.tracker.diff(Some(self.ctx.session()))
            }
            None => self.tracker.diff(None),
        };

        for event in events {
            self.dispatch(event).await;
            if self.detached {
                return;
            }
        }
        // Someone else resolved our last round, e.g. a host skip.
        if !was_finished && self.local_player_finished() && self.notice_deadline.is_none() {
            self.show_completion_notice();
        }
        self.settle_readiness().await;
        self.relay_spectated_timer();
        self.settle();
    }

    /// The local player is in the running game and has played all their rounds.
    fn local_player_finished(&self) -> bool {
        let me = self.ctx.me();
        let session = self.ctx.session();
        session.playing_turn().is_some_and(|turn| {
            turn.turn_order.contains(&me)
                && turn.scores.rounds_completed(&me) >= session.config.rounds_per_player
        })
    }

    fn show_completion_notice(&mut self) {
        ui_events::broadcast_completion_notice(&self.ui, &self.ctx);
        self.notice_deadline = Some(Instant::now() + self.ctx.config().completion_notice);
    }

    async fn dispatch(&mut self, event: SyncEvent) {
        debug!(room = %self.ctx.room_id(), ?event, "sync event");
        match event {
            SyncEvent::RoomClosed => {
                info!(room = %self.ctx.room_id(), "room closed");
                self.detach();
                ui_events::broadcast_room_closed(&self.ui);
            }
            SyncEvent::GameStarted => self.begin_game().await,
            SyncEvent::ReturnedToRoom => self.return_to_room(),
            SyncEvent::TurnProgressed { from, to } => {
                if self.machine.in_game() && !self.completed {
                    debug!(room = %self.ctx.room_id(), ?from, ?to, "turn moved on");
                    self.timer = None;
                    self.transition(ClientEvent::TurnStarting);
                    self.enter_turn().await;
                }
            }
            SyncEvent::ColorChanged(color) => {
                if self.machine.in_game() {
                    ui_events::broadcast_color_updated(&self.ui, color);
                }
            }
            SyncEvent::LeaderboardChanged => match self.machine.phase() {
                ClientPhase::Room => ui_events::broadcast_room_updated(&self.ui, &self.ctx),
                ClientPhase::InGame(_) | ClientPhase::GameComplete => {
                    ui_events::broadcast_leaderboard(&self.ui, &self.ctx)
                }
                ClientPhase::Lobby => {}
            },
            SyncEvent::GameCompleted => {
                if self.machine.in_game() {
                    self.complete_game();
                }
            }
        }
    }

    /// Readiness set by someone else ends the gate.
    async fn settle_readiness(&mut self) {
        let ready = self
            .ctx
            .session()
            .playing_turn()
            .is_some_and(|turn| turn.player_ready);
        if !ready {
            return;
        }
        match self.machine.turn_phase() {
            Some(TurnPhase::WaitingForReady) => {
                debug!(room = %self.ctx.room_id(), "active player is ready");
                self.start_countdown();
            }
            Some(TurnPhase::ReadyPrompt) => {
                info!(room = %self.ctx.room_id(), "host forced the start");
                if let Err(err) = self.confirm_ready().await {
                    warn!(room = %self.ctx.room_id(), error = %err, "could not start forced round");
                }
            }
            _ => {}
        }
    }

    fn relay_spectated_timer(&mut self) {
        if self.machine.turn_phase() != Some(TurnPhase::RoundActive(Role::Spectator)) {
            return;
        }
        let seconds = self
            .ctx
            .session()
            .playing_turn()
            .and_then(|turn| turn.seconds_remaining);
        if let Some(seconds) = seconds {
            if self.spectated_seconds != Some(seconds) {
                self.spectated_seconds = Some(seconds);
                ui_events::broadcast_timer_tick(&self.ui, seconds);
            }
        }
    }

    /// Entry of `AwaitingTurnStart`: pick the gate or go straight to the countdown.
    async fn enter_turn(&mut self) {
        self.timer = None;
        self.spectated_seconds = None;
        let Some(turn) = self.ctx.session().playing_turn() else {
            warn!(room = %self.ctx.room_id(), "no usable turn state; waiting for the next poll");
            return;
        };
        if turn.is_complete() {
            self.complete_game();
            return;
        }
        let gated = turn.readiness_gated() && !turn.player_ready;
        let local_active = self.ctx.is_local_active();

        ui_events::broadcast_turn_display(&self.ui, &self.ctx);
        if gated {
            if local_active {
                self.transition(ClientEvent::PromptReady);
                ui_events::broadcast_ready_prompt(&self.ui, &self.ctx);
            } else {
                self.transition(ClientEvent::WaitForReady);
                ui_events::broadcast_waiting_for_ready(&self.ui, &self.ctx);
            }
            return;
        }

        if local_active {
            self.prepare_round().await;
        }
        self.start_countdown();
    }

    /// Active client only: draw the target if the round has none yet and publish it.
    async fn prepare_round(&mut self) {
        let seconds = self.ctx.session().config.seconds_per_round;
        let Some(turn) = self.ctx.session_mut().turn.as_mut() else {
            return;
        };
        if turn.current_color.is_none() {
            turn.start_round(Rgb::random(), seconds);
        }
        self.persist_turn().await;
    }

    fn start_countdown(&mut self) {
        if !self.transition(ClientEvent::BeginCountdown) {
            return;
        }
        let steps = self.ctx.config().countdown_steps;
        self.countdown_remaining = steps;
        if steps == 0 {
            self.schedule(TimerKind::CountdownStep, Duration::ZERO);
            return;
        }
        ui_events::broadcast_countdown(&self.ui, steps);
        self.schedule(TimerKind::CountdownStep, self.ctx.config().countdown_step);
    }

    async fn countdown_step(&mut self) {
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining > 0 {
            ui_events::broadcast_countdown(&self.ui, self.countdown_remaining);
            self.schedule(TimerKind::CountdownStep, self.ctx.config().countdown_step);
            return;
        }
        self.begin_round().await;
    }

    async fn begin_round(&mut self) {
        if !self.ctx.is_local_active() {
            if self.transition(ClientEvent::CountdownFinished(Role::Spectator)) {
                ui_events::broadcast_spectating(&self.ui, &self.ctx);
            }
            return;
        }

        let needs_color = self
            .ctx
            .session()
            .playing_turn()
            .is_some_and(|turn| turn.current_color.is_none());
        if needs_color {
            self.prepare_round().await;
        }
        if !self.transition(ClientEvent::CountdownFinished(Role::Active)) {
            return;
        }

        let seconds = self.ctx.session().config.seconds_per_round;
        let Some(turn) = self.ctx.session_mut().turn.as_mut() else {
            return;
        };
        turn.seconds_remaining = Some(seconds);
        let Some(color) = turn.current_color else {
            return;
        };
        info!(room = %self.ctx.room_id(), %color, seconds, "round started");
        ui_events::broadcast_round_started(&self.ui, color, seconds);
        self.schedule(TimerKind::RoundTick, ROUND_TICK);
    }

    async fn round_tick(&mut self) {
        let Some(turn) = self.ctx.session_mut().turn.as_mut() else {
            return;
        };
        let remaining = turn.seconds_remaining.unwrap_or(0).saturating_sub(1);
        turn.seconds_remaining = Some(remaining);
        let target = turn.current_color;
        ui_events::broadcast_timer_tick(&self.ui, remaining);

        if remaining > 0 {
            self.persist_turn().await;
            self.schedule(TimerKind::RoundTick, ROUND_TICK);
            return;
        }

        if !self.transition(ClientEvent::RoundResolved) {
            return;
        }
        info!(room = %self.ctx.room_id(), "round timed out");
        self.pending_points = 0;
        if let Some(target) = target {
            ui_events::broadcast_round_resolved(&self.ui, RoundOutcome::timed_out(target));
        }
        self.schedule(TimerKind::ResolvedDwell, self.ctx.config().timeout_dwell);
    }

    fn submit_guess(&mut self, guess: Rgb) -> Result<(), ServiceError> {
        if !self.machine.can_apply(ClientEvent::RoundResolved) {
            return Err(ServiceError::InvalidState(
                "no round of yours is running".into(),
            ));
        }
        let target = self
            .ctx
            .session()
            .playing_turn()
            .and_then(|turn| turn.current_color)
            .ok_or_else(|| ServiceError::InvalidState("round has no target color".into()))?;

        let score = score_guess(&target, &guess);
        self.machine.apply(ClientEvent::RoundResolved)?;
        self.pending_points = score.points;
        info!(
            room = %self.ctx.room_id(),
            %target,
            %guess,
            accuracy = score.accuracy,
            points = score.points,
            "guess submitted"
        );
        ui_events::broadcast_round_resolved(
            &self.ui,
            RoundOutcome::guessed(target, guess, score.accuracy, score.points),
        );
        self.schedule(TimerKind::ResolvedDwell, self.ctx.config().guess_dwell);
        Ok(())
    }

    /// Score the active player's round, publish it and move on.
    async fn resolve_and_advance(&mut self, points: u32) {
        let me = self.ctx.me();
        let config = self.ctx.session().config;
        let Some(turn) = self.ctx.session_mut().turn.as_mut() else {
            return;
        };
        let resolution = match turn.resolve_round(points, &config) {
            Ok(resolution) => resolution,
            Err(err) => {
                warn!(room = %self.ctx.room_id(), error = %err, "nothing left to resolve");
                return;
            }
        };
        info!(
            room = %self.ctx.room_id(),
            player = %resolution.player,
            points,
            finished = resolution.player_finished,
            "round resolved"
        );

        self.persist_turn().await;
        ui_events::broadcast_leaderboard(&self.ui, &self.ctx);

        if resolution.player_finished && resolution.player == me {
            self.show_completion_notice();
        }

        if resolution.game_complete {
            self.complete_game();
        } else {
            self.transition(ClientEvent::TurnStarting);
            self.enter_turn().await;
        }
    }

    /// Enter the final standings once; later calls do nothing.
    fn complete_game(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.timer = None;
        self.transition(ClientEvent::Complete);
        info!(room = %self.ctx.room_id(), "game complete");
        ui_events::broadcast_game_complete(&self.ui, &self.ctx);
    }

    async fn confirm_ready(&mut self) -> Result<(), ServiceError> {
        if self.machine.turn_phase() != Some(TurnPhase::ReadyPrompt) {
            return Err(ServiceError::InvalidState("nothing to confirm".into()));
        }
        if let Some(turn) = self.ctx.session_mut().turn.as_mut() {
            turn.player_ready = true;
        }
        self.prepare_round().await;
        self.start_countdown();
        Ok(())
    }

    async fn host_force_start(&mut self) -> Result<(), ServiceError> {
        self.ensure_host()?;
        if self.machine.turn_phase() != Some(TurnPhase::WaitingForReady) {
            return Err(ServiceError::InvalidState(
                "force start is only possible while waiting for a player".into(),
            ));
        }
        let Some(turn) = self.ctx.session_mut().turn.as_mut() else {
            return Err(ServiceError::InvalidState("no game is running".into()));
        };
        turn.player_ready = true;
        let waited_on = turn.active_player();
        info!(room = %self.ctx.room_id(), player = ?waited_on, "host forced the start");
        self.persist_turn().await;
        self.start_countdown();
        Ok(())
    }

    /// Also accepted while watching a round, so a player who left mid-turn
    /// cannot stall the game on a round that never needed their confirmation.
    async fn host_skip(&mut self) -> Result<(), ServiceError> {
        self.ensure_host()?;
        match self.machine.turn_phase() {
            Some(TurnPhase::WaitingForReady | TurnPhase::RoundActive(Role::Spectator)) => {}
            _ => {
                return Err(ServiceError::InvalidState(
                    "nothing to skip right now".into(),
                ));
            }
        }
        self.timer = None;
        let skipped = self
            .ctx
            .session()
            .playing_turn()
            .and_then(|turn| turn.active_player());
        info!(room = %self.ctx.room_id(), player = ?skipped, "host skipped the round");
        self.resolve_and_advance(0).await;
        Ok(())
    }

    fn confirm_spectate(&mut self) -> Result<(), ServiceError> {
        if self.notice_deadline.is_none() {
            return Err(ServiceError::InvalidState("no notice to dismiss".into()));
        }
        self.dismiss_notice();
        Ok(())
    }

    async fn start_game(&mut self) -> Result<(), ServiceError> {
        let started = room_service::start_game(
            self.ctx.store().as_ref(),
            self.ctx.config(),
            self.ctx.room_id(),
            self.ctx.me(),
        )
        .await?;
        self.adopt_started(started).await;
        Ok(())
    }

    async fn restart_game(&mut self) -> Result<(), ServiceError> {
        let started = room_service::restart_game(
            self.ctx.store().as_ref(),
            self.ctx.config(),
            self.ctx.room_id(),
            self.ctx.me(),
        )
        .await?;
        self.adopt_started(started).await;
        Ok(())
    }

    async fn adopt_started(&mut self, started: StartedGame) {
        let StartedGame { session, crowded } = started;
        self.ctx.replace_session(session);
        if crowded {
            ui_events::broadcast_notice(
                &self.ui,
                NoticeLevel::Warning,
                format!(
                    "{} players is a lot; updates will arrive more slowly",
                    self.ctx.session().roster.len()
                ),
            );
        }
        self.begin_game().await;
    }

    async fn back_to_room(&mut self) -> Result<(), ServiceError> {
        let session =
            room_service::back_to_room(self.ctx.store().as_ref(), self.ctx.room_id(), self.ctx.me())
                .await?;
        self.ctx.replace_session(session);
        self.return_to_room();
        Ok(())
    }

    async fn leave(&mut self) -> Result<(), ServiceError> {
        let outcome =
            room_service::leave_room(self.ctx.store().as_ref(), self.ctx.room_id(), self.ctx.me())
                .await;
        self.detach();
        ui_events::broadcast_lobby(&self.ui);
        outcome.map(|outcome| {
            debug!(?outcome, "left room");
        })
    }

    /// The local copy already holds the new game.
    async fn begin_game(&mut self) {
        let event = match self.machine.phase() {
            ClientPhase::Room => ClientEvent::GameStarted,
            ClientPhase::GameComplete => ClientEvent::Restarted,
            ClientPhase::InGame(_) => ClientEvent::TurnStarting,
            ClientPhase::Lobby => return,
        };
        self.completed = false;
        self.timer = None;
        self.notice_deadline = None;
        self.pending_points = 0;
        if !self.transition(event) {
            return;
        }
        ui_events::broadcast_game_started(&self.ui, &self.ctx);
        ui_events::broadcast_leaderboard(&self.ui, &self.ctx);
        self.enter_turn().await;
    }

    fn return_to_room(&mut self) {
        self.completed = false;
        self.timer = None;
        self.notice_deadline = None;
        if self.transition(ClientEvent::ReturnToRoom) {
            ui_events::broadcast_room_updated(&self.ui, &self.ctx);
        }
    }

    fn detach(&mut self) {
        self.timer = None;
        self.notice_deadline = None;
        self.transition(ClientEvent::Leave);
        self.detached = true;
    }

    /// Read-merge-write of the local turn state. Failures are logged and play
    /// goes on with the local copy.
    async fn persist_turn(&mut self) {
        let Some(local) = self.ctx.session().turn.clone() else {
            return;
        };
        let room = self.ctx.room_id().to_owned();
        let store = Arc::clone(self.ctx.store());

        let stored = match store.get(&room).await {
            Ok(stored) => stored.map(Session::from),
            Err(err) => {
                warn!(room = %room, error = %err, "could not read room before writing; keeping local copy");
                return;
            }
        };

        match sync_service::plan_turn_write(stored, &local) {
            WritePlan::Write(record) => {
                self.ctx.session_mut().turn = record.turn.clone();
                if let Err(err) = store.put(&room, record.into()).await {
                    warn!(room = %room, error = %err, "failed to write turn state; continuing locally");
                }
            }
            WritePlan::RoomClosed => debug!(room = %room, "room is gone; not writing"),
            WritePlan::GameEnded => debug!(room = %room, "game ended meanwhile; not writing"),
            WritePlan::Behind => {
                debug!(room = %room, pointer = ?local.pointer(), "turn already moved on; not writing")
            }
        }
    }

    fn ensure_host(&self) -> Result<(), ServiceError> {
        if self.ctx.is_host() {
            Ok(())
        } else {
            Err(ServiceError::NotHost)
        }
    }

    fn schedule(&mut self, kind: TimerKind, after: Duration) {
        self.timer = Some(PendingTimer {
            kind,
            deadline: Instant::now() + after,
        });
    }

    fn transition(&mut self, event: ClientEvent) -> bool {
        match self.machine.apply(event) {
            Ok(phase) => {
                debug!(room = %self.ctx.room_id(), ?phase, "phase changed");
                true
            }
            Err(err) => {
                warn!(room = %self.ctx.room_id(), error = %err, "ignoring transition");
                false
            }
        }
    }

    /// Everything local is now handled; the next poll only reports what others did.
    fn settle(&mut self) {
        if !self.detached {
            self.tracker.rebase(self.ctx.session());
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::Receiver;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::{MemoryRoomStore, RoomStore},
        dto::{
            settings::{CreateRoomRequest, JoinRequest, RoomSettings},
            ui::UiEvent,
        },
        state::{game::PlayerId, scheduler::TurnState},
    };

    struct Table {
        store: MemoryRoomStore,
        room: String,
        host: Coordinator,
        guests: Vec<Coordinator>,
    }

    async fn client(store: &MemoryRoomStore, me: PlayerId, session: Session) -> Coordinator {
        let store: Arc<dyn RoomStore> = Arc::new(store.clone());
        let ctx = ClientContext::new(store, Arc::new(AppConfig::default()), me, session);
        let mut coordinator = Coordinator::new(ctx, UiHub::default());
        coordinator.enter_room().await.unwrap();
        coordinator
    }

    async fn table(guests: usize, rounds: u32) -> Table {
        let store = MemoryRoomStore::new();
        let request = CreateRoomRequest {
            host_name: "Host".into(),
            settings: RoomSettings {
                rounds_per_player: rounds,
                seconds_per_round: 10,
            },
        };
        let (session, host_id) = room_service::create_room(&store, request).await.unwrap();
        let room = session.id.clone();
        let host = client(&store, host_id, session).await;

        let mut clients = Vec::new();
        for index in 0..guests {
            let (session, id) = room_service::join_room(
                &store,
                &AppConfig::default(),
                JoinRequest::new(&room, &format!("Guest {index}")),
            )
            .await
            .unwrap();
            clients.push(client(&store, id, session).await);
        }

        Table {
            store,
            room,
            host,
            guests: clients,
        }
    }

    async fn stored(store: &MemoryRoomStore, room: &str) -> Session {
        Session::from(store.get(room).await.unwrap().unwrap())
    }

    async fn stored_turn(store: &MemoryRoomStore, room: &str) -> TurnState {
        stored(store, room).await.turn.unwrap()
    }

    fn drain(rx: &mut Receiver<UiEvent>) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Runs countdown steps until the round is running.
    async fn finish_countdown(client: &mut Coordinator) {
        while client.machine.turn_phase() == Some(TurnPhase::Countdown) {
            client.fire_timer().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn guests_follow_the_host_into_the_game() {
        let mut t = table(2, 2).await;
        t.host.handle_command(ClientCommand::StartGame).await.unwrap();
        assert_eq!(
            t.host.phase(),
            ClientPhase::InGame(TurnPhase::ReadyPrompt)
        );

        for guest in &mut t.guests {
            guest.poll().await;
            assert_eq!(
                guest.phase(),
                ClientPhase::InGame(TurnPhase::WaitingForReady)
            );
            assert_eq!(guest.poll_interval(), Duration::from_secs(1));
        }
        assert_eq!(t.host.poll_interval(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn active_player_round_flow_is_written_for_spectators() {
        let mut t = table(1, 2).await;
        let mut host_ui = t.host.ui().subscribe();
        t.host.handle_command(ClientCommand::StartGame).await.unwrap();
        t.guests[0].poll().await;

        t.host.handle_command(ClientCommand::ConfirmReady).await.unwrap();
        let turn = stored_turn(&t.store, &t.room).await;
        assert!(turn.player_ready);
        let target = turn.current_color.unwrap();

        t.guests[0].poll().await;
        assert_eq!(
            t.guests[0].phase(),
            ClientPhase::InGame(TurnPhase::Countdown)
        );

        finish_countdown(&mut t.host).await;
        assert_eq!(
            t.host.phase(),
            ClientPhase::InGame(TurnPhase::RoundActive(Role::Active))
        );
        t.host.fire_timer().await;
        assert_eq!(stored_turn(&t.store, &t.room).await.seconds_remaining, Some(9));

        t.host
            .handle_command(ClientCommand::SubmitGuess { guess: target })
            .await
            .unwrap();
        assert_eq!(
            t.host.phase(),
            ClientPhase::InGame(TurnPhase::RoundResolved)
        );
        let err = t
            .host
            .handle_command(ClientCommand::SubmitGuess { guess: target })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        t.host.fire_timer().await;
        let turn = stored_turn(&t.store, &t.room).await;
        let host_id = t.host.context().me();
        assert_eq!(turn.scores.get(&host_id).unwrap().per_round_scores, vec![100]);
        assert_eq!((turn.current_player_index, turn.current_round), (0, 2));
        assert!(turn.current_color.is_some(), "second round drawn without a gate");

        let events = drain(&mut host_ui);
        assert!(events.iter().any(|event| matches!(
            event,
            UiEvent::RoundResolved(outcome) if outcome.points == 100 && outcome.headline == "Excellent!"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_scores_zero_after_the_short_dwell() {
        let mut t = table(1, 1).await;
        t.host.handle_command(ClientCommand::StartGame).await.unwrap();
        t.host.handle_command(ClientCommand::ConfirmReady).await.unwrap();
        finish_countdown(&mut t.host).await;

        for _ in 0..10 {
            t.host.fire_timer().await;
        }
        assert_eq!(
            t.host.phase(),
            ClientPhase::InGame(TurnPhase::RoundResolved)
        );
        let dwell = t.host.timer_deadline().unwrap() - Instant::now();
        assert_eq!(dwell, Duration::from_millis(1_500));

        t.host.fire_timer().await;
        let turn = stored_turn(&t.store, &t.room).await;
        let record = turn.scores.get(&t.host.context().me()).unwrap();
        assert_eq!(record.per_round_scores, vec![0]);
        assert_eq!(turn.current_player_index, 1);
        assert!(t.host.notice_deadline().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn host_skip_resolves_unresponsive_player_with_zero() {
        let mut t = table(1, 2).await;
        let guest_id = t.guests[0].context().me();
        let host_id = t.host.context().me();

        // Put the guest first in the rotation.
        let mut session = stored(&t.store, &t.room).await;
        session.phase = crate::state::game::SessionPhase::Playing;
        session.turn = Some(TurnState::new(vec![guest_id, host_id], 1));
        t.store.put(&t.room, session.into()).await.unwrap();

        t.host.poll().await;
        assert_eq!(
            t.host.phase(),
            ClientPhase::InGame(TurnPhase::WaitingForReady)
        );

        let err = t.guests[0]
            .handle_command(ClientCommand::HostSkip)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotHost));

        t.host.handle_command(ClientCommand::HostSkip).await.unwrap();
        let turn = stored_turn(&t.store, &t.room).await;
        let record = turn.scores.get(&guest_id).unwrap();
        assert_eq!(record.rounds_completed, 1);
        assert_eq!(record.per_round_scores, vec![0]);
        assert_eq!((turn.current_player_index, turn.current_round), (0, 2));
        assert_eq!(
            t.host.phase(),
            ClientPhase::InGame(TurnPhase::Countdown)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_player_still_gets_the_completion_notice() {
        let mut t = table(1, 1).await;
        let guest_id = t.guests[0].context().me();
        let host_id = t.host.context().me();

        let mut session = stored(&t.store, &t.room).await;
        session.phase = crate::state::game::SessionPhase::Playing;
        session.turn = Some(TurnState::new(vec![guest_id, host_id], 1));
        t.store.put(&t.room, session.into()).await.unwrap();
        t.host.poll().await;
        t.guests[0].poll().await;
        assert_eq!(
            t.guests[0].phase(),
            ClientPhase::InGame(TurnPhase::ReadyPrompt)
        );

        let mut guest_ui = t.guests[0].ui().subscribe();
        t.host.handle_command(ClientCommand::HostSkip).await.unwrap();
        assert!(t.host.notice_deadline().is_none());

        t.guests[0].poll().await;
        let events = drain(&mut guest_ui);
        assert!(
            events
                .iter()
                .any(|event| matches!(event, UiEvent::CompletionNotice { .. }))
        );
        assert!(t.guests[0].notice_deadline().is_some());
        assert!(!t.guests[0].context().is_local_active());

        // Only once per game.
        t.guests[0].poll().await;
        assert!(
            !drain(&mut guest_ui)
                .iter()
                .any(|event| matches!(event, UiEvent::CompletionNotice { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_watches_the_running_game() {
        let mut t = table(1, 1).await;
        t.host.handle_command(ClientCommand::StartGame).await.unwrap();
        let order = stored_turn(&t.store, &t.room).await.turn_order;

        let (session, late) = room_service::join_room(
            &t.store,
            &AppConfig::default(),
            JoinRequest::new(&t.room, "Late"),
        )
        .await
        .unwrap();
        let late_client = client(&t.store, late, session).await;
        assert_eq!(
            late_client.phase(),
            ClientPhase::InGame(TurnPhase::WaitingForReady)
        );
        assert!(!late_client.context().is_local_active());

        let turn = stored_turn(&t.store, &t.room).await;
        assert_eq!(turn.turn_order, order);
        assert!(!turn.turn_order.contains(&late));

        t.host.poll().await;
        assert_eq!(t.host.context().session().roster.len(), 3);
        assert_eq!(
            t.host.phase(),
            ClientPhase::InGame(TurnPhase::ReadyPrompt)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn force_start_is_picked_up_by_the_active_client() {
        let mut t = table(1, 1).await;
        let guest_id = t.guests[0].context().me();
        let host_id = t.host.context().me();

        let mut session = stored(&t.store, &t.room).await;
        session.phase = crate::state::game::SessionPhase::Playing;
        session.turn = Some(TurnState::new(vec![guest_id, host_id], 1));
        t.store.put(&t.room, session.into()).await.unwrap();

        t.host.poll().await;
        t.guests[0].poll().await;
        assert_eq!(
            t.guests[0].phase(),
            ClientPhase::InGame(TurnPhase::ReadyPrompt)
        );

        t.host
            .handle_command(ClientCommand::HostForceStart)
            .await
            .unwrap();
        assert_eq!(
            t.host.phase(),
            ClientPhase::InGame(TurnPhase::Countdown)
        );
        assert!(stored_turn(&t.store, &t.room).await.player_ready);

        t.guests[0].poll().await;
        assert_eq!(
            t.guests[0].phase(),
            ClientPhase::InGame(TurnPhase::Countdown)
        );
        let turn = stored_turn(&t.store, &t.room).await;
        assert!(turn.current_color.is_some());
        assert_eq!(turn.scores.get(&guest_id).unwrap().rounds_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_is_entered_once() {
        let mut t = table(1, 1).await;
        t.host.handle_command(ClientCommand::StartGame).await.unwrap();
        let mut guest_ui = t.guests[0].ui().subscribe();
        t.guests[0].poll().await;

        let mut session = stored(&t.store, &t.room).await;
        let config = session.config;
        let turn = session.turn.as_mut().unwrap();
        turn.resolve_round(40, &config).unwrap();
        turn.resolve_round(60, &config).unwrap();
        t.store.put(&t.room, session.into()).await.unwrap();

        for _ in 0..3 {
            t.guests[0].poll().await;
        }
        assert_eq!(t.guests[0].phase(), ClientPhase::GameComplete);
        assert!(t.guests[0].is_completed());

        let completions = drain(&mut guest_ui)
            .into_iter()
            .filter(|event| matches!(event, UiEvent::GameComplete { .. }))
            .collect::<Vec<_>>();
        assert_eq!(completions.len(), 1);
        let UiEvent::GameComplete { leaderboard, winner } = &completions[0] else {
            unreachable!();
        };
        assert_eq!(winner.as_deref(), Some("Guest 0"));
        assert_eq!(leaderboard[0].total_score, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_polls_never_move_the_turn_back() {
        let mut t = table(1, 2).await;
        t.host.handle_command(ClientCommand::StartGame).await.unwrap();
        t.guests[0].poll().await;
        let early = stored(&t.store, &t.room).await;

        let mut later = early.clone();
        let config = later.config;
        later.turn.as_mut().unwrap().resolve_round(30, &config).unwrap();
        t.store.put(&t.room, later.clone().into()).await.unwrap();
        t.guests[0].poll().await;
        let pointer = t.guests[0].context().session().turn.as_ref().unwrap().pointer();

        // A straggler writes an older copy back.
        t.store.put(&t.room, early.into()).await.unwrap();
        let mut guest_ui = t.guests[0].ui().subscribe();
        t.guests[0].poll().await;

        let now = t.guests[0].context().session().turn.as_ref().unwrap().pointer();
        assert_eq!(now, pointer);
        assert!(
            !drain(&mut guest_ui)
                .iter()
                .any(|event| matches!(event, UiEvent::TurnDisplay(_)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn write_failures_do_not_stop_local_play() {
        let mut t = table(1, 1).await;
        t.host.handle_command(ClientCommand::StartGame).await.unwrap();
        t.store.reject_writes(true);

        t.host.handle_command(ClientCommand::ConfirmReady).await.unwrap();
        finish_countdown(&mut t.host).await;
        assert_eq!(
            t.host.phase(),
            ClientPhase::InGame(TurnPhase::RoundActive(Role::Active))
        );
        assert!(!stored_turn(&t.store, &t.room).await.player_ready);

        let target = t
            .host
            .context()
            .session()
            .turn
            .as_ref()
            .unwrap()
            .current_color
            .unwrap();
        t.host
            .handle_command(ClientCommand::SubmitGuess { guess: target })
            .await
            .unwrap();
        t.host.fire_timer().await;

        let local = t.host.context().session().turn.as_ref().unwrap();
        assert_eq!(local.current_player_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_notice_dismisses_itself() {
        let mut t = table(1, 1).await;
        let mut host_ui = t.host.ui().subscribe();
        t.host.handle_command(ClientCommand::StartGame).await.unwrap();
        t.host.handle_command(ClientCommand::ConfirmReady).await.unwrap();
        finish_countdown(&mut t.host).await;
        let target = t.host.context().session().turn.as_ref().unwrap().current_color.unwrap();
        t.host
            .handle_command(ClientCommand::SubmitGuess { guess: target })
            .await
            .unwrap();
        t.host.fire_timer().await;

        let deadline = t.host.notice_deadline().unwrap();
        assert_eq!(deadline - Instant::now(), Duration::from_secs(8));
        t.host.dismiss_notice();
        assert!(t.host.notice_deadline().is_none());

        let events = drain(&mut host_ui);
        assert!(events.iter().any(|event| matches!(event, UiEvent::CompletionNotice { total_score: 100, .. })));
        assert!(events.iter().any(|event| matches!(event, UiEvent::SpectatorMode)));
        assert_eq!(
            t.host.phase(),
            ClientPhase::InGame(TurnPhase::WaitingForReady)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn host_leaving_closes_the_room_for_guests() {
        let mut t = table(1, 1).await;
        let mut guest_ui = t.guests[0].ui().subscribe();

        t.host.handle_command(ClientCommand::Leave).await.unwrap();
        assert!(t.host.is_detached());
        assert_eq!(t.host.phase(), ClientPhase::Lobby);

        t.guests[0].poll().await;
        assert!(t.guests[0].is_detached());
        assert!(drain(&mut guest_ui).contains(&UiEvent::RoomClosed));
        assert!(t.store.get(&t.room).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_brings_finished_clients_back() {
        let mut t = table(1, 1).await;
        t.host.handle_command(ClientCommand::StartGame).await.unwrap();
        t.guests[0].poll().await;

        let mut session = stored(&t.store, &t.room).await;
        let config = session.config;
        let turn = session.turn.as_mut().unwrap();
        turn.resolve_round(1, &config).unwrap();
        turn.resolve_round(2, &config).unwrap();
        t.store.put(&t.room, session.into()).await.unwrap();
        t.host.poll().await;
        t.guests[0].poll().await;
        assert_eq!(t.host.phase(), ClientPhase::GameComplete);

        t.host.handle_command(ClientCommand::RestartGame).await.unwrap();
        t.guests[0].poll().await;
        assert!(!t.guests[0].is_completed());
        assert_eq!(
            t.guests[0].phase(),
            ClientPhase::InGame(TurnPhase::WaitingForReady)
        );
        assert_eq!(
            t.guests[0].context().session().turn.as_ref().unwrap().epoch,
            2
        );

        t.host.handle_command(ClientCommand::BackToRoom).await.unwrap();
        t.guests[0].poll().await;
        assert_eq!(t.guests[0].phase(), ClientPhase::Room);
    }
}
