//! Single-task driver of one client.
//!
//! UI commands, the engine's phase timer, the completion-notice timer and the
//! poll deadline are multiplexed on one task, so each step of the coordinator
//! runs to completion before the next one starts.

use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, warn};

use crate::{
    dto::ui::{ClientCommand, NoticeLevel, UiEvent},
    error::ServiceError,
    services::{coordinator::Coordinator, ui_events},
};

const COMMAND_CAPACITY: usize = 32;

/// Handle to a running client task.
pub struct ClientHandle {
    commands: mpsc::Sender<ClientCommand>,
    events: broadcast::Receiver<UiEvent>,
    task: JoinHandle<Coordinator>,
}

impl ClientHandle {
    /// Queue a command for the client; fails once the client stopped.
    pub async fn send(&self, command: ClientCommand) -> Result<(), ServiceError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServiceError::InvalidState("client is no longer running".into()))
    }

    /// Sender half, for drivers that live in their own task.
    pub fn commands(&self) -> mpsc::Sender<ClientCommand> {
        self.commands.clone()
    }

    /// Receiver subscribed before the first step ran.
    pub fn events(&mut self) -> &mut broadcast::Receiver<UiEvent> {
        &mut self.events
    }

    /// Stop sending commands and wait until the client left its room or saw it
    /// close, then hand the engine back for inspection. Without a `Leave`
    /// queued beforehand this waits for the host to close the room.
    pub async fn join(self) -> Result<Coordinator, tokio::task::JoinError> {
        drop(self.commands);
        self.task.await
    }
}

/// Spawn the driver task for an engine that already entered its room.
pub fn spawn(coordinator: Coordinator) -> ClientHandle {
    let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
    let events = coordinator.ui().subscribe();
    let task = tokio::spawn(run(coordinator, rx));
    ClientHandle {
        commands: tx,
        events,
        task,
    }
}

/// Drive `coordinator` until it detaches. Once the command channel closes
/// the client keeps following the room, so it still notices it closing.
pub async fn run(
    mut coordinator: Coordinator,
    mut commands: mpsc::Receiver<ClientCommand>,
) -> Coordinator {
    let room = coordinator.context().room_id().to_owned();
    let me = coordinator.context().me();
    info!(room = %room, player = %me, "client loop started");

    let mut next_poll = Instant::now() + coordinator.poll_interval();
    let mut accepting = true;

    while !coordinator.is_detached() {
        let timer = coordinator.timer_deadline();
        let notice = coordinator.notice_deadline();

        tokio::select! {
            command = commands.recv(), if accepting => match command {
                Some(command) => {
                    if let Err(err) = coordinator.handle_command(command).await {
                        warn!(room = %room, player = %me, ?command, error = %err, "command rejected");
                        ui_events::broadcast_notice(coordinator.ui(), NoticeLevel::Error, err.to_string());
                    }
                }
                None => {
                    debug!(room = %room, player = %me, "command channel closed; following the room until it closes");
                    accepting = false;
                }
            },
            _ = sleep_until(timer.unwrap_or(next_poll)), if timer.is_some() => {
                coordinator.fire_timer().await;
            }
            _ = sleep_until(notice.unwrap_or(next_poll)), if notice.is_some() => {
                coordinator.dismiss_notice();
            }
            _ = sleep_until(next_poll) => {
                coordinator.poll().await;
                next_poll = Instant::now() + coordinator.poll_interval();
            }
        }
    }

    info!(room = %room, player = %me, phase = ?coordinator.phase(), "client loop stopped");
    coordinator
}
