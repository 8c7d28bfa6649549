//! Scripted player: answers UI events with the commands a person would send.

use std::time::Duration;

use rand::{Rng, SeedableRng, rngs::StdRng};
use tokio::{
    sync::{broadcast, mpsc},
    time::{Instant, sleep_until},
};
use tracing::{debug, info};

use crate::{
    dto::ui::{ClientCommand, UiEvent},
    state::color::Rgb,
};

/// What a host does about a player who never confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOverride {
    ForceStart,
    Skip,
}

/// Behaviour of one scripted player.
#[derive(Debug, Clone, Copy)]
pub struct AutopilotProfile {
    /// Delay before confirming, guessing or dismissing.
    pub think_time: Duration,
    /// Largest per-channel error of a guess.
    pub jitter: u8,
    /// An unresponsive player ignores every prompt and lets its rounds time out.
    pub responsive: bool,
    /// Host only: how long to wait on a player before stepping in.
    pub host_patience: Option<(Duration, HostOverride)>,
}

impl Default for AutopilotProfile {
    fn default() -> Self {
        Self {
            think_time: Duration::from_millis(1_500),
            jitter: 40,
            responsive: true,
            host_patience: Some((Duration::from_secs(10), HostOverride::ForceStart)),
        }
    }
}

impl AutopilotProfile {
    pub fn unresponsive() -> Self {
        Self {
            responsive: false,
            host_patience: None,
            ..Self::default()
        }
    }
}

/// Perturb every channel of `target` by at most `jitter`.
pub fn jittered_guess<R: Rng + ?Sized>(target: Rgb, jitter: u8, rng: &mut R) -> Rgb {
    let mut channel = |value: u8| {
        let offset = i16::from(jitter);
        (i16::from(value) + rng.random_range(-offset..=offset)).clamp(0, 255) as u8
    };
    Rgb::new(channel(target.r), channel(target.g), channel(target.b))
}

/// Play until the game completes or the client goes away.
pub async fn run(
    profile: AutopilotProfile,
    mut events: broadcast::Receiver<UiEvent>,
    commands: mpsc::Sender<ClientCommand>,
    seed: u64,
) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pending: Option<(Instant, ClientCommand)> = None;

    loop {
        let deadline = pending.map(|(at, _)| at);
        tokio::select! {
            received = events.recv() => {
                let event = match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "autopilot lagged behind UI events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                };
                match react(&profile, &event, &mut rng) {
                    Reaction::Schedule(after, command) => {
                        pending = Some((Instant::now() + after, command));
                    }
                    Reaction::CancelOverride => {
                        if matches!(
                            pending,
                            Some((_, ClientCommand::HostForceStart | ClientCommand::HostSkip))
                        ) {
                            pending = None;
                        }
                    }
                    Reaction::Stop => {
                        info!("autopilot done");
                        return;
                    }
                    Reaction::Ignore => {}
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some((_, command)) = pending.take() {
                    if commands.send(command).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

enum Reaction {
    Schedule(Duration, ClientCommand),
    CancelOverride,
    Stop,
    Ignore,
}

fn react<R: Rng + ?Sized>(profile: &AutopilotProfile, event: &UiEvent, rng: &mut R) -> Reaction {
    match event {
        UiEvent::GameComplete { .. } | UiEvent::RoomClosed | UiEvent::Lobby => Reaction::Stop,
        UiEvent::WaitingForReady {
            host_controls: true,
            ..
        } => match profile.host_patience {
            Some((patience, HostOverride::ForceStart)) => {
                Reaction::Schedule(patience, ClientCommand::HostForceStart)
            }
            Some((patience, HostOverride::Skip)) => {
                Reaction::Schedule(patience, ClientCommand::HostSkip)
            }
            None => Reaction::Ignore,
        },
        UiEvent::Countdown { .. } | UiEvent::TurnDisplay(_) => Reaction::CancelOverride,
        _ if !profile.responsive => Reaction::Ignore,
        UiEvent::ReadyPrompt { .. } => {
            Reaction::Schedule(profile.think_time, ClientCommand::ConfirmReady)
        }
        UiEvent::RoundStarted { color, .. } => Reaction::Schedule(
            profile.think_time,
            ClientCommand::SubmitGuess {
                guess: jittered_guess(*color, profile.jitter, rng),
            },
        ),
        UiEvent::CompletionNotice { .. } => {
            Reaction::Schedule(profile.think_time, ClientCommand::ConfirmSpectate)
        }
        _ => Reaction::Ignore,
    }
}
