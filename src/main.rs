//! hue-party demo binary: seats a table of scripted players around one shared
//! room record and plays a full game.

use std::{env, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hue_party::{
    config::AppConfig,
    dao::room_store::{MemoryRoomStore, RoomStore},
    dto::{
        settings::{CreateRoomRequest, JoinRequest},
        ui::{ClientCommand, UiEvent},
    },
    services::{
        autopilot::{self, AutopilotProfile},
        client_runtime,
        coordinator::Coordinator,
        room_service,
    },
    state::{ClientContext, UiHub, ledger::LeaderboardEntry},
};

const PLAYERS_ENV: &str = "HUE_PARTY_PLAYERS";
const DEFAULT_PLAYERS: usize = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::load());
    let store = open_store().await?;
    let players = env::var(PLAYERS_ENV)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(DEFAULT_PLAYERS)
        .clamp(config.min_players, config.max_players);

    let request = CreateRoomRequest {
        host_name: "Host".into(),
        settings: config.default_settings.into(),
    };
    let (session, host_id) = room_service::create_room(store.as_ref(), request)
        .await
        .context("creating room")?;
    let room = session.id.clone();
    info!(room = %room, players, "room open");

    let mut seats = vec![(host_id, session)];
    for index in 1..players {
        let (session, id) = room_service::join_room(
            store.as_ref(),
            &config,
            JoinRequest::new(&room, &format!("Player {index}")),
        )
        .await
        .with_context(|| format!("seating player {index}"))?;
        seats.push((id, session));
    }

    let mut handles = Vec::with_capacity(seats.len());
    for (seat, (me, session)) in seats.into_iter().enumerate() {
        let ctx = ClientContext::new(store.clone(), config.clone(), me, session);
        let mut coordinator = Coordinator::new(ctx, UiHub::default());
        coordinator
            .enter_room()
            .await
            .with_context(|| format!("entering room for seat {seat}"))?;

        let pilot_events = coordinator.ui().subscribe();
        let handle = client_runtime::spawn(coordinator);
        let profile = AutopilotProfile {
            think_time: Duration::from_millis(800 + 350 * seat as u64),
            ..AutopilotProfile::default()
        };
        tokio::spawn(autopilot::run(
            profile,
            pilot_events,
            handle.commands(),
            seat as u64,
        ));
        handles.push(handle);
    }

    let Some(host) = handles.first_mut() else {
        anyhow::bail!("no client was seated");
    };
    host.send(ClientCommand::StartGame)
        .await
        .context("starting game")?;

    tokio::select! {
        finished = wait_for_completion(host.events()) => match finished {
            Some((leaderboard, winner)) => report(&leaderboard, winner.as_deref()),
            None => warn!("host client stopped before the game completed"),
        },
        _ = shutdown_signal() => info!("shutdown requested"),
    }

    // Guests first so the host's departure is the one that deletes the room.
    for handle in handles.into_iter().rev() {
        if let Err(err) = handle.send(ClientCommand::Leave).await {
            warn!(error = %err, "client already stopped");
        }
        match handle.join().await {
            Ok(coordinator) => info!(
                player = %coordinator.context().me(),
                phase = ?coordinator.phase(),
                "client finished"
            ),
            Err(err) => error!(error = %err, "client task failed"),
        }
    }

    Ok(())
}

/// Open the room store and make sure it answers before anyone is seated.
async fn open_store() -> anyhow::Result<Arc<dyn RoomStore>> {
    let store = select_store().await?;
    store
        .health_check()
        .await
        .context("room store failed its health check")?;
    Ok(store)
}

/// Pick CouchDB when `COUCH_BASE_URL` is set, the in-process store otherwise.
async fn select_store() -> anyhow::Result<Arc<dyn RoomStore>> {
    #[cfg(feature = "couch-store")]
    {
        use hue_party::dao::room_store::couchdb::{CouchConfig, CouchRoomStore};

        if env::var_os("COUCH_BASE_URL").is_some() {
            let config = CouchConfig::from_env().context("reading CouchDB settings")?;
            let store = CouchRoomStore::connect(config)
                .await
                .context("connecting to CouchDB")?;
            info!("using CouchDB room store");
            return Ok(Arc::new(store));
        }
    }

    info!("using in-memory room store");
    Ok(Arc::new(MemoryRoomStore::new()))
}

async fn wait_for_completion(
    events: &mut broadcast::Receiver<UiEvent>,
) -> Option<(Vec<LeaderboardEntry>, Option<String>)> {
    loop {
        match events.recv().await {
            Ok(UiEvent::GameComplete {
                leaderboard,
                winner,
            }) => return Some((leaderboard, winner)),
            Ok(UiEvent::RoomClosed) | Err(broadcast::error::RecvError::Closed) => return None,
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "demo output lagged behind the host client");
            }
        }
    }
}

fn report(leaderboard: &[LeaderboardEntry], winner: Option<&str>) {
    for entry in leaderboard {
        info!(
            rank = entry.rank,
            name = %entry.name,
            score = entry.total_score,
            rounds = entry.rounds_completed,
            "final standing"
        );
    }
    match winner {
        Some(name) => info!(winner = name, "game complete"),
        None => info!("game complete without a winner"),
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
