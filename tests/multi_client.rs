use std::{sync::Arc, time::Duration};

use hue_party::{
    config::AppConfig,
    dao::room_store::{MemoryRoomStore, RoomStore},
    dto::{
        settings::{CreateRoomRequest, JoinRequest, RoomSettings},
        ui::{ClientCommand, UiEvent},
    },
    services::{
        autopilot::{self, AutopilotProfile, HostOverride},
        client_runtime::{self, ClientHandle},
        coordinator::Coordinator,
        room_service,
    },
    state::{ClientContext, ClientPhase, UiHub, game::PlayerId, ledger::LeaderboardEntry},
};
use tokio::{sync::broadcast, time::timeout};

const ROUNDS: u32 = 2;

struct Seat {
    id: PlayerId,
    handle: ClientHandle,
}

/// One seat per profile, the first one hosting; each gets its own client task and autopilot.
async fn seat_table(store: &MemoryRoomStore, profiles: &[AutopilotProfile]) -> (String, Vec<Seat>) {
    let config = Arc::new(AppConfig::default());
    let shared: Arc<dyn RoomStore> = Arc::new(store.clone());

    let request = CreateRoomRequest {
        host_name: "Host".into(),
        settings: RoomSettings {
            rounds_per_player: ROUNDS,
            seconds_per_round: 10,
        },
    };
    let (session, host_id) = room_service::create_room(store, request).await.unwrap();
    let room = session.id.clone();

    let mut joined = vec![(host_id, session)];
    for index in 1..profiles.len() {
        let (session, id) = room_service::join_room(
            store,
            &config,
            JoinRequest::new(&room, &format!("Guest {index}")),
        )
        .await
        .unwrap();
        joined.push((id, session));
    }

    let mut seats = Vec::new();
    for (seat, ((id, session), profile)) in joined.into_iter().zip(profiles).enumerate() {
        let ctx = ClientContext::new(shared.clone(), config.clone(), id, session);
        let mut coordinator = Coordinator::new(ctx, UiHub::default());
        coordinator.enter_room().await.unwrap();
        let pilot_events = coordinator.ui().subscribe();
        let handle = client_runtime::spawn(coordinator);
        tokio::spawn(autopilot::run(
            *profile,
            pilot_events,
            handle.commands(),
            seat as u64 + 7,
        ));
        seats.push(Seat { id, handle });
    }
    (room, seats)
}

async fn final_board(events: &mut broadcast::Receiver<UiEvent>) -> Vec<LeaderboardEntry> {
    timeout(Duration::from_secs(900), async {
        loop {
            match events.recv().await {
                Ok(UiEvent::GameComplete { leaderboard, .. }) => return leaderboard,
                Ok(UiEvent::RoomClosed) => panic!("room closed before the game completed"),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("client stopped early"),
            }
        }
    })
    .await
    .expect("game did not complete")
}

fn standings(board: &[LeaderboardEntry]) -> Vec<(PlayerId, u64, u32)> {
    let mut rows: Vec<_> = board
        .iter()
        .map(|entry| (entry.player_id, entry.total_score, entry.rounds_completed))
        .collect();
    rows.sort();
    rows
}

async fn close_table(store: &MemoryRoomStore, room: &str, seats: Vec<Seat>) {
    let mut seats = seats.into_iter();
    let host = seats.next().unwrap();
    host.handle.send(ClientCommand::Leave).await.unwrap();
    let host = host.handle.join().await.unwrap();
    assert_eq!(host.phase(), ClientPhase::Lobby);
    assert!(store.get(room).await.unwrap().is_none());

    for seat in seats {
        let guest = timeout(Duration::from_secs(30), seat.handle.join())
            .await
            .expect("guest never noticed the room closing")
            .unwrap();
        assert!(guest.is_detached());
    }
}

#[tokio::test(start_paused = true)]
async fn every_client_sees_the_same_final_leaderboard() {
    let store = MemoryRoomStore::new();
    let profiles = [AutopilotProfile::default(); 3];
    let (room, mut seats) = seat_table(&store, &profiles).await;

    seats[0].handle.send(ClientCommand::StartGame).await.unwrap();

    let mut boards = Vec::new();
    for seat in &mut seats {
        boards.push(standings(&final_board(seat.handle.events()).await));
    }

    let expected = &boards[0];
    assert_eq!(expected.len(), 3);
    assert!(boards.iter().all(|board| board == expected));
    assert!(expected.iter().all(|(_, _, rounds)| *rounds == ROUNDS));
    assert!(expected.iter().all(|(_, score, _)| *score > 0));
    for seat in &seats {
        assert!(expected.iter().any(|(id, _, _)| *id == seat.id));
    }

    close_table(&store, &room, seats).await;
}

#[tokio::test(start_paused = true)]
async fn host_force_start_carries_an_idle_player_through() {
    let store = MemoryRoomStore::new();
    let host = AutopilotProfile {
        host_patience: Some((Duration::from_secs(4), HostOverride::ForceStart)),
        ..AutopilotProfile::default()
    };
    let profiles = [host, AutopilotProfile::default(), AutopilotProfile::unresponsive()];
    let (room, mut seats) = seat_table(&store, &profiles).await;
    let idle = seats[2].id;

    seats[0].handle.send(ClientCommand::StartGame).await.unwrap();

    let mut boards = Vec::new();
    for seat in &mut seats {
        boards.push(standings(&final_board(seat.handle.events()).await));
    }

    assert!(boards.iter().all(|board| board == &boards[0]));
    let idle_row = boards[0].iter().find(|(id, _, _)| *id == idle).unwrap();
    assert_eq!(idle_row.1, 0, "every idle round times out");
    assert_eq!(idle_row.2, ROUNDS);

    close_table(&store, &room, seats).await;
}

#[tokio::test(start_paused = true)]
async fn host_skip_moves_past_an_idle_player() {
    let store = MemoryRoomStore::new();
    let host = AutopilotProfile {
        host_patience: Some((Duration::from_secs(4), HostOverride::Skip)),
        ..AutopilotProfile::default()
    };
    let profiles = [host, AutopilotProfile::unresponsive()];
    let (room, mut seats) = seat_table(&store, &profiles).await;
    let idle = seats[1].id;

    seats[0].handle.send(ClientCommand::StartGame).await.unwrap();

    let host_board = standings(&final_board(seats[0].handle.events()).await);
    let idle_board = standings(&final_board(seats[1].handle.events()).await);
    assert_eq!(host_board, idle_board);

    let idle_row = host_board.iter().find(|(id, _, _)| *id == idle).unwrap();
    assert_eq!(idle_row.1, 0);

    close_table(&store, &room, seats).await;
}
