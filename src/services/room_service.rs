use rand::Rng;
use tracing::{info, warn};
use validator::Validate;

use crate::{
    config::AppConfig,
    dao::room_store::RoomStore,
    dto::{
        settings::{CreateRoomRequest, JoinRequest},
        validation::ROOM_CODE_LENGTH,
    },
    error::ServiceError,
    state::{
        game::{Player, PlayerId, Session, SessionPhase},
        scheduler::TurnState,
    },
};

const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_CODE_ATTEMPTS: usize = 8;

/// Result of starting or restarting a game.
#[derive(Debug, Clone)]
pub struct StartedGame {
    pub session: Session,
    /// The roster is above the comfortable size; play still goes on.
    pub crowded: bool,
}

/// What leaving did to the shared record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The host left and the room was deleted.
    RoomDeleted,
    /// A guest's roster entry was removed.
    Left,
    /// The room was already gone.
    AlreadyGone,
}

/// Draw a 6-character room code over `A-Z0-9`.
pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..ROOM_CODE_LENGTH)
        .map(|_| char::from(ROOM_CODE_ALPHABET[rng.random_range(0..ROOM_CODE_ALPHABET.len())]))
        .collect()
}

/// Open a new room with the requesting player as host.
pub async fn create_room(
    store: &dyn RoomStore,
    request: CreateRoomRequest,
) -> Result<(Session, PlayerId), ServiceError> {
    request.validate()?;

    let code = unused_room_code(store).await?;
    let host = Player {
        id: PlayerId::new(),
        name: request.host_name.trim().to_string(),
        is_host: true,
    };
    let host_id = host.id;
    let session = Session::new(code, host, request.settings.into());

    store.put(&session.id, session.clone().into()).await?;
    info!(room = %session.id, host = %host_id, "room created");
    Ok((session, host_id))
}

/// Add a guest to an existing room. A game in progress does not stop the
/// join; the newcomer watches it and plays from the next start on.
pub async fn join_room(
    store: &dyn RoomStore,
    config: &AppConfig,
    request: JoinRequest,
) -> Result<(Session, PlayerId), ServiceError> {
    request.validate()?;

    let mut session = load(store, &request.room_code).await?;
    if session.roster.len() >= config.max_players {
        return Err(ServiceError::InvalidState(format!(
            "room is full ({} players)",
            config.max_players
        )));
    }

    let player = Player {
        id: PlayerId::new(),
        name: request.name.trim().to_string(),
        is_host: false,
    };
    let player_id = player.id;
    session.roster.insert(player_id, player);

    store.put(&session.id, session.clone().into()).await?;
    info!(
        room = %session.id,
        player = %player_id,
        spectating = session.phase == SessionPhase::Playing,
        "player joined"
    );
    Ok((session, player_id))
}

/// Leave a room: the host closes it for everyone, a guest only removes their entry.
pub async fn leave_room(
    store: &dyn RoomStore,
    room_id: &str,
    me: PlayerId,
) -> Result<LeaveOutcome, ServiceError> {
    let Some(entity) = store.get(room_id).await? else {
        return Ok(LeaveOutcome::AlreadyGone);
    };
    let mut session = Session::from(entity);

    if session.is_host(me) {
        store.delete(room_id).await?;
        info!(room = room_id, "host left; room deleted");
        return Ok(LeaveOutcome::RoomDeleted);
    }

    if session.roster.shift_remove(&me).is_some() {
        store.put(room_id, session.into()).await?;
        info!(room = room_id, player = %me, "player left");
    }
    Ok(LeaveOutcome::Left)
}

/// Start the first game of a room.
pub async fn start_game(
    store: &dyn RoomStore,
    config: &AppConfig,
    room_id: &str,
    me: PlayerId,
) -> Result<StartedGame, ServiceError> {
    let session = load(store, room_id).await?;
    ensure_host(&session, me)?;
    if session.phase == SessionPhase::Playing {
        return Err(ServiceError::InvalidState("game already started".into()));
    }
    begin(store, config, session).await
}

/// Start over with the same roster and zeroed scores.
pub async fn restart_game(
    store: &dyn RoomStore,
    config: &AppConfig,
    room_id: &str,
    me: PlayerId,
) -> Result<StartedGame, ServiceError> {
    let session = load(store, room_id).await?;
    ensure_host(&session, me)?;
    if session.phase != SessionPhase::Playing {
        return Err(ServiceError::InvalidState(
            "there is no game to restart".into(),
        ));
    }
    begin(store, config, session).await
}

/// Send everyone back to the room screen. The turn state stays in the record
/// so the next start keeps counting epochs upwards.
pub async fn back_to_room(
    store: &dyn RoomStore,
    room_id: &str,
    me: PlayerId,
) -> Result<Session, ServiceError> {
    let mut session = load(store, room_id).await?;
    ensure_host(&session, me)?;

    session.phase = SessionPhase::Room;
    store.put(room_id, session.clone().into()).await?;
    info!(room = room_id, "back to room");
    Ok(session)
}

async fn begin(
    store: &dyn RoomStore,
    config: &AppConfig,
    mut session: Session,
) -> Result<StartedGame, ServiceError> {
    let players = session.roster.len();
    if players < config.min_players {
        return Err(ServiceError::InvalidState(format!(
            "need at least {} players to start",
            config.min_players
        )));
    }
    if players > config.max_players {
        return Err(ServiceError::InvalidState(format!(
            "too many players ({players}); the limit is {}",
            config.max_players
        )));
    }
    let crowded = players > config.crowded_room_warning;
    if crowded {
        warn!(room = %session.id, players, "large room; polling will slow down");
    }

    let epoch = session.turn.as_ref().map(|turn| turn.epoch).unwrap_or(0) + 1;
    let turn_order = session.roster.keys().copied().collect();
    session.turn = Some(TurnState::new(turn_order, epoch));
    session.phase = SessionPhase::Playing;

    store.put(&session.id, session.clone().into()).await?;
    info!(room = %session.id, players, epoch, "game started");
    Ok(StartedGame { session, crowded })
}

async fn load(store: &dyn RoomStore, room_id: &str) -> Result<Session, ServiceError> {
    store
        .get(room_id)
        .await?
        .map(Session::from)
        .ok_or_else(|| ServiceError::RoomNotFound(room_id.to_string()))
}

fn ensure_host(session: &Session, me: PlayerId) -> Result<(), ServiceError> {
    if session.is_host(me) {
        Ok(())
    } else {
        Err(ServiceError::NotHost)
    }
}

async fn unused_room_code(store: &dyn RoomStore) -> Result<String, ServiceError> {
    for _ in 0..ROOM_CODE_ATTEMPTS {
        let code = generate_room_code(&mut rand::rng());
        if store.get(&code).await?.is_none() {
            return Ok(code);
        }
    }
    Err(ServiceError::InvalidState(
        "could not find a free room code".into(),
    ))
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{dao::room_store::MemoryRoomStore, dto::validation::validate_room_code};

    async fn room_with(store: &MemoryRoomStore, guests: &[&str]) -> (Session, PlayerId, Vec<PlayerId>) {
        let request = CreateRoomRequest {
            host_name: "Host".into(),
            settings: Default::default(),
        };
        let (session, host) = create_room(store, request).await.unwrap();
        let mut ids = Vec::new();
        for name in guests {
            let (_, id) = join_room(store, &AppConfig::default(), JoinRequest::new(&session.id, name))
                .await
                .unwrap();
            ids.push(id);
        }
        (session, host, ids)
    }

    #[test]
    fn generated_codes_are_valid() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            assert!(validate_room_code(&generate_room_code(&mut rng)).is_ok());
        }
    }

    #[tokio::test]
    async fn join_missing_room_is_not_found() {
        let store = MemoryRoomStore::new();
        let err = join_room(&store, &AppConfig::default(), JoinRequest::new("ZZZZZZ", "Ada"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RoomNotFound(code) if code == "ZZZZZZ"));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn join_keeps_roster_order_and_allows_duplicate_names() {
        let store = MemoryRoomStore::new();
        let (session, host, guests) = room_with(&store, &["Ada", "Ada"]).await;

        let stored = Session::from(store.get(&session.id).await.unwrap().unwrap());
        let order: Vec<_> = stored.roster.keys().copied().collect();
        assert_eq!(order, vec![host, guests[0], guests[1]]);
        assert_ne!(guests[0], guests[1]);
        assert_eq!(stored.host_id(), Some(host));
    }

    #[tokio::test]
    async fn guest_leave_edits_roster_and_host_leave_deletes() {
        let store = MemoryRoomStore::new();
        let (session, host, guests) = room_with(&store, &["Ada", "Bob"]).await;

        let outcome = leave_room(&store, &session.id, guests[0]).await.unwrap();
        assert_eq!(outcome, LeaveOutcome::Left);
        let stored = Session::from(store.get(&session.id).await.unwrap().unwrap());
        assert_eq!(stored.roster.len(), 2);
        assert!(!stored.roster.contains_key(&guests[0]));

        let outcome = leave_room(&store, &session.id, host).await.unwrap();
        assert_eq!(outcome, LeaveOutcome::RoomDeleted);
        assert!(store.get(&session.id).await.unwrap().is_none());

        let outcome = leave_room(&store, &session.id, guests[1]).await.unwrap();
        assert_eq!(outcome, LeaveOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn only_the_host_starts_and_needs_two_players() {
        let store = MemoryRoomStore::new();
        let config = AppConfig::default();
        let (session, host, _) = room_with(&store, &[]).await;

        let err = start_game(&store, &config, &session.id, host).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let (guest_session, guest) =
            join_room(&store, &config, JoinRequest::new(&session.id, "Ada"))
                .await
                .unwrap();
        let err = start_game(&store, &config, &guest_session.id, guest)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotHost));

        let started = start_game(&store, &config, &session.id, host).await.unwrap();
        let turn = started.session.turn.as_ref().unwrap();
        assert_eq!(turn.turn_order, vec![host, guest]);
        assert_eq!(turn.epoch, 1);
        assert!(!started.crowded);

    }

    #[tokio::test]
    async fn late_joiners_watch_without_entering_the_rotation() {
        let store = MemoryRoomStore::new();
        let config = AppConfig::default();
        let (session, host, guests) = room_with(&store, &["Ada"]).await;
        start_game(&store, &config, &session.id, host).await.unwrap();

        let (joined, late) = join_room(&store, &config, JoinRequest::new(&session.id, "Late"))
            .await
            .unwrap();
        assert_eq!(joined.phase, SessionPhase::Playing);
        assert!(joined.roster.contains_key(&late));
        let turn = joined.playing_turn().unwrap();
        assert_eq!(turn.turn_order, vec![host, guests[0]]);
        assert!(turn.scores.get(&late).is_none());

        let stored = Session::from(store.get(&session.id).await.unwrap().unwrap());
        assert_eq!(stored.roster.len(), 3);
        assert_eq!(stored.turn.unwrap().turn_order.len(), 2);
    }

    #[tokio::test]
    async fn restart_bumps_epoch_and_zeroes_scores() {
        let store = MemoryRoomStore::new();
        let config = AppConfig::default();
        let (session, host, _) = room_with(&store, &["Ada"]).await;
        let mut started = start_game(&store, &config, &session.id, host)
            .await
            .unwrap()
            .session;

        let turn = started.turn.as_mut().unwrap();
        turn.resolve_round(90, &started.config).unwrap();
        store.put(&started.id, started.clone().into()).await.unwrap();

        let restarted = restart_game(&store, &config, &session.id, host).await.unwrap();
        let turn = restarted.session.turn.unwrap();
        assert_eq!(turn.epoch, 2);
        assert_eq!(turn.current_player_index, 0);
        assert!(turn.scores.iter().all(|(_, record)| record.total_score == 0));
    }

    #[tokio::test]
    async fn back_to_room_keeps_epoch_for_the_next_start() {
        let store = MemoryRoomStore::new();
        let config = AppConfig::default();
        let (session, host, _) = room_with(&store, &["Ada"]).await;
        start_game(&store, &config, &session.id, host).await.unwrap();

        let back = back_to_room(&store, &session.id, host).await.unwrap();
        assert_eq!(back.phase, SessionPhase::Room);

        let again = start_game(&store, &config, &session.id, host).await.unwrap();
        assert_eq!(again.session.turn.unwrap().epoch, 2);
    }
}
