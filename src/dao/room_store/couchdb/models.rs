use serde::{Deserialize, Serialize};

use crate::dao::models::SessionEntity;

pub const ROOM_PREFIX: &str = "room::";

/// CouchDB document wrapping a room record with its revision marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub room: SessionEntity,
}

/// Revision-only view used before overwrites and deletes.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

impl CouchRoomDocument {
    pub fn new(id: String, room: SessionEntity, rev: Option<String>) -> Self {
        Self { id, rev, room }
    }
}

pub fn room_doc_id(session_id: &str) -> String {
    format!("{ROOM_PREFIX}{session_id}")
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use indexmap::IndexMap;

    use super::*;
    use crate::dao::models::{SessionPhaseEntity, TurnConfigEntity};

    #[test]
    fn document_flattens_room_next_to_couch_fields() {
        let room = SessionEntity {
            id: "QWERTY".into(),
            players: IndexMap::new(),
            phase: SessionPhaseEntity::Room,
            settings: TurnConfigEntity {
                rounds_per_player: 1,
                seconds_per_round: 10,
            },
            turn: None,
            created_at: SystemTime::UNIX_EPOCH,
        };
        let doc = CouchRoomDocument::new(room_doc_id(&room.id), room.clone(), Some("1-abc".into()));
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(value["_id"], "room::QWERTY");
        assert_eq!(value["_rev"], "1-abc");
        assert_eq!(value["id"], "QWERTY");

        let back: CouchRoomDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back.room, room);
    }
}
