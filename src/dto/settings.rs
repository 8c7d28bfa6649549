use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::{
    dto::validation::{validate_player_name, validate_room_code},
    state::game::TurnConfig,
};

/// Turn configuration picked by the host when creating a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RoomSettings {
    #[serde(default = "default_rounds")]
    #[validate(range(min = 1, max = 10))]
    pub rounds_per_player: u32,
    #[serde(default = "default_seconds")]
    #[validate(range(min = 5, max = 120))]
    pub seconds_per_round: u32,
}

fn default_rounds() -> u32 {
    TurnConfig::default().rounds_per_player
}

fn default_seconds() -> u32 {
    TurnConfig::default().seconds_per_round
}

impl Default for RoomSettings {
    fn default() -> Self {
        TurnConfig::default().into()
    }
}

impl From<RoomSettings> for TurnConfig {
    fn from(value: RoomSettings) -> Self {
        Self {
            rounds_per_player: value.rounds_per_player,
            seconds_per_round: value.seconds_per_round,
        }
    }
}

impl From<TurnConfig> for RoomSettings {
    fn from(value: TurnConfig) -> Self {
        Self {
            rounds_per_player: value.rounds_per_player,
            seconds_per_round: value.seconds_per_round,
        }
    }
}

/// Payload used to open a new room.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoomRequest {
    #[validate(custom(function = "validate_player_name"))]
    pub host_name: String,
    #[serde(default)]
    #[validate(nested)]
    pub settings: RoomSettings,
}

/// Payload used to join an existing room by code.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JoinRequest {
    #[serde(deserialize_with = "typed_room_code")]
    #[validate(custom(function = "validate_room_code"))]
    pub room_code: String,
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
}

impl JoinRequest {
    pub fn new(room_code: &str, name: &str) -> Self {
        Self {
            room_code: normalize_room_code(room_code),
            name: name.to_string(),
        }
    }
}

/// Codes are typed by hand; accept them in any case and with stray spaces.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn typed_room_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|code| normalize_room_code(&code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_five_rounds_of_thirty_seconds() {
        let settings: RoomSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, RoomSettings::default());
        assert_eq!(settings.rounds_per_player, 5);
        assert_eq!(settings.seconds_per_round, 30);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn settings_outside_ranges_are_rejected() {
        let too_many_rounds = RoomSettings {
            rounds_per_player: 11,
            seconds_per_round: 30,
        };
        let errors = too_many_rounds.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("rounds_per_player"));

        let too_short = RoomSettings {
            rounds_per_player: 1,
            seconds_per_round: 4,
        };
        let errors = too_short.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("seconds_per_round"));
    }

    #[test]
    fn join_request_normalizes_code() {
        let request = JoinRequest::new("  ab12cd ", "Ada");
        assert_eq!(request.room_code, "AB12CD");
        assert!(request.validate().is_ok());

        let blank = JoinRequest::new("AB12CD", "  ");
        assert!(blank.validate().is_err());
    }

    #[test]
    fn decoded_join_request_normalizes_code_too() {
        let request: JoinRequest =
            serde_json::from_str(r#"{"room_code":" xy9z0q\n","name":"Ada"}"#).unwrap();
        assert_eq!(request.room_code, "XY9Z0Q");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn create_request_validates_nested_settings() {
        let request = CreateRoomRequest {
            host_name: "Host".into(),
            settings: RoomSettings {
                rounds_per_player: 0,
                seconds_per_round: 30,
            },
        };
        assert!(request.validate().is_err());
    }
}
