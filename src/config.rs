//! Application-level configuration loading: polling cadence, phase timings and room limits.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::game::TurnConfig;

/// Default location on disk where the client looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "HUE_PARTY_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared by every client of the process.
pub struct AppConfig {
    /// Poll interval for small rooms.
    pub poll_interval: Duration,
    /// Poll interval once the roster exceeds [`AppConfig::medium_room_threshold`].
    pub medium_room_poll_interval: Duration,
    /// Poll interval once the roster exceeds [`AppConfig::large_room_threshold`].
    pub large_room_poll_interval: Duration,
    pub medium_room_threshold: usize,
    pub large_room_threshold: usize,
    /// Faster cadence used while waiting on someone's readiness.
    pub readiness_poll_interval: Duration,
    pub countdown_step: Duration,
    pub countdown_steps: u32,
    /// How long a scored guess stays on screen before the turn advances.
    pub guess_dwell: Duration,
    /// Same, after the timer ran out.
    pub timeout_dwell: Duration,
    /// Auto-dismiss delay of the "you're done" notice.
    pub completion_notice: Duration,
    pub min_players: usize,
    pub max_players: usize,
    /// Rosters larger than this get a warning when the game starts.
    pub crowded_room_warning: usize,
    pub default_settings: TurnConfig,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        max_players = app_config.max_players,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            medium_room_poll_interval: Duration::from_secs(3),
            large_room_poll_interval: Duration::from_secs(5),
            medium_room_threshold: 10,
            large_room_threshold: 20,
            readiness_poll_interval: Duration::from_secs(1),
            countdown_step: Duration::from_secs(1),
            countdown_steps: 3,
            guess_dwell: Duration::from_millis(3_000),
            timeout_dwell: Duration::from_millis(1_500),
            completion_notice: Duration::from_secs(8),
            min_players: 2,
            max_players: 30,
            crowded_room_warning: 20,
            default_settings: TurnConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
/// Durations are in milliseconds; missing keys keep their default.
struct RawConfig {
    poll_interval_ms: Option<u64>,
    medium_room_poll_interval_ms: Option<u64>,
    large_room_poll_interval_ms: Option<u64>,
    medium_room_threshold: Option<usize>,
    large_room_threshold: Option<usize>,
    readiness_poll_interval_ms: Option<u64>,
    countdown_step_ms: Option<u64>,
    countdown_steps: Option<u32>,
    guess_dwell_ms: Option<u64>,
    timeout_dwell_ms: Option<u64>,
    completion_notice_ms: Option<u64>,
    min_players: Option<usize>,
    max_players: Option<usize>,
    crowded_room_warning: Option<usize>,
    rounds_per_player: Option<u32>,
    seconds_per_round: Option<u32>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let millis = |raw: Option<u64>, fallback: Duration| {
            raw.map(Duration::from_millis).unwrap_or(fallback)
        };

        Self {
            poll_interval: millis(value.poll_interval_ms, defaults.poll_interval),
            medium_room_poll_interval: millis(
                value.medium_room_poll_interval_ms,
                defaults.medium_room_poll_interval,
            ),
            large_room_poll_interval: millis(
                value.large_room_poll_interval_ms,
                defaults.large_room_poll_interval,
            ),
            medium_room_threshold: value
                .medium_room_threshold
                .unwrap_or(defaults.medium_room_threshold),
            large_room_threshold: value
                .large_room_threshold
                .unwrap_or(defaults.large_room_threshold),
            readiness_poll_interval: millis(
                value.readiness_poll_interval_ms,
                defaults.readiness_poll_interval,
            ),
            countdown_step: millis(value.countdown_step_ms, defaults.countdown_step),
            countdown_steps: value.countdown_steps.unwrap_or(defaults.countdown_steps),
            guess_dwell: millis(value.guess_dwell_ms, defaults.guess_dwell),
            timeout_dwell: millis(value.timeout_dwell_ms, defaults.timeout_dwell),
            completion_notice: millis(value.completion_notice_ms, defaults.completion_notice),
            min_players: value.min_players.unwrap_or(defaults.min_players),
            max_players: value.max_players.unwrap_or(defaults.max_players),
            crowded_room_warning: value
                .crowded_room_warning
                .unwrap_or(defaults.crowded_room_warning),
            default_settings: TurnConfig {
                rounds_per_player: value
                    .rounds_per_player
                    .unwrap_or(defaults.default_settings.rounds_per_player),
                seconds_per_round: value
                    .seconds_per_round
                    .unwrap_or(defaults.default_settings.seconds_per_round),
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
