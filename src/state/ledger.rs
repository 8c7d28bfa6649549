//! Per-player score accumulators and the leaderboard projected from them.

use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    dao::models::ScoreRecordEntity,
    state::game::{PlayerId, Roster},
};

/// Running score of one player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreRecord {
    pub total_score: u64,
    pub rounds_completed: u32,
    /// One entry per resolved round, in play order.
    pub per_round_scores: Vec<u32>,
}

impl ScoreRecord {
    /// Record a resolved round worth `points`.
    pub fn record_round(&mut self, points: u32) {
        self.total_score += u64::from(points);
        self.per_round_scores.push(points);
        self.rounds_completed += 1;
    }

    /// Average points per resolved round, `None` before the first round.
    pub fn average_points(&self) -> Option<f64> {
        if self.rounds_completed == 0 {
            return None;
        }
        Some(self.total_score as f64 / f64::from(self.rounds_completed))
    }
}

/// Score records keyed by player id, in turn order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreLedger {
    records: IndexMap<PlayerId, ScoreRecord>,
}

impl ScoreLedger {
    /// Zeroed records for every player of the turn order.
    pub fn for_players<'a>(players: impl IntoIterator<Item = &'a PlayerId>) -> Self {
        Self {
            records: players
                .into_iter()
                .map(|id| (*id, ScoreRecord::default()))
                .collect(),
        }
    }

    pub fn get(&self, id: &PlayerId) -> Option<&ScoreRecord> {
        self.records.get(id)
    }

    /// Add the points of a resolved round to a player's record, creating the
    /// record if the player was missing from the ledger.
    pub fn record_round(&mut self, id: PlayerId, points: u32) -> &ScoreRecord {
        let record = self.records.entry(id).or_default();
        record.record_round(points);
        record
    }

    /// Pin a player's completed-round counter once their last round resolved.
    pub fn mark_completed(&mut self, id: PlayerId, rounds_per_player: u32) {
        let record = self.records.entry(id).or_default();
        record.rounds_completed = record.rounds_completed.max(rounds_per_player);
    }

    pub fn rounds_completed(&self, id: &PlayerId) -> u32 {
        self.records
            .get(id)
            .map(|record| record.rounds_completed)
            .unwrap_or(0)
    }

    /// Keep, per player, whichever record has seen more rounds. Two writers that
    /// resolved the same round differently settle on the higher total, so
    /// merging in either direction ends on the same ledger.
    pub fn merge_newer(&mut self, other: &ScoreLedger) {
        for (id, theirs) in &other.records {
            match self.records.get_mut(id) {
                Some(ours)
                    if (ours.rounds_completed, ours.total_score)
                        >= (theirs.rounds_completed, theirs.total_score) => {}
                Some(ours) => *ours = theirs.clone(),
                None => {
                    self.records.insert(*id, theirs.clone());
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlayerId, &ScoreRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Compact `(id, total, rounds)` view used to detect score changes between polls.
    pub fn fingerprint(&self) -> Vec<(PlayerId, u64, u32)> {
        self.records
            .iter()
            .map(|(id, record)| (*id, record.total_score, record.rounds_completed))
            .collect()
    }

    /// Standings for every roster member, best total first; equal totals keep
    /// roster order.
    pub fn leaderboard(&self, roster: &Roster) -> Vec<LeaderboardEntry> {
        let mut entries: Vec<LeaderboardEntry> = roster
            .values()
            .map(|player| {
                let record = self.records.get(&player.id).cloned().unwrap_or_default();
                LeaderboardEntry {
                    rank: 0,
                    player_id: player.id,
                    name: player.name.clone(),
                    is_host: player.is_host,
                    total_score: record.total_score,
                    rounds_completed: record.rounds_completed,
                }
            })
            .collect();

        // Stable sort keeps roster order among ties.
        entries.sort_by(|a, b| b.total_score.cmp(&a.total_score));
        for (index, entry) in entries.iter_mut().enumerate() {
            entry.rank = index + 1;
        }
        entries
    }
}

/// One row of the standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    pub player_id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub total_score: u64,
    pub rounds_completed: u32,
}

/// Personal figures shown to a player below the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStats {
    pub total_score: u64,
    /// Round the player is on, or their last round once finished.
    pub display_round: u32,
    /// Average points per round as a percentage, capped at 100.
    pub average_accuracy: Option<f64>,
}

impl PlayerStats {
    pub fn from_record(record: &ScoreRecord, rounds_per_player: u32) -> Self {
        let display_round = if record.rounds_completed < rounds_per_player {
            record.rounds_completed + 1
        } else {
            rounds_per_player
        };
        Self {
            total_score: record.total_score,
            display_round,
            average_accuracy: record.average_points().map(|avg| avg.min(100.0)),
        }
    }
}

impl From<ScoreRecordEntity> for ScoreRecord {
    fn from(value: ScoreRecordEntity) -> Self {
        Self {
            total_score: value.total_score,
            rounds_completed: value.rounds_completed,
            per_round_scores: value.per_round_scores,
        }
    }
}

impl From<ScoreRecord> for ScoreRecordEntity {
    fn from(value: ScoreRecord) -> Self {
        Self {
            total_score: value.total_score,
            rounds_completed: value.rounds_completed,
            per_round_scores: value.per_round_scores,
        }
    }
}

impl FromIterator<(PlayerId, ScoreRecord)> for ScoreLedger {
    fn from_iter<T: IntoIterator<Item = (PlayerId, ScoreRecord)>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ScoreLedger {
    type Item = (PlayerId, ScoreRecord);
    type IntoIter = indexmap::map::IntoIter<PlayerId, ScoreRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
