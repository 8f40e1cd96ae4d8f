use crate::error::{StudyError, StudyResult};
use crate::state::AppState;
use crate::store::{Query, StoreError};
use crate::types::*;
use std::collections::HashSet;

impl AppState {
    /// Final score of a player, summed over the checkpoint rounds.
    ///
    /// Missing checkpoints are not an error: the totals cover whatever
    /// checkpoints were recorded, and a player without any gets all zeros
    /// with `rounds == 0`.
    pub async fn final_score(&self, player: &str) -> StudyResult<ScoreRecord> {
        let query = Query::new()
            .eq("player_id", player)
            .exists("ai_score")
            .one_of("rounds", self.study.checkpoint_rounds.iter().copied())
            .fields(SCORE_FIELDS)
            .sort_desc("created_at")
            .use_index(PLAYER_INDEX);

        let records = self
            .store
            .find(&query)
            .await?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ScoreRecord>, _>>()
            .map_err(StoreError::from)?;

        let total = aggregate_checkpoints(player, records)?;
        tracing::info!(
            player = %player,
            rounds = total.rounds,
            ai_score = total.ai_score,
            player_score = total.player_score,
            "Computed final score"
        );
        Ok(total)
    }
}

/// Sum checkpoint records, counting only the newest record of each round.
///
/// Records are visited newest first; later (older) records for a round that
/// was already counted are resubmissions and get skipped. The city fields and
/// `created_at` come from the last record counted. Scores are client supplied,
/// so a sum leaving the `i64` range is an error rather than a wrapped total.
pub fn aggregate_checkpoints(
    player: &str,
    mut records: Vec<ScoreRecord>,
) -> StudyResult<ScoreRecord> {
    records.sort_by(|a, b| b.created_at.total_cmp(&a.created_at));

    let mut total = ScoreRecord {
        player_id: player.to_string(),
        created_at: 0.0,
        ai_score: 0,
        player_score: 0,
        rounds: 0,
        prediction_city: String::new(),
        label_city: String::new(),
        user_city_answer: String::new(),
    };
    let mut counted_rounds = HashSet::new();

    for record in records {
        if !counted_rounds.insert(record.rounds) {
            continue;
        }
        let overflow = || StudyError::ScoreOverflow(player.to_string());
        total.ai_score = total
            .ai_score
            .checked_add(record.ai_score)
            .ok_or_else(overflow)?;
        total.player_score = total
            .player_score
            .checked_add(record.player_score)
            .ok_or_else(overflow)?;
        total.rounds = total.rounds.max(record.rounds);
        total.created_at = record.created_at;
        total.prediction_city = record.prediction_city;
        total.label_city = record.label_city;
        total.user_city_answer = record.user_city_answer;
    }

    Ok(total)
}
