use serde::Deserialize;

use crate::error::StudyResult;
use crate::state::AppState;
use crate::store::{Query, StoreError};
use crate::types::PLAYER_INDEX;

/// Outcome of comparing the two latest control-round submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionCheck {
    /// The two latest attempts scored differently
    Passed,
    /// The two latest attempts scored the same
    Failed,
    /// Fewer than two control attempts recorded
    Insufficient,
}

impl AttentionCheck {
    /// API view: anything short of `Passed` counts as not passed
    pub fn passed(&self) -> bool {
        matches!(self, AttentionCheck::Passed)
    }
}

/// Projection of a control-round score record
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ControlAttempt {
    pub rounds: u32,
    pub created_at: f64,
    pub player_score: i64,
}

/// Judge control attempts given newest first
pub fn evaluate_control_attempts(attempts: &[ControlAttempt]) -> AttentionCheck {
    match attempts {
        [latest, previous, ..] if latest.player_score != previous.player_score => {
            AttentionCheck::Passed
        }
        [_, _, ..] => AttentionCheck::Failed,
        _ => AttentionCheck::Insufficient,
    }
}

impl AppState {
    pub async fn attention_check(&self, player: &str) -> StudyResult<AttentionCheck> {
        let query = Query::new()
            .eq("player_id", player)
            .exists("ai_score")
            .eq("rounds", self.study.control_round)
            .fields(&["rounds", "created_at", "player_score"])
            .sort_desc("created_at")
            .limit(2)
            .use_index(PLAYER_INDEX);

        let attempts = self
            .store
            .find(&query)
            .await?
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<ControlAttempt>, _>>()
            .map_err(StoreError::from)?;

        let outcome = evaluate_control_attempts(&attempts);
        tracing::info!(player = %player, attempts = attempts.len(), outcome = ?outcome, "Attention check");
        Ok(outcome)
    }

    /// Boolean attention check; insufficient data counts as not passed
    pub async fn attention_check_passed(&self, player: &str) -> StudyResult<bool> {
        Ok(self.attention_check(player).await?.passed())
    }
}
