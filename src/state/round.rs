use crate::error::StudyResult;
use crate::state::AppState;
use crate::store::StoreError;
use crate::types::*;

impl AppState {
    /// Record the score of the round just played and serve the image for it.
    ///
    /// Appending to the player's experiment record and writing the score happen
    /// under the player's lock, so concurrent requests from one player cannot
    /// skip or duplicate an image assignment.
    pub async fn advance_round(
        &self,
        player: &str,
        request: &ScoreRequest,
    ) -> StudyResult<Streetview> {
        let image_hash = self.catalog.next_image_for_round(request.rounds)?;

        {
            let _guard = self.player_locks.lock(player).await;

            let mut experiment = self.load_experiment(player).await?;
            experiment.images.push(image_hash.clone());

            self.record_score(player, request).await?;

            let doc = serde_json::to_value(&experiment).map_err(StoreError::from)?;
            self.store.put(player, doc).await?;
        }

        tracing::info!(
            player = %player,
            round = request.rounds,
            image = %image_hash,
            "Serving streetview"
        );
        self.catalog.streetview(&image_hash).await
    }

    /// The player's experiment record; a fresh one on first contact
    pub async fn load_experiment(&self, player: &str) -> StudyResult<ExperimentRecord> {
        match self.store.get(player).await {
            Ok(doc) => Ok(serde_json::from_value(doc).map_err(StoreError::from)?),
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(player = %player, "First contact, creating experiment record");
                Ok(ExperimentRecord::new(player, now_seconds()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
