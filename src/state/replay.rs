use serde_json::Value;

use crate::collector::decoded_response;
use crate::error::{StudyError, StudyResult};
use crate::hashing::content_hash;
use crate::state::score::new_document_id;
use crate::state::AppState;
use crate::store::StoreError;
use crate::types::*;

impl AppState {
    /// Log a predict/explain request for an image
    pub async fn record_request(
        &self,
        player: &str,
        route: ResponseRoute,
        image_hash: &str,
    ) -> StudyResult<RequestRecord> {
        let record = RequestRecord {
            player_id: player.to_string(),
            created_at: now_seconds(),
            route,
            image_hash: image_hash.to_string(),
        };
        let doc = serde_json::to_value(&record).map_err(StoreError::from)?;
        self.store.put(&new_document_id(), doc).await?;
        Ok(record)
    }

    /// Recorded AI answer for an image of the catalog
    pub async fn prerecorded_response(
        &self,
        route: ResponseRoute,
        image_hash: &str,
    ) -> StudyResult<Value> {
        let entry = self
            .catalog
            .entry(image_hash)
            .ok_or_else(|| StudyError::UnknownImage(image_hash.to_string()))?;

        let record = self.collector.fetch_record(entry.identifier(route)).await?;
        Ok(decoded_response(&record)?)
    }

    /// Handle an uploaded image: log the request, wait the configured delay
    /// so the answer feels computed, then replay the recorded answer
    pub async fn replay_response(
        &self,
        player: &str,
        route: ResponseRoute,
        image: &[u8],
    ) -> StudyResult<Value> {
        let image_hash = content_hash(image);
        self.record_request(player, route, &image_hash).await?;

        tracing::debug!(
            player = %player,
            route = route.as_str(),
            image = %image_hash,
            "Replaying recorded response"
        );

        if !self.study.response_delay.is_zero() {
            tokio::time::sleep(self.study.response_delay).await;
        }

        self.prerecorded_response(route, &image_hash).await
    }
}
