//! Score export for offline analysis.
//!
//! Produces one CSV row per score record, newest-best first, in the column
//! order the analysis notebooks expect.

use std::io::Write;

use crate::error::StudyResult;
use crate::state::AppState;
use crate::store::{DocumentStore, Query, StoreError};
use crate::types::*;

/// CSV header, in column order
pub const EXPORT_COLUMNS: &[&str] = &[
    "player_id",
    "created_at",
    "ai_score",
    "player_score",
    "rounds",
    "prediction_city",
    "user_city_answer",
    "label_city",
];

/// Default number of records exported per player
pub const DEFAULT_EXPORT_LIMIT: usize = 100;

/// Score records of a player, best player score first, newest first on ties
pub async fn score_history(
    store: &dyn DocumentStore,
    player: &str,
    limit: usize,
) -> StudyResult<Vec<ScoreRecord>> {
    let query = Query::new()
        .eq("player_id", player)
        .exists("ai_score")
        .fields(SCORE_FIELDS)
        .sort_desc("player_score")
        .sort_desc("created_at")
        .limit(limit);

    let records = store
        .find(&query)
        .await?
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<ScoreRecord>, _>>()
        .map_err(StoreError::from)?;
    Ok(records)
}

impl AppState {
    pub async fn score_history(&self, player: &str, limit: usize) -> StudyResult<Vec<ScoreRecord>> {
        score_history(self.store.as_ref(), player, limit).await
    }
}

/// Render a timestamp as `YYYY-MM-DD HH:MM:SS` UTC
pub fn format_timestamp(created_at: f64) -> String {
    let micros = (created_at * 1_000_000.0).round() as i64;
    chrono::DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Write records as CSV, header first
pub fn write_scores_csv<W: Write>(mut writer: W, records: &[ScoreRecord]) -> std::io::Result<()> {
    writeln!(writer, "{}", EXPORT_COLUMNS.join(","))?;
    for record in records {
        let row = [
            csv_field(&record.player_id),
            format_timestamp(record.created_at),
            record.ai_score.to_string(),
            record.player_score.to_string(),
            record.rounds.to_string(),
            csv_field(&record.prediction_city),
            csv_field(&record.user_city_answer),
            csv_field(&record.label_city),
        ];
        writeln!(writer, "{}", row.join(","))?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1648189447.0), "2022-03-25 06:24:07");
        assert_eq!(format_timestamp(0.0), "1970-01-01 00:00:00");
    }

    #[test]
    fn test_csv_quotes_special_characters() {
        assert_eq!(csv_field("Berlin"), "Berlin");
        assert_eq!(csv_field("Tel Aviv, Israel"), "\"Tel Aviv, Israel\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_write_scores_csv() {
        let mut record = ScoreRecord::from_request("abc", &score(4, 1, 2), 0.0);
        record.user_city_answer = "Hamburg, DE".to_string();

        let mut out = Vec::new();
        write_scores_csv(&mut out, &[record]).unwrap();
        let csv = String::from_utf8(out).unwrap();

        assert_eq!(
            csv,
            "player_id,created_at,ai_score,player_score,rounds,prediction_city,user_city_answer,label_city\n\
             abc,1970-01-01 00:00:00,1,2,4,prediction-4,\"Hamburg, DE\",label-4\n"
        );
    }

    #[tokio::test]
    async fn test_score_history_sorted_and_limited() {
        let (state, store) = test_state();
        put_record(&store, "p", 1.0, &score(1, 0, 5)).await;
        put_record(&store, "p", 2.0, &score(2, 0, 9)).await;
        put_record(&store, "p", 3.0, &score(3, 0, 5)).await;
        put_record(&store, "q", 4.0, &score(1, 0, 99)).await;

        let history = state.score_history("p", 2).await.unwrap();
        let rounds: Vec<u32> = history.iter().map(|r| r.rounds).collect();
        assert_eq!(rounds, vec![2, 3]);

        let all = score_history(&store, "p", DEFAULT_EXPORT_LIMIT).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|r| r.player_id == "p"));
    }
}
