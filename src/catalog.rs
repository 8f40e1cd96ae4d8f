//! Study image catalog and round-to-image sequencing.
//!
//! `study.json` lists the image pool and the control images:
//!
//! ```json
//! {
//!   "images":   { "<hash>": { "image": "images/berlin/1.png", "label": "berlin",
//!                             "predict": "<collector id>", "explain": "<collector id>" } },
//!   "controls": { "<hash>": { ... } }
//! }
//! ```
//!
//! The order of `images` in the file is the order rounds walk through the pool.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{StudyError, StudyResult};
use crate::types::{ImageHash, ResponseRoute, Streetview};

/// Prefix of the data URL sent to the game client
const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Number of encoded images kept in memory
const STREETVIEW_CACHE_SIZE: u64 = 128;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CatalogEntry {
    /// Image path, relative to the catalog file
    pub image: PathBuf,
    pub label: String,
    /// Collector id of the recorded prediction
    pub predict: String,
    /// Collector id of the recorded explanation
    pub explain: String,
}

impl CatalogEntry {
    pub fn identifier(&self, route: ResponseRoute) -> &str {
        match route {
            ResponseRoute::Predict => &self.predict,
            ResponseRoute::Explain => &self.explain,
        }
    }
}

/// What a round shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    /// The fixed attention-check image
    Control,
    /// Index into the ordered image pool
    Pool(usize),
}

/// Map a 1-based round number to its image slot.
///
/// The round equal to `block_size` is the control round. Every other round
/// indexes the pool with the control slots compacted away, so the same round
/// always lands on the same image. Returns `None` for round 0 (or a zero
/// block size), where no slot exists.
pub fn slot_for_round(round: u32, block_size: u32) -> Option<ImageSlot> {
    if round == 0 || block_size == 0 {
        return None;
    }
    if round == block_size {
        return Some(ImageSlot::Control);
    }
    (round - 1)
        .checked_sub(round / block_size)
        .map(|index| ImageSlot::Pool(index as usize))
}

#[derive(Debug, Deserialize)]
struct StudyFile {
    images: Map<String, Value>,
    #[serde(default)]
    controls: Map<String, Value>,
}

pub struct ImageCatalog {
    base_dir: PathBuf,
    images: Vec<ImageHash>,
    controls: Vec<ImageHash>,
    entries: HashMap<ImageHash, CatalogEntry>,
    block_size: u32,
    streetviews: Cache<ImageHash, Streetview>,
}

impl ImageCatalog {
    /// Load the catalog from a `study.json` file
    pub fn load(path: &Path, block_size: u32) -> StudyResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            StudyError::Catalog(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_json(&json, base_dir, block_size)
    }

    pub fn from_json(json: &str, base_dir: PathBuf, block_size: u32) -> StudyResult<Self> {
        if block_size == 0 {
            return Err(StudyError::Config("Control round must be at least 1".to_string()));
        }

        let study: StudyFile = serde_json::from_str(json)
            .map_err(|e| StudyError::Catalog(format!("Invalid study file: {}", e)))?;

        let mut entries = HashMap::new();
        let images = collect_entries(study.images, &mut entries)?;
        let controls = collect_entries(study.controls, &mut entries)?;

        if images.is_empty() {
            return Err(StudyError::Catalog("Study file lists no images".to_string()));
        }
        if controls.is_empty() {
            tracing::warn!("Study file lists no control images; round {} will fail", block_size);
        }

        tracing::info!(
            "Loaded study catalog: {} images, {} controls",
            images.len(),
            controls.len()
        );

        Ok(Self {
            base_dir,
            images,
            controls,
            entries,
            block_size,
            streetviews: Cache::new(STREETVIEW_CACHE_SIZE),
        })
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Highest round number that still maps to an image
    pub fn max_round(&self) -> u32 {
        (1..=u32::MAX)
            .take_while(|&round| self.next_image_for_round(round).is_ok())
            .last()
            .unwrap_or(0)
    }

    pub fn entry(&self, hash: &str) -> Option<&CatalogEntry> {
        self.entries.get(hash)
    }

    /// Image shown for a round; a pure function of the round number
    pub fn next_image_for_round(&self, round: u32) -> StudyResult<ImageHash> {
        let invalid = |reason: String| StudyError::InvalidRound { round, reason };

        match slot_for_round(round, self.block_size) {
            Some(ImageSlot::Control) => self
                .controls
                .first()
                .cloned()
                .ok_or_else(|| invalid("no control image configured".to_string())),
            Some(ImageSlot::Pool(index)) => self.images.get(index).cloned().ok_or_else(|| {
                invalid(format!(
                    "image index {} exceeds pool of {} images",
                    index,
                    self.images.len()
                ))
            }),
            None => Err(invalid("rounds start at 1".to_string())),
        }
    }

    /// Image and label for a catalog entry, encoded as a data URL
    pub async fn streetview(&self, hash: &str) -> StudyResult<Streetview> {
        let entry = self
            .entry(hash)
            .ok_or_else(|| StudyError::UnknownImage(hash.to_string()))?;
        let path = self.base_dir.join(&entry.image);
        let label = entry.label.clone();

        self.streetviews
            .try_get_with(hash.to_string(), async move {
                let bytes = tokio::fs::read(&path).await?;
                Ok::<_, std::io::Error>(Streetview {
                    image: format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(&bytes)),
                    class_label: label,
                })
            })
            .await
            .map_err(|e: Arc<std::io::Error>| {
                StudyError::Catalog(format!("Failed to load image for {}: {}", hash, e))
            })
    }
}

fn collect_entries(
    raw: Map<String, Value>,
    entries: &mut HashMap<ImageHash, CatalogEntry>,
) -> StudyResult<Vec<ImageHash>> {
    let mut hashes = Vec::with_capacity(raw.len());
    for (hash, value) in raw {
        let entry: CatalogEntry = serde_json::from_value(value)
            .map_err(|e| StudyError::Catalog(format!("Invalid entry {}: {}", hash, e)))?;
        entries.insert(hash.clone(), entry);
        hashes.push(hash);
    }
    Ok(hashes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Catalog with `count` pool images named `img-1..` and one control `ctrl-1`
    pub(crate) fn catalog_json(count: usize) -> String {
        let images: Map<String, Value> = (1..=count)
            .map(|i| {
                (
                    format!("img-{}", i),
                    serde_json::json!({
                        "image": format!("images/{}.png", i),
                        "label": "berlin",
                        "predict": format!("predict-{}", i),
                        "explain": format!("explain-{}", i),
                    }),
                )
            })
            .collect();
        serde_json::json!({
            "images": images,
            "controls": {
                "ctrl-1": {
                    "image": "controls/1.png",
                    "label": "Berlin",
                    "predict": "predict-ctrl",
                    "explain": "explain-ctrl",
                }
            }
        })
        .to_string()
    }

    #[test]
    fn test_slot_for_round_skips_control_slot() {
        assert_eq!(slot_for_round(1, 15), Some(ImageSlot::Pool(0)));
        assert_eq!(slot_for_round(14, 15), Some(ImageSlot::Pool(13)));
        assert_eq!(slot_for_round(15, 15), Some(ImageSlot::Control));
        assert_eq!(slot_for_round(16, 15), Some(ImageSlot::Pool(14)));
        assert_eq!(slot_for_round(17, 15), Some(ImageSlot::Pool(15)));
    }

    #[test]
    fn test_slot_for_round_rejects_round_zero() {
        assert_eq!(slot_for_round(0, 15), None);
        assert_eq!(slot_for_round(3, 0), None);
    }

    #[test]
    fn test_slot_for_round_never_underflows() {
        assert_eq!(slot_for_round(1, 1), Some(ImageSlot::Control));
        assert_eq!(slot_for_round(2, 1), None);
        assert_eq!(slot_for_round(3, 1), None);
        assert_eq!(slot_for_round(u32::MAX, 2), Some(ImageSlot::Pool(2_147_483_647)));
    }

    #[test]
    fn test_pool_order_follows_file_order() {
        let catalog = ImageCatalog::from_json(&catalog_json(16), PathBuf::new(), 15).unwrap();
        assert_eq!(catalog.next_image_for_round(1).unwrap(), "img-1");
        assert_eq!(catalog.next_image_for_round(14).unwrap(), "img-14");
        assert_eq!(catalog.next_image_for_round(16).unwrap(), "img-15");
        assert_eq!(catalog.next_image_for_round(17).unwrap(), "img-16");
    }

    #[test]
    fn test_next_image_is_deterministic() {
        let catalog = ImageCatalog::from_json(&catalog_json(16), PathBuf::new(), 15).unwrap();
        for round in (1..=17).filter(|&r| r != 15) {
            assert_eq!(
                catalog.next_image_for_round(round).unwrap(),
                catalog.next_image_for_round(round).unwrap()
            );
        }
    }

    #[test]
    fn test_control_round_always_returns_control_image() {
        let catalog = ImageCatalog::from_json(&catalog_json(16), PathBuf::new(), 15).unwrap();
        assert_eq!(catalog.next_image_for_round(3).unwrap(), "img-3");
        assert_eq!(catalog.next_image_for_round(15).unwrap(), "ctrl-1");
        assert_eq!(catalog.next_image_for_round(15).unwrap(), "ctrl-1");
    }

    #[test]
    fn test_rounds_outside_pool_are_rejected() {
        let catalog = ImageCatalog::from_json(&catalog_json(16), PathBuf::new(), 15).unwrap();
        assert!(matches!(
            catalog.next_image_for_round(0),
            Err(StudyError::InvalidRound { round: 0, .. })
        ));
        assert!(matches!(
            catalog.next_image_for_round(18),
            Err(StudyError::InvalidRound { round: 18, .. })
        ));
        assert_eq!(catalog.max_round(), 17);
    }

    #[test]
    fn test_missing_control_image_fails_control_round_only() {
        let json = r#"{"images": {"a": {"image": "a.png", "label": "x", "predict": "p", "explain": "e"}}}"#;
        let catalog = ImageCatalog::from_json(json, PathBuf::new(), 15).unwrap();
        assert_eq!(catalog.next_image_for_round(1).unwrap(), "a");
        assert!(catalog.next_image_for_round(15).is_err());
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        let result = ImageCatalog::from_json(r#"{"images": {}}"#, PathBuf::new(), 15);
        assert!(matches!(result, Err(StudyError::Catalog(_))));
    }

    #[tokio::test]
    async fn test_streetview_encodes_image_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images/1.png"), b"png-bytes").unwrap();
        let study_path = dir.path().join("study.json");
        std::fs::write(&study_path, catalog_json(1)).unwrap();

        let catalog = ImageCatalog::load(&study_path, 15).unwrap();
        let view = catalog.streetview("img-1").await.unwrap();

        assert_eq!(view.class_label, "berlin");
        assert_eq!(
            view.image,
            format!("data:image/png;base64,{}", STANDARD.encode(b"png-bytes"))
        );

        assert!(matches!(
            catalog.streetview("nope").await,
            Err(StudyError::UnknownImage(_))
        ));
    }
}
