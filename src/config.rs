//! Service configuration loaded from environment variables.
//!
//! `.env` is read by `main` before [`Settings::from_env`] runs.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{StudyError, StudyResult};
use crate::store::CouchConfig;

/// Rules of the study itself
#[derive(Debug, Clone, PartialEq)]
pub struct StudyConfig {
    /// Round showing the control image; also the block size of the sequencer
    pub control_round: u32,
    /// Rounds that end a scored phase and feed the final score
    pub checkpoint_rounds: Vec<u32>,
    /// Artificial latency before a recorded AI answer is returned
    pub response_delay: Duration,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            control_round: 15,
            checkpoint_rounds: vec![4, 12, 17],
            response_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    CouchDb,
    Memory,
}

/// Full service configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub service_name: String,
    /// Prefix all API routes are nested under ("" for none)
    pub path_prefix: String,
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub store_backend: StoreBackend,
    pub db_name: String,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_host: String,
    pub db_port: u16,
    pub db_timeout: Duration,
    pub collector_url: String,
    pub collector_timeout: Duration,
    /// Path of the `study.json` catalog
    pub study_data: PathBuf,
    pub study: StudyConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_name: "study-backend-service".to_string(),
            path_prefix: String::new(),
            bind_addr: "0.0.0.0:8000".to_string(),
            allowed_origins: vec!["https://study.xaidemo.de".to_string()],
            store_backend: StoreBackend::CouchDb,
            db_name: "study".to_string(),
            db_user: None,
            db_password: None,
            db_host: "couchdb".to_string(),
            db_port: 5984,
            db_timeout: Duration::from_secs(10),
            collector_url: "http://collector:8000".to_string(),
            collector_timeout: Duration::from_secs(30),
            study_data: PathBuf::from("study.json"),
            study: StudyConfig::default(),
        }
    }
}

/// Trimmed, non-empty value of an environment variable
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> StudyResult<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| StudyError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(None),
    }
}

/// `/api/study/` and `api/study` both become `/api/study`; `/` becomes ``
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Settings {
    /// Load settings from the environment, falling back to defaults
    pub fn from_env() -> StudyResult<Self> {
        let defaults = Settings::default();

        let store_backend = match env_string("STORE_BACKEND").as_deref() {
            None | Some("couchdb") => StoreBackend::CouchDb,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(StudyError::Config(format!(
                    "STORE_BACKEND must be 'couchdb' or 'memory', got '{}'",
                    other
                )))
            }
        };

        let checkpoint_rounds = match env_string("CHECKPOINT_ROUNDS") {
            Some(raw) => parse_list(&raw)
                .iter()
                .map(|round| {
                    round.parse().map_err(|_| {
                        StudyError::Config(format!("CHECKPOINT_ROUNDS has an invalid round: {}", round))
                    })
                })
                .collect::<StudyResult<Vec<u32>>>()?,
            None => defaults.study.checkpoint_rounds.clone(),
        };

        let control_round = env_parse("CONTROL_ROUND")?.unwrap_or(defaults.study.control_round);
        if control_round == 0 {
            return Err(StudyError::Config("CONTROL_ROUND must be at least 1".to_string()));
        }

        let settings = Self {
            service_name: env_string("SERVICE_NAME").unwrap_or(defaults.service_name),
            path_prefix: env_string("PATH_PREFIX")
                .map(|prefix| normalize_prefix(&prefix))
                .unwrap_or(defaults.path_prefix),
            bind_addr: env_string("BIND_ADDR").unwrap_or(defaults.bind_addr),
            allowed_origins: env_string("ALLOWED_ORIGINS")
                .map(|raw| parse_list(&raw))
                .unwrap_or(defaults.allowed_origins),
            store_backend,
            db_name: env_string("DB_NAME").unwrap_or(defaults.db_name),
            db_user: env_string("DB_USER"),
            db_password: env_string("DB_PASSWORD"),
            db_host: env_string("DB_HOST").unwrap_or(defaults.db_host),
            db_port: env_parse("DB_PORT")?.unwrap_or(defaults.db_port),
            db_timeout: env_parse("DB_TIMEOUT")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.db_timeout),
            collector_url: env_string("COLLECTOR_URL").unwrap_or(defaults.collector_url),
            collector_timeout: env_parse("COLLECTOR_TIMEOUT")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.collector_timeout),
            study_data: env_string("STUDY_DATA")
                .map(PathBuf::from)
                .unwrap_or(defaults.study_data),
            study: StudyConfig {
                control_round,
                checkpoint_rounds,
                response_delay: env_parse("RESPONSE_DELAY_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.study.response_delay),
            },
        };

        Ok(settings)
    }

    /// CouchDB connection settings; credentials are mandatory
    pub fn couch_config(&self) -> StudyResult<CouchConfig> {
        let (Some(username), Some(password)) = (&self.db_user, &self.db_password) else {
            return Err(StudyError::Config(
                "DB_USER and DB_PASSWORD must both be set for the CouchDB store".to_string(),
            ));
        };

        Ok(CouchConfig {
            host: self.db_host.clone(),
            port: self.db_port,
            database: self.db_name.clone(),
            username: username.clone(),
            password: password.clone(),
            timeout: self.db_timeout,
        })
    }
}
