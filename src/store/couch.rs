use super::*;
use reqwest::{header, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

/// Connection settings for a CouchDB database
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
}

/// CouchDB-backed document store
pub struct CouchStore {
    client: reqwest::Client,
    database_url: Url,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    docs: Vec<Value>,
    #[serde(default)]
    warning: Option<String>,
}

impl CouchStore {
    pub fn new(config: &CouchConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to build HTTP client: {}", e)))?;

        let base = format!("http://{}:{}/", config.host, config.port);
        let mut database_url = Url::parse(&base)
            .map_err(|e| StoreError::Unavailable(format!("Invalid CouchDB URL {}: {}", base, e)))?;
        database_url
            .path_segments_mut()
            .map_err(|_| StoreError::Unavailable(format!("Invalid CouchDB URL {}", base)))?
            .pop_if_empty()
            .push(&config.database);

        Ok(Self {
            client,
            database_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// URL of a path below the database, with each segment percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.database_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    /// Current revision of a document, if it exists
    async fn current_rev(&self, key: &str) -> StoreResult<Option<String>> {
        let response = self
            .request(reqwest::Method::HEAD, self.url(&[key]))
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(response
                .headers()
                .get(header::ETAG)
                .and_then(|etag| etag.to_str().ok())
                .map(|etag| etag.trim_matches('"').to_string())),
            status => Err(status_error(status, key)),
        }
    }
}

fn unavailable(e: reqwest::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn status_error(status: StatusCode, key: &str) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(key.to_string()),
        StatusCode::CONFLICT => StoreError::Conflict(key.to_string()),
        status => StoreError::Unavailable(format!("CouchDB returned status {} for {}", status, key)),
    }
}

#[async_trait]
impl DocumentStore for CouchStore {
    async fn get(&self, key: &str) -> StoreResult<Value> {
        let response = self
            .request(reqwest::Method::GET, self.url(&[key]))
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), key));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to read document {}: {}", key, e)))
    }

    async fn put(&self, key: &str, mut doc: Value) -> StoreResult<()> {
        // CouchDB only replaces a document when given its current revision
        if let Some(rev) = self.current_rev(key).await? {
            if let Value::Object(ref mut fields) = doc {
                fields.insert("_rev".to_string(), Value::String(rev));
            }
        }

        let response = self
            .request(reqwest::Method::PUT, self.url(&[key]))
            .json(&doc)
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), key));
        }
        Ok(())
    }

    async fn find(&self, query: &Query) -> StoreResult<Vec<Value>> {
        let response = self
            .request(reqwest::Method::POST, self.url(&["_find"]))
            .json(&query.to_mango())
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(status_error(response.status(), "_find"));
        }

        let found: FindResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to read _find response: {}", e)))?;

        if let Some(warning) = found.warning {
            tracing::debug!("CouchDB _find warning: {}", warning);
        }
        Ok(found.docs)
    }

    fn name(&self) -> &str {
        "couchdb"
    }
}
