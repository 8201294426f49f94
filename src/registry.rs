//! Schema registry lookup and caching.
//!
//! Schemas are fetched over the Confluent-compatible REST API and parsed
//! once; the resolver keeps them for the lifetime of the process. A record's
//! wire header names the schema it was written with, so a busy consumer hits
//! the cache on every record after the first one per schema.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A schema definition as registered with the registry: the id it was
/// assigned and the parsed Avro schema. Immutable once fetched.
#[derive(Debug)]
pub struct RegisteredSchema {
    pub id: u32,
    pub schema: apache_avro::Schema,
}

/// Response body of `GET /schemas/ids/{id}`.
#[derive(Debug, Deserialize)]
struct SchemaLookupResponse {
    schema: String,
}

/// HTTP client for the schema registry lookup API.
pub struct SchemaRegistryClient {
    base_url: String,
    http: reqwest::Client,
}

impl SchemaRegistryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Fetch the raw schema definition registered under `id`.
    pub async fn fetch_schema(&self, id: u32) -> Result<String> {
        let url = format!("{}/schemas/ids/{}", self.base_url, id);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::RegistryUnavailable(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::SchemaNotFound { id });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RegistryUnavailable(format!(
                "schema lookup failed with status {status}: {body}"
            )));
        }

        let body: SchemaLookupResponse = response.json().await.map_err(|e| {
            Error::RegistryUnavailable(format!("failed to parse registry response: {e}"))
        })?;

        Ok(body.schema)
    }
}

/// Resolves schema ids to parsed schemas, caching each id forever.
///
/// The cache is the only shared state between the encode and decode paths;
/// it is owned here and handed around by reference rather than living in a
/// global. Failures propagate to the caller unchanged, with no retrying.
pub struct SchemaResolver {
    client: SchemaRegistryClient,
    cache: Mutex<HashMap<u32, Arc<RegisteredSchema>>>,
}

impl SchemaResolver {
    pub fn new(client: SchemaRegistryClient) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a schema by registry id. A cache hit performs no network
    /// call; a miss fetches, parses, and caches the schema.
    pub async fn resolve(&self, id: u32) -> Result<Arc<RegisteredSchema>> {
        if let Some(schema) = self.cache.lock().await.get(&id) {
            return Ok(Arc::clone(schema));
        }

        debug!(schema_id = id, "schema not cached, fetching from registry");
        let raw = self.client.fetch_schema(id).await?;
        let schema = apache_avro::Schema::parse_str(&raw).map_err(|e| Error::SchemaParse {
            id,
            reason: e.to_string(),
        })?;

        let schema = Arc::new(RegisteredSchema { id, schema });
        // Concurrent resolutions of the same id may race and fetch twice;
        // last writer wins and the values are equal.
        self.cache
            .lock()
            .await
            .insert(id, Arc::clone(&schema));

        Ok(schema)
    }
}
