use crate::error::SchemaError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument};

const CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Registry subject for a topic's key schema.
pub fn key_subject(topic: &str) -> String {
    format!("{}-key", topic)
}

/// Registry subject for a topic's value schema.
pub fn value_subject(topic: &str) -> String {
    format!("{}-value", topic)
}

/// Stores record schemas and hands out their ids.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    /// Registers `schema` (canonical Avro JSON) under `subject` and returns
    /// its id. Registering an identical schema again returns the same id.
    async fn register(&self, subject: &str, schema: &str) -> Result<u32, SchemaError>;
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    schema: &'a str,
}

#[derive(Deserialize)]
struct RegisterResponse {
    id: u32,
}

#[derive(Deserialize)]
struct RegistryErrorBody {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    message: String,
}

/// Confluent-compatible schema registry client over HTTP.
pub struct HttpSchemaRegistry {
    base_url: reqwest::Url,
    client: reqwest::Client,
    ids: Mutex<HashMap<(String, String), u32>>,
}

impl HttpSchemaRegistry {
    pub fn new(base_url: reqwest::Url, timeout: Duration) -> Result<Self, SchemaError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchemaError::Registry {
                subject: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            base_url,
            client,
            ids: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, subject: &str, schema: &str) -> Option<u32> {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(subject.to_string(), schema.to_string()))
            .copied()
    }

    fn versions_url(&self, subject: &str) -> Result<reqwest::Url, SchemaError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SchemaError::Registry {
                subject: subject.to_string(),
                message: format!("'{}' cannot be used as a base URL", self.base_url),
            })?
            .pop_if_empty()
            .extend(["subjects", subject, "versions"]);
        Ok(url)
    }
}

#[async_trait]
impl SchemaRegistry for HttpSchemaRegistry {
    #[instrument(skip(self, schema))]
    async fn register(&self, subject: &str, schema: &str) -> Result<u32, SchemaError> {
        if let Some(id) = self.cached(subject, schema) {
            debug!("Schema for subject '{}' already registered with id {}", subject, id);
            return Ok(id);
        }

        let registry_err = |message: String| SchemaError::Registry {
            subject: subject.to_string(),
            message,
        };

        let response = self
            .client
            .post(self.versions_url(subject)?)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .json(&RegisterRequest { schema })
            .send()
            .await
            .map_err(|e| registry_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<RegistryErrorBody>(&body) {
                Ok(parsed) => format!("{} (error code {})", parsed.message, parsed.error_code),
                Err(_) => format!("HTTP {}: {}", status, body),
            };
            return Err(registry_err(message));
        }

        let RegisterResponse { id } = response
            .json()
            .await
            .map_err(|e| registry_err(format!("unexpected response: {}", e)))?;

        info!("Registered schema for subject '{}' with id {}", subject, id);
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((subject.to_string(), schema.to_string()), id);
        Ok(id)
    }
}
