//! Pinecone vector fetch client.
//!
//! Reads stored video embeddings by id from a Pinecone index
//! (`GET {index_host}/vectors/fetch?ids=...`).

use std::collections::HashMap;

use reqwest::Client;
use serde::Deserialize;
use tubeline_core::HttpConfig;
use tubeline_core::batch::VECTOR_FETCH_LIMIT;
use tubeline_core::error::AppError;
use tubeline_core::traits::VectorStore;

use crate::http::{build_client, error_from_response, map_send_error};

const API_VERSION: &str = "2024-07";

#[derive(Clone)]
pub struct PineconeClient {
    client: Client,
    api_key: String,
    index_host: String,
    namespace: Option<String>,
    max_fetch_size: usize,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Deserialize)]
struct FetchedVector {
    #[serde(default)]
    values: Vec<f32>,
}

/// Adds `https://` to a bare index host such as `videos-abc123.svc.pinecone.io`.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

impl PineconeClient {
    pub fn new(api_key: &str, index_host: &str) -> Result<Self, AppError> {
        Self::with_config(api_key, index_host, &HttpConfig::default())
    }

    pub fn with_config(api_key: &str, index_host: &str, http: &HttpConfig) -> Result<Self, AppError> {
        if index_host.trim().is_empty() {
            return Err(AppError::ConfigError("Pinecone index host is empty".to_string()));
        }
        Ok(Self {
            client: build_client(http)?,
            api_key: api_key.to_string(),
            index_host: normalize_host(index_host),
            namespace: None,
            max_fetch_size: VECTOR_FETCH_LIMIT,
            timeout_secs: http.timeout.as_secs(),
        })
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Lowers the ids-per-request cap, e.g. to keep URLs short.
    pub fn with_max_fetch_size(mut self, size: usize) -> Self {
        self.max_fetch_size = size.clamp(1, VECTOR_FETCH_LIMIT);
        self
    }

    /// Fetches vectors by id. Ids without a stored vector are absent.
    pub async fn fetch(&self, ids: &[String]) -> Result<HashMap<String, Vec<f32>>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        if let Some(namespace) = &self.namespace {
            query.push(("namespace", namespace.as_str()));
        }

        let response = self
            .client
            .get(format!("{}/vectors/fetch", self.index_host))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .query(&query)
            .send()
            .await
            .map_err(|e| map_send_error("pinecone", self.timeout_secs, e))?;

        if !response.status().is_success() {
            return Err(error_from_response("pinecone", response).await);
        }

        let fetched: FetchResponse = response.json().await.map_err(|e| {
            AppError::ClientError(format!("Failed to parse Pinecone response: {}", e))
        })?;

        Ok(fetched
            .vectors
            .into_iter()
            .filter(|(_, v)| !v.values.is_empty())
            .map(|(id, v)| (id, v.values))
            .collect())
    }
}

// =============================================================================
// Trait Implementation: VectorStore
// =============================================================================

impl VectorStore for PineconeClient {
    fn name(&self) -> &'static str {
        "pinecone"
    }

    fn max_fetch_size(&self) -> usize {
        self.max_fetch_size
    }

    async fn fetch_vectors(&self, ids: &[String]) -> Result<HashMap<String, Vec<f32>>, AppError> {
        self.fetch(ids).await
    }
}
