//! HTTP client for the OData backend.

use crate::config::{IndexingConfig, OdataConfig};
use crate::error::OdataError;
use crate::odata::schema::{Extraction, SchemaExtractor, SchemaSource};
use async_trait::async_trait;
use base64::Engine;
use futures::{StreamExt, TryStreamExt};

/// Ceiling on a single backend response body. Result sets can be large;
/// anything beyond this is treated as an error rather than buffered.
const MAX_RESPONSE_BYTES: usize = 50 * 1024 * 1024;

/// Default row limit for listing queries when the caller gives none.
const DEFAULT_TOP: u32 = 5;

/// Client for the backend's OData endpoints: the `$metadata` schema stream
/// and per-entity data queries.
pub struct ODataClient {
    http: reqwest::Client,
    base_url: String,
    extractor: SchemaExtractor,
}

impl ODataClient {
    pub fn new(odata: &OdataConfig, indexing: &IndexingConfig) -> crate::Result<Self> {
        let credentials = format!("{}:{}", odata.username, odata.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);

        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|e| anyhow::anyhow!("invalid basic-auth credentials: {e}"))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(OdataError::Request)?;

        Ok(Self {
            http,
            base_url: odata.base_url.trim_end_matches('/').to_string(),
            extractor: SchemaExtractor::new(indexing),
        })
    }

    /// Fetch `$metadata` and run the streaming schema pass over the response
    /// body. The document is never buffered as a whole string.
    pub async fn fetch_metadata(&self) -> crate::Result<Extraction> {
        let url = format!("{}/$metadata", self.base_url);
        tracing::info!(%url, "backend request");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/xml")
            .send()
            .await
            .map_err(OdataError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(OdataError::Status(status).into());
        }

        let stream = response
            .bytes_stream()
            .map_err(std::io::Error::other);
        let reader = tokio::io::BufReader::new(tokio_util::io::StreamReader::new(stream));

        Ok(self.extractor.extract(reader).await)
    }

    /// Issue one data query against the backend and return the raw body.
    ///
    /// `count_only` targets the entity's `/$count` endpoint with no listing
    /// parameters; otherwise rows are fetched with `$top` (default 5) and
    /// `$format=json`. A non-blank `filter` is passed through verbatim in
    /// either mode.
    pub async fn execute_query(
        &self,
        entity: &str,
        filter: Option<&str>,
        top: Option<u32>,
        count_only: bool,
    ) -> crate::Result<String> {
        let url = if count_only {
            format!("{}/{}/$count", self.base_url, entity)
        } else {
            format!("{}/{}", self.base_url, entity)
        };

        let mut request = self.http.get(&url);
        if !count_only {
            let limit = top.unwrap_or(DEFAULT_TOP);
            request = request.query(&[("$top", limit.to_string()), ("$format", "json".to_string())]);
        }
        if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
            request = request.query(&[("$filter", filter)]);
        }

        tracing::info!(%url, ?filter, ?top, count_only, "backend request");

        let response = request.send().await.map_err(OdataError::Request)?;
        let status = response.status();
        if !status.is_success() {
            return Err(OdataError::Status(status).into());
        }

        read_body_capped(response).await
    }
}

#[async_trait]
impl SchemaSource for ODataClient {
    async fn field_records(&self) -> crate::Result<Extraction> {
        self.fetch_metadata().await
    }
}

/// Drain a response body, enforcing [`MAX_RESPONSE_BYTES`].
async fn read_body_capped(response: reqwest::Response) -> crate::Result<String> {
    let mut stream = response.bytes_stream();
    let mut body: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(OdataError::Request)?;
        if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(OdataError::ResponseTooLarge { limit: MAX_RESPONSE_BYTES }.into());
        }
        body.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}
