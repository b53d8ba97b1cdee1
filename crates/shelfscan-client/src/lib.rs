//! HTTP client and scan orchestration for the shelfscan gateway.
//!
//! [`GatewayClient`] owns the transport: multipart upload with progress and
//! abort, plus the enrichment/recommendation forwarding calls. The
//! [`pipeline::ScanPipeline`] drives the full acquisition flow on top of it.

pub mod pipeline;
pub mod resource;
pub mod retry;
pub mod steps;
pub mod upload;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use shelfscan_core::{
    BookIdentity, EnrichedBook, GatewayConfig, ScanError, ScoredBook, UserPreferences,
};

use crate::upload::{ProgressCallback, UploadSession};

/// HTTP client for the scan gateway.
///
/// Holds at most one in-flight scan transfer; re-entry while a transfer is
/// running is the orchestration layer's responsibility to prevent.
#[derive(Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    config: GatewayConfig,
    inflight: Arc<Mutex<Option<CancellationToken>>>,
}

impl GatewayClient {
    /// The cookie store carries gateway session credentials across calls.
    /// No request timeout is set: uploads complete, error, or are aborted by
    /// the caller, and the gateway signals its own failures.
    pub fn new(config: GatewayConfig) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| ScanError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            inflight: Arc::new(Mutex::new(None)),
        })
    }

    /// Build from `SHELFSCAN_GATEWAY_URL` (invalid values fall back to the
    /// default local gateway).
    pub fn from_env() -> Result<Self, ScanError> {
        Self::new(GatewayConfig::from_env())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Begin one scan upload and return its session handle. The transfer
    /// slot is recorded so [`GatewayClient::abort`] can reach it and is
    /// cleared when the transfer finishes on any path.
    pub fn start_upload(&self, blob: Bytes, on_progress: ProgressCallback) -> UploadSession {
        self.start_upload_with_token(blob, on_progress, CancellationToken::new())
    }

    /// As [`GatewayClient::start_upload`], cancelled when `token` is.
    pub fn start_upload_with_token(
        &self,
        blob: Bytes,
        on_progress: ProgressCallback,
        token: CancellationToken,
    ) -> UploadSession {
        *self.inflight.lock().unwrap() = Some(token.clone());

        let client = self.client.clone();
        let endpoint = self.config.scan_endpoint();
        let inflight = Arc::clone(&self.inflight);
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let result =
                upload::perform_upload(&client, &endpoint, blob, on_progress, task_token).await;
            inflight.lock().unwrap().take();
            result
        });

        UploadSession::new(token, task)
    }

    /// Upload a processed JPEG and await the scan outcome.
    pub async fn upload(
        &self,
        blob: Bytes,
        on_progress: ProgressCallback,
    ) -> Result<shelfscan_core::ScanOutcome, ScanError> {
        self.start_upload(blob, on_progress).finish().await
    }

    /// Cancel the in-flight transfer, if any. After this no further progress
    /// callbacks fire and the transfer slot is cleared.
    pub fn abort(&self) {
        if let Some(token) = self.inflight.lock().unwrap().take() {
            tracing::debug!("Aborting in-flight upload");
            token.cancel();
        }
    }

    pub fn has_inflight(&self) -> bool {
        self.inflight.lock().unwrap().is_some()
    }

    /// Forward book identities to the enrichment collaborator.
    pub async fn enrich(&self, books: &[BookIdentity]) -> Result<Vec<EnrichedBook>, ScanError> {
        self.post_json(&self.config.enrich_endpoint(), &books).await
    }

    /// Forward identities plus the user's taste profile to the
    /// recommendation collaborator.
    pub async fn recommend(
        &self,
        books: &[BookIdentity],
        preferences: &UserPreferences,
    ) -> Result<Vec<ScoredBook>, ScanError> {
        #[derive(serde::Serialize)]
        struct RecommendRequest<'a> {
            books: &'a [BookIdentity],
            user_preferences: &'a UserPreferences,
        }

        #[derive(serde::Deserialize)]
        struct RecommendResponse {
            book_scores: Vec<ScoredBook>,
        }

        let response: RecommendResponse = self
            .post_json(
                &self.config.recommend_endpoint(),
                &RecommendRequest {
                    books,
                    user_preferences: preferences,
                },
            )
            .await?;
        Ok(response.book_scores)
    }

    async fn post_json<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, ScanError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(ScanError::network)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = upload::parse_retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(upload::build_http_error(status.as_u16(), retry_after, &text));
        }

        response
            .json()
            .await
            .map_err(|e| ScanError::Internal(format!("unexpected response shape: {}", e)))
    }
}
