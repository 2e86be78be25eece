// Daybook - Enrichment Client
// Fire-and-forget requests to the transcription/extraction pipeline
//
// The service is opaque: its only observable contract is that it
// eventually sets is_processed and writes transcript/summary/derived
// rows, or never does. It emits no failure signal back to the client.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct EnrichmentClient {
    client: Client,
    base_url: String,
    bearer_token: String,
}

#[derive(Debug, Serialize)]
pub struct ReprocessRequest {
    pub recording_id: Uuid,
    pub audio_reference: String,
}

impl EnrichmentClient {
    pub fn new(base_url: String, bearer_token: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url,
            bearer_token,
        }
    }

    /// Ask the pipeline to (re-)enrich a recording. Success here only
    /// means the request was accepted, not that processing will finish.
    pub async fn request_reprocess(
        &self,
        recording_id: Uuid,
        audio_reference: &str,
    ) -> Result<()> {
        let url = format!("{}/v1/enrich/reprocess", self.base_url);

        let request = ReprocessRequest {
            recording_id,
            audio_reference: audio_reference.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.bearer_token))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::Enrichment(format!("reprocess request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Enrichment(format!(
                "reprocess rejected: {} - {}",
                status, body
            )));
        }

        log::info!("Reprocess requested for recording {}", recording_id);
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| CoreError::Enrichment(format!("health check failed: {}", e)))?;

        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_creation() {
        let client = EnrichmentClient::new(
            "http://localhost:8000".to_string(),
            "test_token".to_string(),
        );
        assert_eq!(client.base_url, "http://localhost:8000");
    }
}
