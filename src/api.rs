//! Access to the remote vocabulary list.

use std::time::Duration;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::{Result, KanifyError};

/// Source of the raw vocabulary JSON
#[async_trait]
pub trait VocabularySource: Send + Sync {
    /// Download the vocabulary list for the given credential and return the raw body
    async fn fetch_vocabulary(&self, api_key: &str) -> Result<String>;
}

/// reqwest-backed client for the WaniKani v1 user API
pub struct WaniKaniClient {
    client: Client,
    config: ApiConfig,
    show_progress: bool,
}

impl WaniKaniClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            config,
            show_progress: false,
        })
    }

    /// Show a spinner on the terminal while downloading
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn vocabulary_url(&self, api_key: &str) -> String {
        format!("{}/{}/vocabulary/", self.config.base_url.trim_end_matches('/'), api_key)
    }

    fn spinner(&self) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
            pb.set_style(style);
        }
        pb.set_message("Downloading WaniKani vocabulary...");
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    }
}

#[async_trait]
impl VocabularySource for WaniKaniClient {
    async fn fetch_vocabulary(&self, api_key: &str) -> Result<String> {
        let url = self.vocabulary_url(api_key);
        debug!("Requesting vocabulary from {}", self.vocabulary_url("<api-key>"));

        let spinner = self.spinner();
        let result = async {
            let response = self.client
                .get(&url)
                .send()
                .await
                .map_err(|e| KanifyError::NetworkFailure(e.without_url().to_string()))?;

            let status = response.status();
            if !status.is_success() {
                // error details travel in the body
                warn!("Vocabulary request returned HTTP {}", status);
            }

            response
                .text()
                .await
                .map_err(|e| KanifyError::NetworkFailure(e.without_url().to_string()))
        }.await;

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        let body = result?;
        info!("Downloaded {} bytes of vocabulary data", body.len());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_url() {
        let mut config = ApiConfig::default();
        config.base_url = "https://example.test/api/v1.2/user/".to_string();
        let client = WaniKaniClient::new(config).unwrap();
        assert_eq!(
            client.vocabulary_url("abc"),
            "https://example.test/api/v1.2/user/abc/vocabulary/"
        );
    }
}
