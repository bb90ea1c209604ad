//! Client for the prediction API with a local prediction cache and history.
use common::{
    hashed,
    protocol::{ErrorResponse, PredictRequest, PredictResponse},
};
use thiserror::Error;

pub mod history;

use history::PredictionStore;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status}: {message}")]
    Server { status: u16, message: String },
}

/// Thin client for `POST /api/predict`.
pub struct PredictClient {
    http: reqwest::Client,
    base_url: String,
}

impl PredictClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Post a data URL and return the prediction.
    pub async fn predict(&self, data_url: &str) -> Result<PredictResponse, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/predict", self.base_url))
            .json(&PredictRequest::new(data_url.to_owned()))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let message = match resp.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_owned(),
        };
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    /// Answer from `store` if this data URL was classified before, otherwise
    /// ask the server and cache the reply. `refresh` skips the lookup.
    ///
    /// Returns the prediction and whether it came from the cache.
    pub async fn predict_cached(
        &self,
        store: &mut PredictionStore,
        data_url: &str,
        refresh: bool,
    ) -> Result<(PredictResponse, bool), ClientError> {
        let key = hashed(data_url);
        if !refresh {
            if let Some(prediction) = store.cached(key) {
                log::debug!("Cache hit for {:016x}", key);
                return Ok((prediction.clone(), true));
            }
        }

        let prediction = self.predict(data_url).await?;
        store.insert(key, prediction.clone());
        Ok((prediction, false))
    }
}
