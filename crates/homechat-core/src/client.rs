use bytes::Bytes;
use futures_util::Stream;
use reqwest::Client;
use serde::Deserialize;

use crate::error::ChatError;
use crate::request::{CompletionRequest, RequestParameters};

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

/// HTTP transport for an OpenAI-compatible completion endpoint.
///
/// One attempt per call and no timeout: a stalled server stalls the stream.
#[derive(Clone, Default)]
pub struct CompletionClient {
    client: Client,
}

impl CompletionClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// POST `request` and return the response body as it arrives.
    pub async fn stream(
        &self,
        params: &RequestParameters,
        request: &CompletionRequest,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>, ChatError> {
        tracing::debug!(url = %params.endpoint, model = %request.model, "sending completion request");

        let response = self
            .client
            .post(&params.endpoint)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        Ok(response.bytes_stream())
    }

    /// Model ids served next to the given completion endpoint.
    pub async fn list_models(&self, endpoint: &str) -> Result<Vec<String>, ChatError> {
        let url = models_url(endpoint);
        tracing::debug!(url = %url, "listing models");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        let models: ModelsResponse = response.json().await?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

/// `.../v1/chat/completions` becomes `.../v1/models`. Anything else is
/// treated as a base URL.
pub fn models_url(endpoint: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let base = base.strip_suffix("/chat/completions").unwrap_or(base);
    if base.ends_with("/v1") {
        format!("{}/models", base)
    } else {
        format!("{}/v1/models", base)
    }
}
