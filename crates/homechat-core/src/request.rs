use serde::{Deserialize, Serialize};

use crate::state::ChatMessage;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "/models/llama-2-70b-chat-hf";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_TOP_P: f32 = 1.0;

/// Settings the front end may change between submissions.
///
/// The core does not validate these; they are copied into the outbound
/// request as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestParameters {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for RequestParameters {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Body of the POST sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub stream: bool,
}

impl CompletionRequest {
    /// Build a streaming request for `messages` with the given parameters.
    pub fn new(messages: Vec<ChatMessage>, params: &RequestParameters) -> Self {
        Self {
            messages,
            max_tokens: params.max_tokens,
            model: params.model.clone(),
            temperature: params.temperature,
            top_p: params.top_p,
            stream: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let params = RequestParameters {
            temperature: 0.5,
            top_p: 0.25,
            max_tokens: 64,
            ..RequestParameters::default()
        };
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")], &params);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}],
                "max_tokens": 64,
                "model": "/models/llama-2-70b-chat-hf",
                "temperature": 0.5,
                "top_p": 0.25,
                "stream": true,
            })
        );
    }

    #[test]
    fn test_default_parameters() {
        let params = RequestParameters::default();
        assert_eq!(params.endpoint, "http://localhost:8000/v1/chat/completions");
        assert_eq!(params.max_tokens, 2048);
    }
}
