use crate::client::CompletionClient;
use crate::conversation::Conversation;
use crate::error::ChatError;
use crate::request::RequestParameters;
use crate::stream::{PumpSummary, StreamPump};

/// Send `prompt` and stream the reply into `conversation` on the current task.
///
/// The conversation is the pump's sink, so every fragment is folded (and its
/// observers notified) before the next chunk is read. On failure the partial
/// reply is kept, the conversation is told about the error, and the error is
/// returned.
pub async fn send_prompt(
    conversation: &mut Conversation,
    client: &CompletionClient,
    params: &RequestParameters,
    prompt: &str,
) -> Result<PumpSummary, ChatError> {
    let request = conversation.submit(prompt, params)?;

    let result = match client.stream(params, &request).await {
        Ok(body) => StreamPump::new().run(body, &mut *conversation).await,
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        conversation.on_stream_failed(e);
    }
    result
}
