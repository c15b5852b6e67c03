//! The ordered message list and the reply being assembled into it.

use crate::error::ChatError;
use crate::request::{CompletionRequest, RequestParameters};
use crate::state::ChatMessage;
use crate::stream::FragmentSink;

/// Notified synchronously after every change to a [`Conversation`].
///
/// Notification happens inside the mutating call, so an observer sees each
/// fragment fold before the next one is applied.
pub trait ConversationObserver: Send {
    fn on_update(&mut self, messages: &[ChatMessage]);

    /// The in-flight reply ended with an error. The content it had is kept.
    fn on_error(&mut self, _error: &ChatError) {}
}

impl<F> ConversationObserver for F
where
    F: FnMut(&[ChatMessage]) + Send,
{
    fn on_update(&mut self, messages: &[ChatMessage]) {
        self(messages)
    }
}

/// Chat transcript with at most one assistant reply in flight.
///
/// The reply being streamed is tracked by its index, set on [`submit`] and
/// cleared when the stream completes or fails.
///
/// [`submit`]: Conversation::submit
#[derive(Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    in_flight: Option<usize>,
    observers: Vec<Box<dyn ConversationObserver>>,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("messages", &self.messages)
            .field("in_flight", &self.in_flight)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: impl ConversationObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The reply currently being assembled, if any.
    pub fn in_flight(&self) -> Option<&ChatMessage> {
        self.in_flight.and_then(|i| self.messages.get(i))
    }

    /// Add the user's prompt and an empty assistant reply, and build the
    /// request for everything before that reply.
    ///
    /// Rejected without touching the transcript while a reply is streaming.
    pub fn submit(
        &mut self,
        prompt: impl Into<String>,
        params: &RequestParameters,
    ) -> Result<CompletionRequest, ChatError> {
        if self.is_streaming() {
            return Err(ChatError::InvalidState("a reply is already streaming"));
        }

        self.messages.push(ChatMessage::user(prompt));
        let request = CompletionRequest::new(self.messages.clone(), params);

        self.messages.push(ChatMessage::assistant(String::new()));
        self.in_flight = Some(self.messages.len() - 1);

        tracing::debug!(
            messages = request.messages.len(),
            model = %request.model,
            "submitted prompt"
        );
        self.notify();
        Ok(request)
    }

    /// Append streamed text to the in-flight reply.
    pub fn on_fragment(&mut self, fragment: &str) -> Result<(), ChatError> {
        let index = self
            .in_flight
            .ok_or(ChatError::InvalidState("no reply is streaming"))?;

        if fragment.is_empty() {
            return Ok(());
        }

        let message = self
            .messages
            .get_mut(index)
            .ok_or(ChatError::InvalidState("in-flight reply is missing"))?;
        message.content.push_str(fragment);

        self.notify();
        Ok(())
    }

    /// The stream ended normally; the reply is final.
    pub fn on_stream_complete(&mut self) {
        if self.in_flight.take().is_some() {
            self.notify();
        }
    }

    /// The stream failed. The reply keeps the text received so far.
    pub fn on_stream_failed(&mut self, error: &ChatError) {
        if self.in_flight.take().is_none() {
            return;
        }
        tracing::warn!(error = %error, "reply ended early");
        self.notify();
        for observer in &mut self.observers {
            observer.on_error(error);
        }
    }

    /// Start over with an empty transcript. Not allowed mid-stream.
    pub fn clear(&mut self) -> Result<(), ChatError> {
        if self.is_streaming() {
            return Err(ChatError::InvalidState("cannot clear while a reply is streaming"));
        }
        self.messages.clear();
        self.notify();
        Ok(())
    }

    fn notify(&mut self) {
        for observer in &mut self.observers {
            observer.on_update(&self.messages);
        }
    }
}

impl FragmentSink for Conversation {
    fn on_fragment(&mut self, fragment: &str) {
        if let Err(e) = Conversation::on_fragment(self, fragment) {
            tracing::warn!(error = %e, "dropping fragment");
        }
    }

    fn on_complete(&mut self) {
        self.on_stream_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChatRole;
    use std::sync::{Arc, Mutex};

    fn params() -> RequestParameters {
        RequestParameters::default()
    }

    fn snapshots(conversation: &mut Conversation) -> Arc<Mutex<Vec<Vec<ChatMessage>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        conversation.add_observer(move |messages: &[ChatMessage]| {
            sink.lock().unwrap().push(messages.to_vec());
        });
        seen
    }

    #[test]
    fn test_submit_appends_prompt_and_placeholder() {
        let mut conversation = Conversation::new();
        let request = conversation.submit("hi", &params()).unwrap();

        assert_eq!(
            conversation.messages(),
            &[ChatMessage::user("hi"), ChatMessage::assistant("")]
        );
        assert_eq!(request.messages, vec![ChatMessage::user("hi")]);
        assert!(request.stream);
        assert!(conversation.is_streaming());
        assert_eq!(conversation.in_flight().map(|m| m.role), Some(ChatRole::Assistant));
    }

    #[test]
    fn test_request_carries_prior_turns() {
        let mut conversation = Conversation::new();
        conversation.submit("one", &params()).unwrap();
        conversation.on_fragment("first").unwrap();
        conversation.on_stream_complete();

        let request = conversation.submit("two", &params()).unwrap();
        assert_eq!(
            request.messages,
            vec![
                ChatMessage::user("one"),
                ChatMessage::assistant("first"),
                ChatMessage::user("two"),
            ]
        );
    }

    #[test]
    fn test_submit_while_streaming_is_rejected() {
        let mut conversation = Conversation::new();
        conversation.submit("hi", &params()).unwrap();
        conversation.on_fragment("Hel").unwrap();
        let before = conversation.messages().to_vec();

        let result = conversation.submit("again", &params());
        assert!(matches!(result, Err(ChatError::InvalidState(_))));
        assert_eq!(conversation.messages(), before.as_slice());
    }

    #[test]
    fn test_fragments_fold_in_order() {
        let mut conversation = Conversation::new();
        let seen = snapshots(&mut conversation);
        conversation.submit("hi", &params()).unwrap();

        for fragment in ["He", "", "ll", "o", " there"] {
            conversation.on_fragment(fragment).unwrap();
        }
        conversation.on_stream_complete();

        assert_eq!(conversation.messages()[1].content, "Hello there");
        assert!(!conversation.is_streaming());

        // submit + 4 non-empty folds + completion
        let seen = seen.lock().unwrap();
        let replies: Vec<&str> = seen.iter().map(|m| m[1].content.as_str()).collect();
        assert_eq!(replies, vec!["", "He", "Hell", "Hello", "Hello there", "Hello there"]);
    }

    #[test]
    fn test_fragment_without_reply_is_rejected() {
        let mut conversation = Conversation::new();
        assert!(matches!(
            conversation.on_fragment("x"),
            Err(ChatError::InvalidState(_))
        ));
        assert!(conversation.messages().is_empty());
    }

    #[test]
    fn test_failed_stream_keeps_partial_reply() {
        struct Errors(Arc<Mutex<Vec<String>>>);
        impl ConversationObserver for Errors {
            fn on_update(&mut self, _messages: &[ChatMessage]) {}
            fn on_error(&mut self, error: &ChatError) {
                self.0.lock().unwrap().push(error.to_string());
            }
        }

        let errors = Arc::new(Mutex::new(Vec::new()));
        let mut conversation = Conversation::new();
        conversation.add_observer(Errors(Arc::clone(&errors)));

        conversation.submit("hi", &params()).unwrap();
        conversation.on_fragment("Hel").unwrap();
        let err = ChatError::Status {
            status: 500,
            body: "oops".into(),
        };
        conversation.on_stream_failed(&err);
        conversation.on_stream_failed(&err);

        assert_eq!(conversation.messages()[1], ChatMessage::assistant("Hel"));
        assert!(!conversation.is_streaming());
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert!(conversation.on_fragment("lo").is_err());
        assert!(conversation.submit("next", &params()).is_ok());
    }

    #[tokio::test]
    async fn test_transport_error_mid_stream_keeps_folded_text() {
        use crate::stream::StreamPump;
        use futures_util::stream;

        #[derive(Default)]
        struct Counts {
            updates: Vec<String>,
            errors: usize,
        }
        struct Counter(Arc<Mutex<Counts>>);
        impl ConversationObserver for Counter {
            fn on_update(&mut self, messages: &[ChatMessage]) {
                let reply = messages.last().map(|m| m.content.clone()).unwrap_or_default();
                self.0.lock().unwrap().updates.push(reply);
            }
            fn on_error(&mut self, _error: &ChatError) {
                self.0.lock().unwrap().errors += 1;
            }
        }

        fn event(content: &str) -> Vec<u8> {
            format!(
                "data: {}\n\n",
                serde_json::json!({"choices": [{"delta": {"content": content}}]})
            )
            .into_bytes()
        }

        let counts = Arc::new(Mutex::new(Counts::default()));
        let mut conversation = Conversation::new();
        conversation.add_observer(Counter(Arc::clone(&counts)));
        conversation.submit("hi", &params()).unwrap();

        let body = stream::iter(vec![
            Ok(event("par")),
            Ok(event("tial")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(event("never")),
        ]);
        let result = StreamPump::new().run(body, &mut conversation).await;
        let err = result.unwrap_err();
        assert!(err.is_transport());
        conversation.on_stream_failed(&err);

        assert_eq!(conversation.messages()[1], ChatMessage::assistant("partial"));
        assert!(!conversation.is_streaming());

        let counts = counts.lock().unwrap();
        // submit, two folds, then one final update for the failure
        assert_eq!(counts.updates, vec!["", "par", "partial", "partial"]);
        assert_eq!(counts.errors, 1);
    }

    #[test]
    fn test_clear_only_when_idle() {
        let mut conversation = Conversation::new();
        conversation.submit("hi", &params()).unwrap();
        assert!(conversation.clear().is_err());

        conversation.on_stream_complete();
        conversation.clear().unwrap();
        assert!(conversation.messages().is_empty());
    }
}
