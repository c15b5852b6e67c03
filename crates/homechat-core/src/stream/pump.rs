use futures_util::{Stream, StreamExt};

use super::decoder::FrameDecoder;
use super::extractor::DeltaExtractor;
use crate::error::ChatError;

/// Receives the output of a [`StreamPump`].
///
/// Calls are made in order on the pump's own control flow; the next chunk is
/// not read until the previous call has returned.
pub trait FragmentSink {
    /// A non-empty piece of reply text.
    fn on_fragment(&mut self, fragment: &str);

    /// The transport ended the stream. Called at most once, after every
    /// fragment.
    fn on_complete(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Counters for one pumped stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    pub chunks: usize,
    pub fragments: usize,
    pub skipped_frames: usize,
}

/// Drives a response body through decoding and extraction.
///
/// A pump handles exactly one stream. There are no retries: a transport error
/// ends the run and is returned to the caller, leaving whatever the sink has
/// already received in place.
#[derive(Debug)]
pub struct StreamPump {
    state: PumpState,
    decoder: FrameDecoder,
    extractor: DeltaExtractor,
    summary: PumpSummary,
}

impl Default for StreamPump {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamPump {
    pub fn new() -> Self {
        Self {
            state: PumpState::Idle,
            decoder: FrameDecoder::new(),
            extractor: DeltaExtractor::new(),
            summary: PumpSummary::default(),
        }
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    pub fn summary(&self) -> PumpSummary {
        PumpSummary {
            skipped_frames: self.extractor.skipped_frames(),
            ..self.summary
        }
    }

    /// Consume `body` until it ends or fails, feeding `sink` along the way.
    pub async fn run<S, B, E, K>(&mut self, body: S, sink: &mut K) -> Result<PumpSummary, ChatError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        K: FragmentSink + ?Sized,
    {
        if self.state != PumpState::Idle {
            return Err(ChatError::InvalidState("stream pump has already run"));
        }
        self.state = PumpState::Running;

        let mut body = std::pin::pin!(body);

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    self.state = PumpState::Failed;
                    let err = ChatError::Transport(e.into());
                    tracing::warn!(error = %err, chunks = self.summary.chunks, "stream aborted");
                    return Err(err);
                }
            };

            self.summary.chunks += 1;
            let segment = self.decoder.decode(chunk.as_ref());
            let fragment = self.extractor.extract(&segment);
            self.deliver(&fragment, sink);
        }

        let tail = self.decoder.finish();
        let mut fragment = self.extractor.extract(&tail);
        fragment.push_str(&self.extractor.finish());
        self.deliver(&fragment, sink);

        self.state = PumpState::Completed;
        sink.on_complete();

        let summary = self.summary();
        tracing::info!(
            chunks = summary.chunks,
            fragments = summary.fragments,
            skipped_frames = summary.skipped_frames,
            "stream completed"
        );
        Ok(summary)
    }

    fn deliver<K: FragmentSink + ?Sized>(&mut self, fragment: &str, sink: &mut K) {
        if fragment.is_empty() {
            return;
        }
        self.summary.fragments += 1;
        sink.on_fragment(fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[derive(Default)]
    struct Recorder {
        fragments: Vec<String>,
        completions: usize,
    }

    impl FragmentSink for Recorder {
        fn on_fragment(&mut self, fragment: &str) {
            assert_eq!(self.completions, 0, "fragment after completion");
            self.fragments.push(fragment.to_string());
        }

        fn on_complete(&mut self) {
            self.completions += 1;
        }
    }

    fn event(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn ok_chunks(chunks: Vec<Vec<u8>>) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> {
        stream::iter(chunks.into_iter().map(Ok))
    }

    fn body(contents: &[&str]) -> Vec<u8> {
        let mut raw: String = contents.iter().map(|c| event(c)).collect();
        raw.push_str("data: [DONE]\n\n");
        raw.into_bytes()
    }

    async fn pump_text(chunks: Vec<Vec<u8>>) -> String {
        let mut sink = Recorder::default();
        StreamPump::new().run(ok_chunks(chunks), &mut sink).await.unwrap();
        assert_eq!(sink.completions, 1);
        sink.fragments.concat()
    }

    #[tokio::test]
    async fn test_one_fragment_per_chunk_in_order() {
        let chunks = vec![
            br#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#.to_vec(),
            br#"data: {"choices":[{"delta":{"content":"lo"}}]} data: [DONE]"#.to_vec(),
        ];
        let mut sink = Recorder::default();
        let mut pump = StreamPump::new();
        let summary = pump.run(ok_chunks(chunks), &mut sink).await.unwrap();

        assert_eq!(sink.fragments, vec!["Hel", "lo"]);
        assert_eq!(sink.completions, 1);
        assert_eq!(pump.state(), PumpState::Completed);
        assert_eq!(
            summary,
            PumpSummary {
                chunks: 2,
                fragments: 2,
                skipped_frames: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_chunk_with_two_events_is_one_fragment() {
        let chunk = format!("{}{}", event("Hel"), event("lo")).into_bytes();
        let mut sink = Recorder::default();
        StreamPump::new().run(ok_chunks(vec![chunk]), &mut sink).await.unwrap();
        assert_eq!(sink.fragments, vec!["Hello"]);
    }

    #[tokio::test]
    async fn test_empty_fragments_are_not_delivered() {
        let chunks = vec![
            event("").into_bytes(),
            b"data: [DONE]\n\n".to_vec(),
            b"".to_vec(),
        ];
        let mut sink = Recorder::default();
        let summary = StreamPump::new().run(ok_chunks(chunks), &mut sink).await.unwrap();
        assert!(sink.fragments.is_empty());
        assert_eq!(sink.completions, 1);
        assert_eq!(summary.fragments, 0);
    }

    #[tokio::test]
    async fn test_chunking_does_not_change_text() {
        let raw = body(&["Gr", "üß", " 🦀", " dich", "!"]);
        let whole = pump_text(vec![raw.clone()]).await;
        assert_eq!(whole, "Grüß 🦀 dich!");

        for size in [1, 2, 3, 5, 7, 16, 41] {
            let chunks = raw.chunks(size).map(<[u8]>::to_vec).collect();
            assert_eq!(pump_text(chunks).await, whole, "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn test_malformed_event_is_skipped() {
        let raw = format!("{}data: {{not json}}\n\n{}", event("a"), event("b"));
        let mut sink = Recorder::default();
        let summary = StreamPump::new()
            .run(ok_chunks(vec![raw.into_bytes()]), &mut sink)
            .await
            .unwrap();
        assert_eq!(sink.fragments.concat(), "ab");
        assert_eq!(summary.skipped_frames, 1);
    }

    #[tokio::test]
    async fn test_transport_error_stops_without_completion() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(event("par").into_bytes()),
            Ok(event("tial").into_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(event("never").into_bytes()),
        ];
        let mut sink = Recorder::default();
        let mut pump = StreamPump::new();
        let result = pump.run(stream::iter(chunks), &mut sink).await;

        assert!(matches!(result, Err(ChatError::Transport(_))));
        assert_eq!(pump.state(), PumpState::Failed);
        assert_eq!(sink.fragments, vec!["par", "tial"]);
        assert_eq!(sink.completions, 0);
    }

    #[tokio::test]
    async fn test_pump_runs_once() {
        let mut pump = StreamPump::new();
        let mut sink = Recorder::default();
        pump.run(ok_chunks(vec![]), &mut sink).await.unwrap();
        assert_eq!(sink.completions, 1);

        let again = pump.run(ok_chunks(vec![event("x").into_bytes()]), &mut sink).await;
        assert!(matches!(again, Err(ChatError::InvalidState(_))));
        assert!(sink.fragments.is_empty());
        assert_eq!(sink.completions, 1);
    }
}
