use serde::Deserialize;

use crate::error::ChatError;

/// Separator between events in a decoded segment.
pub const DELIMITER: &str = "data:";

/// Longest unparsed tail carried from one segment into the next.
///
/// A body that never forms an event (an HTML error page, a non-streamed JSON
/// reply) is dropped in pieces of this size instead of being buffered whole.
pub const MAX_CARRY: usize = 16 * 1024;

#[derive(Deserialize)]
struct CompletionChunk {
    // only the first choice is read; the rest may have any shape
    choices: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Parse one `data:` candidate and return its `choices[0].delta.content`.
///
/// A missing or null `content` is an empty delta. Anything that is not a
/// completion event (the `[DONE]` sentinel, blank text, truncated JSON, an
/// object without `choices[0].delta`) is a [`ChatError::MalformedFrame`].
pub fn extract_candidate(candidate: &str) -> Result<String, ChatError> {
    let chunk: CompletionChunk = serde_json::from_str(candidate)
        .map_err(|e| ChatError::MalformedFrame(e.to_string()))?;

    let first = chunk
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::MalformedFrame("event has no choices".to_string()))?;
    let choice: ChunkChoice = serde_json::from_value(first)
        .map_err(|e| ChatError::MalformedFrame(e.to_string()))?;

    Ok(choice.delta.content.unwrap_or_default())
}

/// Pulls content deltas out of decoded text segments.
///
/// Each segment is split on `data:` and every candidate is parsed on its own.
/// Candidates that fail to parse are skipped, never reported: the stream
/// interleaves non-JSON sentinels with events and must keep going. When the
/// last candidate of a segment fails it may simply be cut off by the chunk
/// boundary, so it is carried into the next segment instead of being dropped,
/// unless it is already longer than [`MAX_CARRY`].
///
/// A delta whose text itself contains `data:` is split by the plain split and
/// lost. The wire format gives no way to tell the two apart.
#[derive(Debug, Default)]
pub struct DeltaExtractor {
    carry: String,
    skipped: usize,
}

impl DeltaExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concatenated deltas of every complete event in `segment`.
    pub fn extract(&mut self, segment: &str) -> String {
        let mut text = std::mem::take(&mut self.carry);
        text.push_str(segment);

        let mut fragment = String::new();
        let mut candidates = text.split(DELIMITER).peekable();

        while let Some(candidate) = candidates.next() {
            match extract_candidate(candidate) {
                Ok(delta) => fragment.push_str(&delta),
                Err(err) if candidates.peek().is_none() => {
                    if candidate.len() > MAX_CARRY {
                        self.skip(candidate, &err);
                    } else {
                        self.carry = candidate.to_string();
                    }
                }
                Err(err) => self.skip(candidate, &err),
            }
        }

        fragment
    }

    /// Resolve the carried candidate at end of stream.
    pub fn finish(&mut self) -> String {
        let carry = std::mem::take(&mut self.carry);
        match extract_candidate(&carry) {
            Ok(delta) => delta,
            Err(err) => {
                self.skip(&carry, &err);
                String::new()
            }
        }
    }

    /// Non-blank candidates dropped so far (sentinels included).
    pub fn skipped_frames(&self) -> usize {
        self.skipped
    }

    fn skip(&mut self, candidate: &str, err: &ChatError) {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return;
        }
        self.skipped += 1;
        tracing::debug!(len = candidate.len(), error = %err, "skipping frame");
    }
}
