//! Incremental decoding of a streamed chat completion.
//!
//! The response body arrives as arbitrary byte chunks. Each chunk goes through
//! the [`FrameDecoder`] (bytes to text), then the [`DeltaExtractor`] (text to
//! the content delta of every `data:` event in it), and the [`StreamPump`]
//! hands the resulting fragment to a [`FragmentSink`].
//!
//! Wire format handled here (OpenAI-compatible):
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```

pub mod decoder;
pub mod extractor;
pub mod pump;

pub use decoder::FrameDecoder;
pub use extractor::DeltaExtractor;
pub use pump::{FragmentSink, PumpState, PumpSummary, StreamPump};
