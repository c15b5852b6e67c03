pub mod client;
pub mod conversation;
pub mod error;
pub mod request;
pub mod session;
pub mod state;
pub mod stream;

// Re-export main types for convenience
pub use client::CompletionClient;
pub use conversation::{Conversation, ConversationObserver};
pub use error::ChatError;
pub use request::{CompletionRequest, RequestParameters};
pub use session::send_prompt;
pub use state::{ChatMessage, ChatRole};
pub use stream::{DeltaExtractor, FragmentSink, FrameDecoder, PumpState, PumpSummary, StreamPump};
