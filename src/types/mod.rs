pub mod events;
pub mod message;

pub use events::StreamEvent;
pub use message::{ChatMessage, CompletionRequest, Role};
