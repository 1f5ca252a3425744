pub mod account;
pub mod generation;
pub mod token;

pub use account::{AccountRecord, AccountStore, RefreshCredential};
pub use generation::{
    ChatMessage, ContentBlock, GenerationRequest, GenerationResult, MessageContent, Role,
    StopReason, Usage,
};
pub use token::{CachedToken, TokenResponse};
