//! `im-conversation`: conversation operations against the messaging REST
//! API, authenticated from the shared [`im_credentials::SessionState`].

pub mod client;
pub mod types;

pub use client::{ConversationService, RestConversationClient};
pub use types::{CreatedConversation, EntriesDirection, SentFile, SentMessage};
