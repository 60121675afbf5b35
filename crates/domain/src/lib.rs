//! `im-domain`: types shared by every imsim crate: the error taxonomy,
//! configuration, access tokens, and conversation stream events.

pub mod config;
pub mod error;
pub mod stream;
pub mod token;

pub use error::{Error, Result};
pub use stream::{StreamErrorKind, StreamEvent};
pub use token::{AccessToken, ConversationId, SessionStatus};
