//! Conversation logic shared by the HTTP API and the gateway: classification,
//! session segmentation, prompt building and the completion backend.

pub mod classifier;
pub mod completion;
pub mod fallback;
pub mod prompt;
pub mod session;
