// unichat - vendor-neutral chat core over incompatible LLM HTTP APIs

pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod session;
pub mod streaming;
pub mod trace;
pub mod translation;

pub use chat::ChatClient;
pub use error::{CoreError, Result};
pub use models::{
    AccountIdentity, ChatChunk, Content, Credentials, Message, PartType, Provider, ResponsePart,
    Role, UnifiedResponse, Usage,
};
