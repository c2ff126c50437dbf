// Unified data model shared by all provider translators and parsers

mod credentials;
mod mapping;
mod message;
mod options;
mod response;

pub use credentials::{AccountIdentity, Credentials};
pub use mapping::{model_group, Provider};
pub use message::{Content, Message, Role, ThinkingConfig};
pub use options::{ChatOptions, ToolDefinition};
pub use response::{ChatChunk, PartType, ResponsePart, UnifiedResponse, Usage};
