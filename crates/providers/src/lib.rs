//! LLM provider adapters.
//!
//! The decision policy talks to remote models through the
//! provider-agnostic [`LlmProvider`] trait. Adapters translate between
//! the internal request type and each endpoint's wire format; the
//! registry builds them from config.

pub mod openai_compat;
pub mod parse;
pub mod registry;
pub mod stub;
pub mod traits;

pub use parse::parse_json_response;
pub use registry::ProviderRegistry;
pub use stub::StubProvider;
pub use traits::{CompletionRequest, CompletionResponse, LlmProvider};
