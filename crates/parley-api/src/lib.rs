//! Upstream LLM provider adapters and model routing for Parley.

mod anthropic;
mod demo;
mod gemini;
mod http;
mod openai;
mod router;
mod stream;

pub use anthropic::AnthropicProvider;
pub use demo::DemoProvider;
pub use gemini::GeminiProvider;
pub use http::http_client;
pub use openai::{OpenAiCompatibleProvider, TokenLimitParam};
pub use router::{ProviderKind, ProviderRegistry, ProviderSettings, Route, TemperaturePolicy};
pub use stream::{Delta, DeltaExtractor, SseDeltaStream};
