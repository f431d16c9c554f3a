//! Shared conversation types, error hierarchy and wire framing for Parley.

pub mod error;
pub mod event;
pub mod frame;
pub mod message;
pub mod provider;
pub mod sse;
mod util;

pub use error::{ConfigError, ProviderError};
pub use event::StreamEvent;
pub use message::*;
pub use provider::ProviderModelRef;
pub use util::{ellipsize, truncate_str};
