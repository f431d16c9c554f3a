//! Stream relay, stream consumer and chat session orchestration for Parley.

mod client;
mod consumer;
pub mod protocol;
mod relay;
mod session;

pub use client::{ClientError, OpenedStream, RelayClient};
pub use consumer::{CancelHandle, ERROR_PREFIX, StreamConsumer, StreamState};
pub use relay::{Relay, RelayOptions, RelayRequest, fold_attachments};
pub use session::ChatSession;
