//! Engine Adapter: one independently configured inference engine per brain.
//!
//! Both brains share the [`InferenceBackend`] contract and nothing else;
//! an [`EngineAdapter`] adds FIFO queueing, deadlines and cancellation.

pub mod adapter;
pub mod backend;
pub mod errors;
pub mod fallback;
pub mod http;

pub use adapter::{EngineAdapter, EngineSession, EngineStatus};
pub use backend::InferenceBackend;
pub use errors::{BackendError, EngineError};
pub use fallback::FallbackBackend;
pub use http::{system_prompt, HttpBackend};
