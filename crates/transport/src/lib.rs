//! fieldops-transport: how requests reach the field-service API.
//!
//! [`ApiTransport`] is the seam the resource client is written against.
//! Two implementations ship here:
//!
//! - [`HttpTransport`]: the real API over `ureq`, with session cookie,
//!   timeouts, chunked send progress and cancellation
//! - [`MemoryTransport`]: an in-memory emulator of the API, used by tests
//!   and offline demos
//!
//! The [`conformance`] module checks any backend against the behaviour the
//! client relies on.

pub mod conformance;
mod error;
mod http;
mod memory;
mod request;
mod traits;

pub use error::TransportError;
pub use http::{HttpTransport, DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT};
pub use memory::{Injected, MemoryTransport};
pub use request::{
    urldecoded, urlencoded, ApiRequest, ApiResponse, CancelToken, Method, MultipartForm,
    MultipartPart, ProgressFn, RequestBody, SendOptions,
};
pub use traits::ApiTransport;
