//! HTTP transports owned by the client facades.

mod blocking;
mod http;

pub use blocking::BlockingTransport;
pub use http::HttpTransport;

/// Correlation header attached to every outgoing request.
pub(crate) const REQUEST_ID_HEADER: &str = "x-skyinfer-request-id";
