//! # skyinfer
//!
//! Client SDK for the SkyInfer inference API.
//!
//! The service answers prediction requests either buffered (one logical
//! result per call) or streamed (a sequence of partial results pushed as
//! Server-Sent Events over a long-lived HTTP response). This crate wraps
//! both shapes behind typed operations and a shared execution core:
//!
//! - **SSE decoding**: the [`sse`] module turns raw response lines into
//!   discrete event records with a memoized JSON view.
//! - **Classification**: every transport result - plain HTTP or SSE frame -
//!   passes through [`response::ResponseFactory`], which produces either a
//!   successful [`response::Envelope`] or a classified [`ApiError`] with a
//!   `requires_retry` verdict.
//! - **Retry**: the [`retry`] engine drives bounded or deadline-driven
//!   attempt loops over classified failures, collecting the full failure
//!   history, identically for the async and the blocking client.
//! - **Streaming**: [`PredictionStream`] is a pull-based iterator over an
//!   in-flight streaming prediction that understands control events
//!   (stream-id announcements, cancellation notices) and supports
//!   server-side cancellation.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use skyinfer::{Client, Payload};
//!
//! #[tokio::main]
//! async fn main() -> skyinfer::Result<()> {
//!     let client = Client::builder("sk-your-api-key")
//!         .model("acme/whisper-large")
//!         .build()?;
//!
//!     let payload = Payload::new().field("prompt", "Hello!");
//!     let prediction = client.predict(&payload, None, None).await?;
//!     println!("{}", prediction.output_data);
//!
//!     let mut stream = client.stream(&payload, None).await?;
//!     while let Some(partial) = stream.next().await {
//!         println!("{:?}", partial?.output_data);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! A blocking client with the same surface lives in [`client::blocking`].

pub mod client;
pub mod config;
pub mod error;
pub mod payload;
pub mod response;
pub mod retry;
pub mod route;
pub mod sse;
pub mod transport;
pub mod types;

pub use client::{AsyncPredictionTask, Client, ClientBuilder, PredictionStream};
pub use config::ClientConfig;
pub use error::{ApiError, Error, RetryHistory};
pub use payload::Payload;
pub use response::{Envelope, RawResponse, ResponseContext, ResponseFactory};
pub use retry::RetryPolicy;
pub use sse::{ServerSentEvent, SseDecoder};
pub use types::{
    AsyncPredictionResponse, AsyncPredictionResponseList, EventType, OpenAPISchemaResponse,
    PredictionEvent, PredictionPartial, PredictionResponse, StreamDetails,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library.
pub type Result<T> = std::result::Result<T, Error>;

/// A pinned, boxed stream of fallible items.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;
