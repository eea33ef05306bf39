//! Client facades composing transport, classification and retry.

pub mod blocking;

mod async_task;
mod builder;
mod core;
mod stream;

pub use async_task::AsyncPredictionTask;
pub use builder::ClientBuilder;
pub use core::Client;
pub use stream::PredictionStream;
