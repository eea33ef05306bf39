//! Classified response envelopes and the transport facts behind them.

mod factory;

pub use factory::ResponseFactory;

use std::borrow::Cow;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::{Error, Result};

/// Facts about the originating request and transport response: URL, method,
/// HTTP status and headers. Immutable once captured; for streaming calls it
/// is captured once when the connection opens and shared by every frame.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub url: Url,
    pub method: Method,
    pub status: u16,
    pub headers: HeaderMap,
}

impl ResponseContext {
    pub fn new(method: Method, url: Url, status: u16, headers: HeaderMap) -> Self {
        Self {
            url,
            method,
            status,
            headers,
        }
    }

    pub(crate) fn of_async(method: Method, response: &reqwest::Response) -> Self {
        Self {
            url: response.url().clone(),
            method,
            status: response.status().as_u16(),
            headers: response.headers().clone(),
        }
    }

    pub(crate) fn of_blocking(method: Method, response: &reqwest::blocking::Response) -> Self {
        Self {
            url: response.url().clone(),
            method,
            status: response.status().as_u16(),
            headers: response.headers().clone(),
        }
    }

    /// Stand-in for record sources with no transport response behind them.
    pub(crate) fn detached() -> Self {
        Self {
            url: Url::parse("sse://detached").expect("static url is well-formed"),
            method: Method::GET,
            status: 200,
            headers: HeaderMap::new(),
        }
    }
}

/// A fully-buffered transport response, ready for classification.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub context: ResponseContext,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(context: ResponseContext, body: impl Into<Bytes>) -> Self {
        Self {
            context,
            body: body.into(),
        }
    }

    pub async fn from_async(method: Method, response: reqwest::Response) -> Result<Self> {
        let context = ResponseContext::of_async(method, &response);
        let body = response.bytes().await?;
        Ok(Self { context, body })
    }

    pub fn from_blocking(method: Method, response: reqwest::blocking::Response) -> Result<Self> {
        let context = ResponseContext::of_blocking(method, &response);
        let body = response.bytes()?;
        Ok(Self { context, body })
    }
}

/// A classified, status-checked unit of response data.
///
/// `is_event` distinguishes control events (stream metadata) from data
/// frames. Envelopes handed to business logic always carry a success
/// status; error envelopes only travel inside [`crate::ApiError`].
#[derive(Debug, Clone)]
pub struct Envelope {
    pub status: u16,
    pub is_event: bool,
    pub content: Bytes,
    pub context: ResponseContext,
    parsed: OnceCell<Value>,
}

impl Envelope {
    pub(crate) fn new(status: u16, is_event: bool, content: Bytes, context: ResponseContext) -> Self {
        Self {
            status,
            is_event,
            content,
            context,
            parsed: OnceCell::new(),
        }
    }

    pub(crate) fn with_parsed(
        status: u16,
        is_event: bool,
        content: Bytes,
        context: ResponseContext,
        parsed: Value,
    ) -> Self {
        Self {
            status,
            is_event,
            content,
            context,
            parsed: OnceCell::with_value(parsed),
        }
    }

    /// Memoized JSON view of the content.
    pub fn json(&self) -> Result<&Value> {
        self.parsed
            .get_or_try_init(|| serde_json::from_slice(&self.content).map_err(Error::Decode))
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    pub(crate) fn content_preview(&self, limit: usize) -> String {
        let cut = self.content.len().min(limit);
        String::from_utf8_lossy(&self.content[..cut]).into_owned()
    }
}
