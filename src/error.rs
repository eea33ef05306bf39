//! Error taxonomy: classified service failures, retry aggregates, and the
//! crate-wide error enum.
//!
//! Status dispatch is table-driven: each status code (or range) maps to a
//! message template and a fixed `requires_retry` verdict. The synthetic
//! codes 599, 5000 and 5320 are produced server- or classifier-side for
//! client-detected and broker-level issues and classify like any other 5xx.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::response::Envelope;

const CONTENT_PREVIEW_LIMIT: usize = 250;

/// Unified error type for the SDK.
///
/// A top-level call resolves to a typed result or to exactly one of
/// [`Error::RetryExhausted`], [`Error::RetryTimeout`] or [`Error::Config`];
/// the remaining variants surface transport/decoding faults that are not
/// part of the retry contract and propagate unwrapped.
#[derive(Debug, Error)]
pub enum Error {
    /// A single classified service failure. Inside the SDK this drives the
    /// retry loop; callers only see it from a streaming iterator, where one
    /// failed frame ends the stream.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Every attempt of a retry run failed; carries the ordered history.
    #[error("all attempts failed: {0}")]
    RetryExhausted(RetryHistory),

    /// The wall-clock deadline elapsed before the retried operation
    /// resolved. Distinct from [`Error::RetryExhausted`]: ran out of time,
    /// not out of attempts.
    #[error("retry deadline of {waited:?} exceeded before the operation resolved")]
    RetryTimeout { waited: Duration },

    /// Invalid construction-time input (malformed model identifier, bad
    /// base URL override). Raised synchronously, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Stream cancellation was requested before the server announced a
    /// prediction id.
    #[error("stream cancellation error: {0}")]
    Cancellation(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A classified failure produced by the status taxonomy.
///
/// Carries the human-readable message, the retry verdict, and a back
/// reference to the originating envelope so downstream code can inspect
/// status, URL or content later (the stream iterator mines it for
/// `stream_details` even on the terminal error frame).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub requires_retry: bool,
    pub envelope: Option<Envelope>,
}

impl ApiError {
    /// Classify an error envelope by status range.
    pub fn from_envelope(envelope: Envelope) -> Self {
        if envelope.status >= 500 {
            Self::from_server(envelope)
        } else if envelope.status >= 400 {
            Self::from_request(envelope)
        } else {
            // Sub-400 status flagged by the classifier (a `details` payload
            // alongside a non-200 success status).
            Self {
                message: format!(
                    "anomalous response ({}): request url: {}",
                    envelope.status, envelope.context.url
                ),
                requires_retry: false,
                envelope: Some(envelope),
            }
        }
    }

    fn from_server(envelope: Envelope) -> Self {
        let message = format!(
            "internal server error ({}): request url: {}; content: {}; Timestamp: {}",
            envelope.status,
            envelope.context.url,
            envelope.content_preview(CONTENT_PREVIEW_LIMIT),
            Utc::now().to_rfc3339(),
        );
        Self {
            message,
            requires_retry: server_requires_retry(envelope.status),
            envelope: Some(envelope),
        }
    }

    fn from_request(envelope: Envelope) -> Self {
        let rule = request_rule(envelope.status);
        Self {
            message: (rule.render)(&envelope),
            requires_retry: rule.requires_retry,
            envelope: Some(envelope),
        }
    }
}

/// Fixed retryability table for server-side statuses, including the
/// synthetic broker codes. Unlisted codes default to non-retryable.
const SERVER_RETRY: &[(u16, bool)] = &[
    (500, false),
    (502, true),
    (503, false),
    (504, true),
    (524, true),
    (599, false),
    (5000, false),
    (5320, true),
];

fn server_requires_retry(status: u16) -> bool {
    SERVER_RETRY
        .iter()
        .find(|(code, _)| *code == status)
        .map_or(false, |(_, retry)| *retry)
}

/// Message template + retry verdict for one request-side status code.
struct RequestRule {
    requires_retry: bool,
    render: fn(&Envelope) -> String,
}

fn request_rule(status: u16) -> RequestRule {
    match status {
        400 => RequestRule {
            requires_retry: false,
            render: render_raw_body,
        },
        401 => RequestRule {
            requires_retry: false,
            render: render_credentials,
        },
        421 | 422 => RequestRule {
            requires_retry: false,
            render: render_with_detail,
        },
        // Requested too early; the server expects the caller to come back.
        425 => RequestRule {
            requires_retry: true,
            render: render_generic,
        },
        _ => RequestRule {
            requires_retry: false,
            render: render_generic,
        },
    }
}

fn render_generic(envelope: &Envelope) -> String {
    format!(
        "bad request ({}): request url: {}",
        envelope.status, envelope.context.url
    )
}

fn render_raw_body(envelope: &Envelope) -> String {
    format!("bad request happened: {}", envelope.text())
}

fn render_credentials(_: &Envelope) -> String {
    "authentication error: verify your credentials!".to_owned()
}

fn render_with_detail(envelope: &Envelope) -> String {
    let mut message = render_generic(envelope);
    let detail = envelope
        .json()
        .ok()
        .and_then(|body| body.get("detail").cloned());
    match detail {
        Some(Value::String(text)) => message.push_str(&format!("; detail: {text}")),
        Some(other) => message.push_str(&format!("; detail: {other}")),
        None => {}
    }
    message
}

/// Ordered record of the classified failures seen across one retry run.
///
/// Owned by a single engine invocation; never longer than the number of
/// attempts actually executed.
#[derive(Debug, Clone, Default)]
pub struct RetryHistory {
    errors: Vec<ApiError>,
}

impl RetryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, error: ApiError) {
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[ApiError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ApiError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for RetryHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "no attempts recorded");
        }
        let joined = self
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{joined}")
    }
}
