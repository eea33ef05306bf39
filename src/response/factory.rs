//! The single classification point between the transport and business
//! logic. Every result of predict / stream / openapi / cancel operations -
//! plain HTTP or SSE-derived - passes through here before anything else
//! sees it.

use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;
use crate::response::{Envelope, RawResponse, ResponseContext};
use crate::sse::ServerSentEvent;
use crate::{Error, Result};

/// Turns one raw transport result into a successful [`Envelope`] or a
/// classified failure.
pub enum ResponseFactory {
    Http(RawResponse),
    Sse {
        record: ServerSentEvent,
        context: Option<ResponseContext>,
    },
}

impl ResponseFactory {
    pub fn from_http(raw: RawResponse) -> Self {
        Self::Http(raw)
    }

    /// `context` carries the transport facts of the streaming response the
    /// record arrived on; pass `None` for sources with no HTTP response
    /// behind them (the effective status then defaults to 200).
    pub fn from_sse(record: ServerSentEvent, context: Option<ResponseContext>) -> Self {
        Self::Sse { record, context }
    }

    pub fn construct(self) -> Result<Envelope> {
        match self {
            Self::Http(raw) => Self::construct_from_http(raw),
            Self::Sse { record, context } => Self::construct_from_sse(record, context),
        }
    }

    fn construct_from_http(raw: RawResponse) -> Result<Envelope> {
        let RawResponse { context, body } = raw;
        let envelope = Envelope::new(context.status, false, body, context);
        if envelope.status < 400 {
            Ok(envelope)
        } else {
            debug!(status = envelope.status, url = %envelope.context.url, "response classified as failure");
            Err(Error::Api(ApiError::from_envelope(envelope)))
        }
    }

    fn construct_from_sse(record: ServerSentEvent, context: Option<ResponseContext>) -> Result<Envelope> {
        let context = context.unwrap_or_else(ResponseContext::detached);
        let payload: Value = record.json()?.clone();

        let mut status = payload
            .get("status")
            .and_then(Value::as_u64)
            .map(|status| status as u16)
            .unwrap_or(context.status);

        // A success status next to a `details` payload is itself anomalous;
        // report it under the synthetic client-detected code.
        let has_details = payload.get("details").map_or(false, |details| !details.is_null());
        if has_details && status == 200 {
            status = 599;
        }

        let content = if record.data().is_empty() {
            Bytes::from(record.event().unwrap_or_default().to_owned())
        } else {
            Bytes::from(record.data().to_owned())
        };
        let is_event = record.event().is_some();
        let envelope = Envelope::with_parsed(status, is_event, content, context, payload);

        if envelope.status < 400 && !has_details {
            Ok(envelope)
        } else {
            debug!(status = envelope.status, url = %envelope.context.url, "sse frame classified as failure");
            Err(Error::Api(ApiError::from_envelope(envelope)))
        }
    }
}
