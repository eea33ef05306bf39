//! Typed results decoded from classified envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, RetryHistory};
use crate::response::Envelope;
use crate::Result;

/// Tags a control event may carry alongside the data frames of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// The server announced the stream's prediction id.
    StreamId,
    /// A cancellation is in progress for this stream.
    Cancelling,
    /// Forward-compatible catch-all for tags this version does not know.
    Unknown,
}

impl EventType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "id" => Self::StreamId,
            "stream_cancelling" => Self::Cancelling,
            _ => Self::Unknown,
        }
    }
}

/// Usage summary reported on the terminal frame of a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDetails {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    #[serde(rename = "model_size_in_billions")]
    pub size_in_billions: Option<f64>,
}

/// Final result of a buffered prediction call.
#[derive(Debug, Clone)]
pub struct PredictionResponse {
    /// Classified failures of the attempts that preceded this success.
    pub exc_history: Vec<ApiError>,
    pub output_data: Value,
    pub status: u16,
    pub inference_time: Option<f64>,
}

impl PredictionResponse {
    pub(crate) fn from_envelope(envelope: &Envelope, history: RetryHistory) -> Result<Self> {
        #[derive(Deserialize)]
        struct Body {
            status: Option<u16>,
            #[serde(default)]
            output_data: Value,
            inference_time: Option<f64>,
        }
        let body: Body = serde_json::from_value(envelope.json()?.clone())?;
        Ok(Self {
            exc_history: history.into_errors(),
            output_data: body.output_data,
            status: body.status.unwrap_or(envelope.status),
            inference_time: body.inference_time,
        })
    }
}

/// One partial result yielded by a prediction stream.
#[derive(Debug, Clone)]
pub struct PredictionPartial {
    pub status: u16,
    pub output_data: Option<Value>,
}

impl PredictionPartial {
    pub(crate) fn from_envelope(envelope: &Envelope) -> Result<Self> {
        #[derive(Deserialize)]
        struct Body {
            status: Option<u16>,
            #[serde(default)]
            output_data: Option<Value>,
        }
        let body: Body = serde_json::from_value(envelope.json()?.clone())?;
        Ok(Self {
            status: body.status.unwrap_or(envelope.status),
            output_data: body.output_data,
        })
    }
}

/// A decoded control event.
#[derive(Debug, Clone)]
pub struct PredictionEvent {
    pub status: u16,
    pub event_type: EventType,
    /// Set on [`EventType::StreamId`] events.
    pub prediction_id: Option<String>,
}

impl PredictionEvent {
    pub(crate) fn from_envelope(envelope: &Envelope) -> Result<Self> {
        #[derive(Deserialize)]
        struct Body {
            status: Option<u16>,
            event_type: String,
            #[serde(default)]
            prediction_id: Option<String>,
        }
        let body: Body = serde_json::from_value(envelope.json()?.clone())?;
        Ok(Self {
            status: body.status.unwrap_or(envelope.status),
            event_type: EventType::from_tag(&body.event_type),
            prediction_id: body.prediction_id,
        })
    }
}

/// OpenAPI description of the current project's prediction interface.
#[derive(Debug, Clone)]
pub struct OpenAPISchemaResponse {
    pub exc_history: Vec<ApiError>,
    pub openapi_schema: Value,
    pub status: u16,
}

impl OpenAPISchemaResponse {
    pub(crate) fn from_envelope(envelope: &Envelope, history: RetryHistory) -> Result<Self> {
        Ok(Self {
            exc_history: history.into_errors(),
            openapi_schema: envelope.json()?.clone(),
            status: envelope.status,
        })
    }
}

/// One inference outcome of a deferred prediction.
#[derive(Debug, Clone, Deserialize)]
pub struct AsyncPredictionResponse {
    #[serde(default)]
    pub infer_details: Value,
    #[serde(default)]
    pub output_data: Option<Value>,
}

/// Collected outcomes of a deferred prediction, in submission order.
#[derive(Debug, Clone)]
pub struct AsyncPredictionResponseList {
    pub exc_history: Vec<ApiError>,
    pub inference_responses: Vec<AsyncPredictionResponse>,
}

impl AsyncPredictionResponseList {
    pub(crate) fn from_envelope(envelope: &Envelope, history: RetryHistory) -> Result<Self> {
        #[derive(Deserialize)]
        struct Body {
            #[serde(default)]
            inference_responses: Vec<AsyncPredictionResponse>,
        }
        let body: Body = serde_json::from_value(envelope.json()?.clone())?;
        Ok(Self {
            exc_history: history.into_errors(),
            inference_responses: body.inference_responses,
        })
    }
}
