//! Pull-based iterator over an in-flight streaming prediction.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::debug;

use crate::client::core::cancel_prediction_via;
use crate::response::Envelope;
use crate::route::ApiKeyRoute;
use crate::transport::HttpTransport;
use crate::types::{EventType, PredictionEvent, PredictionPartial, StreamDetails};
use crate::{BoxStream, Error, Result};

enum EventCallback {
    Immediate(Box<dyn FnMut(PredictionEvent) + Send>),
    Deferred(Box<dyn Fn(PredictionEvent) -> BoxFuture<'static, ()> + Send>),
}

/// Iterator state machine over one open streaming connection.
///
/// Data frames are yielded as [`PredictionPartial`]s; control events update
/// session state (`prediction_id`, cancellation) without stopping iteration
/// unless a cancelling event arrives while `follow_cancelling` is set.
/// Frames are delivered in arrival order, one at a time.
pub struct PredictionStream {
    envelopes: BoxStream<'static, Envelope>,
    transport: Arc<HttpTransport>,
    route: ApiKeyRoute,
    request_timeout: Option<Duration>,
    prediction_id: Option<String>,
    stream_details: Option<StreamDetails>,
    follow_cancelling: bool,
    callback: Option<EventCallback>,
    finished: bool,
}

impl std::fmt::Debug for PredictionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionStream")
            .field("request_timeout", &self.request_timeout)
            .field("prediction_id", &self.prediction_id)
            .field("follow_cancelling", &self.follow_cancelling)
            .field("has_callback", &self.callback.is_some())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl PredictionStream {
    pub(crate) fn new(
        envelopes: BoxStream<'static, Envelope>,
        transport: Arc<HttpTransport>,
        route: ApiKeyRoute,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            envelopes,
            transport,
            route,
            request_timeout,
            prediction_id: None,
            stream_details: None,
            follow_cancelling: true,
            callback: None,
            finished: false,
        }
    }

    /// The stream id announced by the server, once observed.
    pub fn prediction_id(&self) -> Option<&str> {
        self.prediction_id.as_deref()
    }

    /// Usage summary from the terminal frame, once observed.
    pub fn stream_details(&self) -> Option<&StreamDetails> {
        self.stream_details.as_ref()
    }

    /// Whether a cancelling control event terminates iteration (default
    /// true).
    pub fn follow_cancelling(&mut self, follow: bool) {
        self.follow_cancelling = follow;
    }

    /// Register a callback invoked inline for every control event.
    pub fn on_event(&mut self, callback: impl FnMut(PredictionEvent) + Send + 'static) {
        self.callback = Some(EventCallback::Immediate(Box::new(callback)));
    }

    /// Register a suspend-capable callback, scheduled fire-and-forget so a
    /// slow callback never stalls the iterator's own advance.
    pub fn on_event_async(
        &mut self,
        callback: impl Fn(PredictionEvent) -> BoxFuture<'static, ()> + Send + 'static,
    ) {
        self.callback = Some(EventCallback::Deferred(Box::new(callback)));
    }

    /// Advance to the next partial result.
    ///
    /// Returns `None` on clean exhaustion (including a followed cancelling
    /// event); a classified failure ends the stream with its error after
    /// mining the error envelope for `stream_details`.
    pub async fn next(&mut self) -> Option<Result<PredictionPartial>> {
        if self.finished {
            return None;
        }
        loop {
            match self.envelopes.next().await {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(error)) => {
                    self.finished = true;
                    if let Error::Api(failure) = &error {
                        if let Some(envelope) = &failure.envelope {
                            self.capture_stream_details(envelope);
                        }
                    }
                    return Some(Err(error));
                }
                Some(Ok(envelope)) if !envelope.is_event => {
                    self.capture_stream_details(&envelope);
                    match PredictionPartial::from_envelope(&envelope) {
                        Ok(partial) => return Some(Ok(partial)),
                        Err(error) => {
                            self.finished = true;
                            return Some(Err(error));
                        }
                    }
                }
                Some(Ok(envelope)) => {
                    let event = match PredictionEvent::from_envelope(&envelope) {
                        Ok(event) => event,
                        Err(error) => {
                            self.finished = true;
                            return Some(Err(error));
                        }
                    };
                    debug!(event_type = ?event.event_type, "control event received");
                    if event.event_type == EventType::StreamId {
                        if let Some(id) = &event.prediction_id {
                            self.prediction_id = Some(id.clone());
                        }
                    }
                    let stop = self.follow_cancelling && event.event_type == EventType::Cancelling;
                    self.dispatch(event);
                    if stop {
                        self.finished = true;
                        return None;
                    }
                }
            }
        }
    }

    /// Ask the server to stop producing for this stream.
    ///
    /// Requires the stream id to have been announced already; the iterator
    /// itself keeps running until the corresponding cancelling event
    /// arrives (or immediately stops on it when `follow_cancelling`).
    pub async fn cancel(&self) -> Result<Envelope> {
        let prediction_id = self.prediction_id.as_deref().ok_or_else(|| {
            Error::Cancellation("no prediction id has been announced on this stream yet".to_owned())
        })?;
        cancel_prediction_via(&self.transport, &self.route, prediction_id, self.request_timeout)
            .await
    }

    fn capture_stream_details(&mut self, envelope: &Envelope) {
        // Populated exactly once, from the frame that reports it.
        if self.stream_details.is_some() {
            return;
        }
        if let Ok(body) = envelope.json() {
            if let Some(raw) = body.get("stream_details") {
                if let Ok(details) = serde_json::from_value::<StreamDetails>(raw.clone()) {
                    self.stream_details = Some(details);
                }
            }
        }
    }

    fn dispatch(&mut self, event: PredictionEvent) {
        match self.callback.as_mut() {
            Some(EventCallback::Immediate(callback)) => callback(event),
            Some(EventCallback::Deferred(callback)) => {
                tokio::spawn(callback(event));
            }
            None => {}
        }
    }
}
