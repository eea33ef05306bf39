//! Blocking client facade with the same observable semantics as the
//! asynchronous one: one call, one thread of control; suspension blocks.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::json;
use tracing::info;

use crate::client::async_task::RESULT_POLL_INTERVAL;
use crate::client::builder::ClientBuilder;
use crate::client::core::SubmittedTask;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::payload::Payload;
use crate::response::{Envelope, RawResponse, ResponseContext, ResponseFactory};
use crate::retry::{self, RetryPolicy};
use crate::route::ApiKeyRoute;
use crate::sse::SseDecoder;
use crate::transport::BlockingTransport;
use crate::types::{
    AsyncPredictionResponseList, EventType, OpenAPISchemaResponse, PredictionEvent,
    PredictionPartial, PredictionResponse, StreamDetails,
};
use crate::{Error, Result};

/// Blocking client for the prediction service.
pub struct Client {
    transport: Arc<BlockingTransport>,
    route: ApiKeyRoute,
    max_retries: u32,
    request_timeout: Option<Duration>,
}

impl Client {
    pub fn new(api_key: &str, model: Option<&str>, config: ClientConfig) -> Result<Self> {
        let mut route = ApiKeyRoute::new(api_key);
        if let Some(model) = model {
            route = route.for_model(model)?;
        }
        Ok(Self {
            transport: Arc::new(BlockingTransport::new(&config)?),
            route,
            max_retries: config.max_retries,
            request_timeout: config.request_timeout,
        })
    }

    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// Run one buffered prediction, retrying per policy.
    pub fn predict(
        &self,
        payload: &Payload,
        model: Option<&str>,
        max_retries: Option<u32>,
    ) -> Result<PredictionResponse> {
        let route = self.route.resolved(model)?;
        let policy = RetryPolicy::attempts(max_retries.unwrap_or(self.max_retries));
        let (history, envelope) = retry::run(&policy, || self.predict_once(&route, payload))?;
        PredictionResponse::from_envelope(&envelope, history)
    }

    fn predict_once(&self, route: &ApiKeyRoute, payload: &Payload) -> Result<Envelope> {
        let response = self
            .transport
            .send_prediction(&route.prediction_path(), route, payload)?;
        if response.status().as_u16() >= 400 {
            return ResponseFactory::from_http(RawResponse::from_blocking(Method::POST, response)?)
                .construct();
        }
        let context = ResponseContext::of_blocking(Method::POST, &response);
        let mut records = SseDecoder::new().iter(BlockingTransport::lines(response));
        match records.next() {
            Some(Ok(record)) => ResponseFactory::from_sse(record, Some(context)).construct(),
            Some(Err(err)) => Err(err),
            None => Err(Error::Api(ApiError {
                message: format!(
                    "prediction stream at {} closed before any frame arrived",
                    context.url
                ),
                requires_retry: true,
                envelope: None,
            })),
        }
    }

    /// Open a streaming prediction and return an iterator over its partial
    /// results.
    pub fn stream(&self, payload: &Payload, model: Option<&str>) -> Result<PredictionStream> {
        let route = self.route.resolved(model)?;
        let response = self
            .transport
            .send_prediction(&route.prediction_stream_path(), &route, payload)?;
        if response.status().as_u16() >= 400 {
            return Err(open_failure(Method::POST, response));
        }
        let context = ResponseContext::of_blocking(Method::POST, &response);
        info!(url = %context.url, "prediction stream opened");
        let envelopes = SseDecoder::new()
            .iter(BlockingTransport::lines(response))
            .map(move |record| {
                record.and_then(|record| {
                    ResponseFactory::from_sse(record, Some(context.clone())).construct()
                })
            });
        Ok(PredictionStream::new(
            Box::new(envelopes),
            self.transport.clone(),
            route,
            self.request_timeout,
        ))
    }

    /// Fetch the project's OpenAPI schema, retried per policy.
    pub fn openapi_schema(
        &self,
        model: Option<&str>,
        max_retries: Option<u32>,
    ) -> Result<OpenAPISchemaResponse> {
        let route = self.route.resolved(model)?;
        let policy = RetryPolicy::attempts(max_retries.unwrap_or(self.max_retries));
        let (history, envelope) = retry::run(&policy, || self.openapi_once(&route))?;
        OpenAPISchemaResponse::from_envelope(&envelope, history)
    }

    fn openapi_once(&self, route: &ApiKeyRoute) -> Result<Envelope> {
        let response = self
            .transport
            .get(&route.openapi_schema_path(), route, self.request_timeout)?;
        ResponseFactory::from_http(RawResponse::from_blocking(Method::GET, response)?).construct()
    }

    /// Submit a prediction for deferred completion.
    pub fn predict_async_task(
        &self,
        payload: &Payload,
        model: Option<&str>,
    ) -> Result<AsyncPredictionTask> {
        let route = self.route.resolved(model)?;
        let response = self.transport.post_payload(
            &route.prediction_async_path(),
            &route,
            payload,
            self.request_timeout,
        )?;
        let envelope =
            ResponseFactory::from_http(RawResponse::from_blocking(Method::POST, response)?)
                .construct()?;
        let submitted: SubmittedTask = serde_json::from_value(envelope.json()?.clone())?;
        info!(prediction_id = %submitted.request_id, "prediction task submitted");
        Ok(AsyncPredictionTask {
            prediction_id: submitted.request_id,
            transport: self.transport.clone(),
            route,
            request_timeout: self.request_timeout,
        })
    }

    /// Poll a previously submitted task until it resolves. Equivalent to
    /// [`AsyncPredictionTask::result`].
    pub fn prediction_task_result(
        &self,
        task: &AsyncPredictionTask,
        deadline: Option<Duration>,
    ) -> Result<AsyncPredictionResponseList> {
        task.result(deadline)
    }

    /// Ask the server to stop producing for a streaming prediction.
    pub fn cancel_prediction(&self, prediction_id: &str, model: Option<&str>) -> Result<Envelope> {
        let route = self.route.resolved(model)?;
        cancel_prediction_via(&self.transport, &route, prediction_id, self.request_timeout)
    }

    /// One-shot convenience: build a scoped client and run a single
    /// buffered prediction.
    pub fn run_predict(api_key: &str, model: &str, payload: &Payload) -> Result<PredictionResponse> {
        let client = Client::builder(api_key).model(model).build_blocking()?;
        client.predict(payload, None, None)
    }
}

/// Blocking counterpart of the streaming iterator; same state machine,
/// driven through [`Iterator`].
pub struct PredictionStream {
    envelopes: Box<dyn Iterator<Item = Result<Envelope>> + Send>,
    transport: Arc<BlockingTransport>,
    route: ApiKeyRoute,
    request_timeout: Option<Duration>,
    prediction_id: Option<String>,
    stream_details: Option<StreamDetails>,
    follow_cancelling: bool,
    callback: Option<Box<dyn FnMut(PredictionEvent) + Send>>,
    finished: bool,
}

impl PredictionStream {
    pub(crate) fn new(
        envelopes: Box<dyn Iterator<Item = Result<Envelope>> + Send>,
        transport: Arc<BlockingTransport>,
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

    pub fn prediction_id(&self) -> Option<&str> {
        self.prediction_id.as_deref()
    }

    pub fn stream_details(&self) -> Option<&StreamDetails> {
        self.stream_details.as_ref()
    }

    pub fn follow_cancelling(&mut self, follow: bool) {
        self.follow_cancelling = follow;
    }

    /// Register a callback invoked inline for every control event.
    pub fn on_event(&mut self, callback: impl FnMut(PredictionEvent) + Send + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Ask the server to stop producing for this stream. Requires the
    /// stream id to have been announced already.
    pub fn cancel(&self) -> Result<Envelope> {
        let prediction_id = self.prediction_id.as_deref().ok_or_else(|| {
            Error::Cancellation("no prediction id has been announced on this stream yet".to_owned())
        })?;
        cancel_prediction_via(&self.transport, &self.route, prediction_id, self.request_timeout)
    }

    fn capture_stream_details(&mut self, envelope: &Envelope) {
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
}

impl Iterator for PredictionStream {
    type Item = Result<PredictionPartial>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.envelopes.next() {
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
                    if event.event_type == EventType::StreamId {
                        if let Some(id) = &event.prediction_id {
                            self.prediction_id = Some(id.clone());
                        }
                    }
                    let stop = self.follow_cancelling && event.event_type == EventType::Cancelling;
                    if let Some(callback) = self.callback.as_mut() {
                        callback(event);
                    }
                    if stop {
                        self.finished = true;
                        return None;
                    }
                }
            }
        }
    }
}

/// Blocking handle for a prediction submitted for deferred completion.
pub struct AsyncPredictionTask {
    prediction_id: String,
    transport: Arc<BlockingTransport>,
    route: ApiKeyRoute,
    request_timeout: Option<Duration>,
}

impl AsyncPredictionTask {
    pub fn prediction_id(&self) -> &str {
        &self.prediction_id
    }

    /// Poll the result endpoint until the task resolves.
    ///
    /// With a `deadline`, the poll loop runs on a background worker joined
    /// against the deadline; expiry surfaces as
    /// [`crate::Error::RetryTimeout`] while the in-flight attempt finishes
    /// on its own and is discarded.
    pub fn result(&self, deadline: Option<Duration>) -> Result<AsyncPredictionResponseList> {
        let policy = RetryPolicy::polling(RESULT_POLL_INTERVAL);
        let (history, envelope) = match deadline {
            Some(deadline) => {
                let transport = self.transport.clone();
                let route = self.route.clone();
                let prediction_id = self.prediction_id.clone();
                let request_timeout = self.request_timeout;
                retry::run_with_deadline(&policy, deadline, move || {
                    result_once(&transport, &route, &prediction_id, request_timeout)
                })?
            }
            None => retry::run(&policy, || {
                result_once(
                    &self.transport,
                    &self.route,
                    &self.prediction_id,
                    self.request_timeout,
                )
            })?,
        };
        AsyncPredictionResponseList::from_envelope(&envelope, history)
    }
}

/// Classify an error-status response when there is no envelope to return.
fn open_failure(method: Method, response: reqwest::blocking::Response) -> Error {
    match RawResponse::from_blocking(method, response) {
        Ok(raw) => ResponseFactory::from_http(raw)
            .construct()
            .map(|envelope| Error::Api(ApiError::from_envelope(envelope)))
            .unwrap_or_else(|err| err),
        Err(err) => err,
    }
}

fn result_once(
    transport: &BlockingTransport,
    route: &ApiKeyRoute,
    prediction_id: &str,
    timeout: Option<Duration>,
) -> Result<Envelope> {
    let response = transport.get_with_query(
        &route.prediction_result_path(),
        route,
        &[("request_id", prediction_id)],
        timeout,
    )?;
    ResponseFactory::from_http(RawResponse::from_blocking(Method::GET, response)?).construct()
}

fn cancel_prediction_via(
    transport: &BlockingTransport,
    route: &ApiKeyRoute,
    prediction_id: &str,
    timeout: Option<Duration>,
) -> Result<Envelope> {
    info!(prediction_id, "cancelling prediction");
    let response = transport.patch_json(
        &route.prediction_cancel_path(),
        route,
        &json!({ "infer_id": prediction_id }),
        timeout,
    )?;
    ResponseFactory::from_http(RawResponse::from_blocking(Method::PATCH, response)?).construct()
}
