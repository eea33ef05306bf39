//! Asynchronous client facade.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::client::async_task::AsyncPredictionTask;
use crate::client::builder::ClientBuilder;
use crate::client::stream::PredictionStream;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::payload::Payload;
use crate::response::{Envelope, RawResponse, ResponseContext, ResponseFactory};
use crate::retry::{self, RetryPolicy};
use crate::route::ApiKeyRoute;
use crate::sse::SseDecoder;
use crate::transport::HttpTransport;
use crate::types::{AsyncPredictionResponseList, OpenAPISchemaResponse, PredictionResponse};
use crate::{Error, Result};

#[derive(Deserialize)]
pub(crate) struct SubmittedTask {
    pub request_id: String,
}

/// Asynchronous client for the prediction service.
///
/// Owns one transport connection pool shared by every call issued through
/// it; streams borrow it for their cancel operation but never close it.
pub struct Client {
    transport: Arc<HttpTransport>,
    route: ApiKeyRoute,
    max_retries: u32,
    request_timeout: Option<Duration>,
}

impl Client {
    /// Build a client from an already-resolved configuration record.
    pub fn new(api_key: &str, model: Option<&str>, config: ClientConfig) -> Result<Self> {
        let mut route = ApiKeyRoute::new(api_key);
        if let Some(model) = model {
            route = route.for_model(model)?;
        }
        Ok(Self {
            transport: Arc::new(HttpTransport::new(&config)?),
            route,
            max_retries: config.max_retries,
            request_timeout: config.request_timeout,
        })
    }

    pub fn builder(api_key: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// Run one buffered prediction, retrying per policy.
    ///
    /// Returns the typed result together with the history of classified
    /// failures of any preceding attempts.
    pub async fn predict(
        &self,
        payload: &Payload,
        model: Option<&str>,
        max_retries: Option<u32>,
    ) -> Result<PredictionResponse> {
        let route = self.route.resolved(model)?;
        let policy = RetryPolicy::attempts(max_retries.unwrap_or(self.max_retries));
        let (history, envelope) =
            retry::run_async(&policy, || self.predict_once(&route, payload)).await?;
        PredictionResponse::from_envelope(&envelope, history)
    }

    async fn predict_once(&self, route: &ApiKeyRoute, payload: &Payload) -> Result<Envelope> {
        let response = self
            .transport
            .send_prediction(&route.prediction_path(), route, payload)
            .await?;
        if response.status().as_u16() >= 400 {
            let raw = RawResponse::from_async(Method::POST, response).await?;
            return ResponseFactory::from_http(raw).construct();
        }
        let context = ResponseContext::of_async(Method::POST, &response);
        let mut records = Box::pin(SseDecoder::new().into_stream(HttpTransport::line_stream(response)));
        match records.next().await {
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

    /// Open a streaming prediction and return the pull-based iterator over
    /// its partial results.
    pub async fn stream(&self, payload: &Payload, model: Option<&str>) -> Result<PredictionStream> {
        let route = self.route.resolved(model)?;
        let response = self
            .transport
            .send_prediction(&route.prediction_stream_path(), &route, payload)
            .await?;
        if response.status().as_u16() >= 400 {
            return Err(open_failure(Method::POST, response).await);
        }
        let context = ResponseContext::of_async(Method::POST, &response);
        info!(url = %context.url, "prediction stream opened");
        let envelopes = SseDecoder::new()
            .into_stream(HttpTransport::line_stream(response))
            .map(move |record| {
                record.and_then(|record| {
                    ResponseFactory::from_sse(record, Some(context.clone())).construct()
                })
            });
        Ok(PredictionStream::new(
            Box::pin(envelopes),
            self.transport.clone(),
            route,
            self.request_timeout,
        ))
    }

    /// Fetch the project's OpenAPI schema, retried per policy.
    pub async fn openapi_schema(
        &self,
        model: Option<&str>,
        max_retries: Option<u32>,
    ) -> Result<OpenAPISchemaResponse> {
        let route = self.route.resolved(model)?;
        let policy = RetryPolicy::attempts(max_retries.unwrap_or(self.max_retries));
        let (history, envelope) = retry::run_async(&policy, || self.openapi_once(&route)).await?;
        OpenAPISchemaResponse::from_envelope(&envelope, history)
    }

    async fn openapi_once(&self, route: &ApiKeyRoute) -> Result<Envelope> {
        let response = self
            .transport
            .get(&route.openapi_schema_path(), route, self.request_timeout)
            .await?;
        ResponseFactory::from_http(RawResponse::from_async(Method::GET, response).await?).construct()
    }

    /// Submit a prediction for deferred completion and return the handle
    /// used to poll its result.
    pub async fn predict_async_task(
        &self,
        payload: &Payload,
        model: Option<&str>,
    ) -> Result<AsyncPredictionTask> {
        let route = self.route.resolved(model)?;
        let response = self
            .transport
            .post_payload(&route.prediction_async_path(), &route, payload, self.request_timeout)
            .await?;
        let envelope =
            ResponseFactory::from_http(RawResponse::from_async(Method::POST, response).await?)
                .construct()?;
        let submitted: SubmittedTask = serde_json::from_value(envelope.json()?.clone())?;
        info!(prediction_id = %submitted.request_id, "prediction task submitted");
        Ok(AsyncPredictionTask::new(
            submitted.request_id,
            self.transport.clone(),
            route,
            self.request_timeout,
        ))
    }

    /// Poll a previously submitted task until it resolves. Equivalent to
    /// [`AsyncPredictionTask::result`].
    pub async fn prediction_task_result(
        &self,
        task: &AsyncPredictionTask,
        deadline: Option<Duration>,
    ) -> Result<AsyncPredictionResponseList> {
        task.result(deadline).await
    }

    /// Ask the server to stop producing for a streaming prediction.
    pub async fn cancel_prediction(
        &self,
        prediction_id: &str,
        model: Option<&str>,
    ) -> Result<Envelope> {
        let route = self.route.resolved(model)?;
        cancel_prediction_via(&self.transport, &route, prediction_id, self.request_timeout).await
    }

    /// One-shot convenience: build a scoped client and run a single
    /// buffered prediction.
    pub async fn run_predict(api_key: &str, model: &str, payload: &Payload) -> Result<PredictionResponse> {
        let client = Client::builder(api_key).model(model).build()?;
        client.predict(payload, None, None).await
    }
}

/// Classify an error-status response when there is no envelope to return.
async fn open_failure(method: Method, response: reqwest::Response) -> Error {
    match RawResponse::from_async(method, response).await {
        Ok(raw) => ResponseFactory::from_http(raw)
            .construct()
            .map(|envelope| Error::Api(ApiError::from_envelope(envelope)))
            .unwrap_or_else(|err| err),
        Err(err) => err,
    }
}

pub(crate) async fn cancel_prediction_via(
    transport: &HttpTransport,
    route: &ApiKeyRoute,
    prediction_id: &str,
    timeout: Option<Duration>,
) -> Result<Envelope> {
    info!(prediction_id, "cancelling prediction");
    let response = transport
        .patch_json(
            &route.prediction_cancel_path(),
            route,
            &json!({ "infer_id": prediction_id }),
            timeout,
        )
        .await?;
    ResponseFactory::from_http(RawResponse::from_async(Method::PATCH, response).await?).construct()
}
