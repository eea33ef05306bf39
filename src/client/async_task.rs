//! Handle for predictions submitted for deferred completion.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;

use crate::response::{Envelope, RawResponse, ResponseFactory};
use crate::retry::{self, RetryPolicy};
use crate::route::ApiKeyRoute;
use crate::transport::HttpTransport;
use crate::types::AsyncPredictionResponseList;
use crate::Result;

pub(crate) const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A prediction accepted for deferred completion, polled via the result
/// endpoint rather than streamed synchronously.
pub struct AsyncPredictionTask {
    prediction_id: String,
    transport: Arc<HttpTransport>,
    route: ApiKeyRoute,
    request_timeout: Option<Duration>,
}

impl AsyncPredictionTask {
    pub(crate) fn new(
        prediction_id: String,
        transport: Arc<HttpTransport>,
        route: ApiKeyRoute,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            prediction_id,
            transport,
            route,
            request_timeout,
        }
    }

    pub fn prediction_id(&self) -> &str {
        &self.prediction_id
    }

    /// Poll the result endpoint until the task resolves.
    ///
    /// A still-pending task is reported with status 425, which the taxonomy
    /// marks retryable, so this is a plain unbounded retry run with a poll
    /// interval; `deadline` bounds the total wait and its expiry surfaces
    /// as [`crate::Error::RetryTimeout`], distinct from attempt exhaustion.
    pub async fn result(&self, deadline: Option<Duration>) -> Result<AsyncPredictionResponseList> {
        let policy = RetryPolicy::polling(RESULT_POLL_INTERVAL);
        let (history, envelope) = match deadline {
            Some(deadline) => {
                retry::run_async_with_deadline(&policy, deadline, || self.result_once()).await?
            }
            None => retry::run_async(&policy, || self.result_once()).await?,
        };
        AsyncPredictionResponseList::from_envelope(&envelope, history)
    }

    async fn result_once(&self) -> Result<Envelope> {
        let response = self
            .transport
            .get_with_query(
                &self.route.prediction_result_path(),
                &self.route,
                &[("request_id", self.prediction_id.as_str())],
                self.request_timeout,
            )
            .await?;
        ResponseFactory::from_http(RawResponse::from_async(Method::GET, response).await?).construct()
    }
}
