//! Async transport over a shared `reqwest::Client`.
//!
//! The transport owns the connection pool for one client facade; it builds
//! requests (route, auth header, correlation id, body) and hands back raw
//! responses. Classification happens upstream.

use std::io;
use std::time::Duration;

use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::Method;
use serde_json::Value;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::payload::Payload;
use crate::route::{ApiKeyRoute, API_KEY_HEADER};
use crate::transport::REQUEST_ID_HEADER;
use crate::{Error, Result};

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(connect) = config.connect_timeout {
            builder = builder.connect_timeout(connect);
        }
        if let Some(idle) = config.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.clone(),
        })
    }

    fn prepare(&self, method: Method, path: &str, route: &ApiKeyRoute) -> Result<reqwest::RequestBuilder> {
        let url = self.base_url.join(path)?;
        let request_id = Uuid::new_v4().to_string();
        debug!(method = %method, url = %url, request_id = %request_id, "dispatching request");
        Ok(self
            .client
            .request(method, url)
            .header(API_KEY_HEADER, route.api_key())
            .header(REQUEST_ID_HEADER, request_id))
    }

    /// POST a prediction payload and leave the body open for SSE reads. No
    /// total timeout: inference may stream for as long as it needs.
    pub async fn send_prediction(
        &self,
        path: &str,
        route: &ApiKeyRoute,
        payload: &Payload,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .prepare(Method::POST, path, route)?
            .header(reqwest::header::ACCEPT, "text/event-stream");
        request = if payload.is_multipart() {
            request.multipart(payload.to_form())
        } else {
            request.json(&payload.json_value())
        };
        Ok(request.send().await?)
    }

    /// POST a payload as a buffered request (async-task submission).
    pub async fn post_payload(
        &self,
        path: &str,
        route: &ApiKeyRoute,
        payload: &Payload,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let mut request = self.prepare(Method::POST, path, route)?;
        request = if payload.is_multipart() {
            request.multipart(payload.to_form())
        } else {
            request.json(&payload.json_value())
        };
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send().await?)
    }

    pub async fn get(
        &self,
        path: &str,
        route: &ApiKeyRoute,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let mut request = self.prepare(Method::GET, path, route)?;
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send().await?)
    }

    pub async fn get_with_query(
        &self,
        path: &str,
        route: &ApiKeyRoute,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let mut request = self.prepare(Method::GET, path, route)?.query(query);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send().await?)
    }

    pub async fn patch_json(
        &self,
        path: &str,
        route: &ApiKeyRoute,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let mut request = self.prepare(Method::PATCH, path, route)?.json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send().await?)
    }

    /// Frame a streaming response body into lines for the SSE decoder.
    pub fn line_stream(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send + Unpin {
        let bytes = response
            .bytes_stream()
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err));
        FramedRead::new(StreamReader::new(Box::pin(bytes)), LinesCodec::new()).map(|line| {
            line.map_err(|err| match err {
                LinesCodecError::Io(err) => Error::Io(err),
                LinesCodecError::MaxLineLengthExceeded => Error::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "sse line exceeded the configured limit",
                )),
            })
        })
    }
}
