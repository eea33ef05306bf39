//! Blocking transport over `reqwest::blocking`, mirroring the async one.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::payload::Payload;
use crate::route::{ApiKeyRoute, API_KEY_HEADER};
use crate::transport::REQUEST_ID_HEADER;
use crate::{Error, Result};

pub struct BlockingTransport {
    client: reqwest::blocking::Client,
    base_url: Url,
}

impl BlockingTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(connect) = config.connect_timeout {
            builder = builder.connect_timeout(connect);
        }
        if let Some(idle) = config.pool_idle_timeout {
            builder = builder.pool_idle_timeout(idle);
        }
        // The client-level default would cap streaming reads; timeouts are
        // applied per buffered request instead.
        builder = builder.timeout(None);
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.clone(),
        })
    }

    fn prepare(
        &self,
        method: Method,
        path: &str,
        route: &ApiKeyRoute,
    ) -> Result<reqwest::blocking::RequestBuilder> {
        let url = self.base_url.join(path)?;
        let request_id = Uuid::new_v4().to_string();
        debug!(method = %method, url = %url, request_id = %request_id, "dispatching request");
        Ok(self
            .client
            .request(method, url)
            .header(API_KEY_HEADER, route.api_key())
            .header(REQUEST_ID_HEADER, request_id))
    }

    pub fn send_prediction(
        &self,
        path: &str,
        route: &ApiKeyRoute,
        payload: &Payload,
    ) -> Result<reqwest::blocking::Response> {
        let mut request = self
            .prepare(Method::POST, path, route)?
            .header(reqwest::header::ACCEPT, "text/event-stream");
        request = if payload.is_multipart() {
            request.multipart(payload.to_blocking_form())
        } else {
            request.json(&payload.json_value())
        };
        Ok(request.send()?)
    }

    pub fn post_payload(
        &self,
        path: &str,
        route: &ApiKeyRoute,
        payload: &Payload,
        timeout: Option<Duration>,
    ) -> Result<reqwest::blocking::Response> {
        let mut request = self.prepare(Method::POST, path, route)?;
        request = if payload.is_multipart() {
            request.multipart(payload.to_blocking_form())
        } else {
            request.json(&payload.json_value())
        };
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send()?)
    }

    pub fn get(
        &self,
        path: &str,
        route: &ApiKeyRoute,
        timeout: Option<Duration>,
    ) -> Result<reqwest::blocking::Response> {
        let mut request = self.prepare(Method::GET, path, route)?;
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send()?)
    }

    pub fn get_with_query(
        &self,
        path: &str,
        route: &ApiKeyRoute,
        query: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<reqwest::blocking::Response> {
        let mut request = self.prepare(Method::GET, path, route)?.query(query);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send()?)
    }

    pub fn patch_json(
        &self,
        path: &str,
        route: &ApiKeyRoute,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<reqwest::blocking::Response> {
        let mut request = self.prepare(Method::PATCH, path, route)?.json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        Ok(request.send()?)
    }

    /// Frame a streaming response body into lines for the SSE decoder.
    pub fn lines(response: reqwest::blocking::Response) -> impl Iterator<Item = Result<String>> + Send {
        BufReader::new(response)
            .lines()
            .map(|line| line.map_err(Error::Io))
    }
}
