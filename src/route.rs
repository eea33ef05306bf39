//! API-key credentials and per-project route descriptors.

use crate::{Error, Result};

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "X-API-KEY";

const MODEL_FORMAT_HINT: &str = "model should be provided as <owner username>/<project>";

/// Immutable view of one project's routes plus the credentials used to
/// reach them. A client keeps one of these and derives per-call copies via
/// [`ApiKeyRoute::resolved`] when an operation overrides the model.
#[derive(Debug, Clone)]
pub struct ApiKeyRoute {
    api_key: String,
    username: Option<String>,
    project: Option<String>,
}

impl ApiKeyRoute {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            username: None,
            project: None,
        }
    }

    /// Derive a route for `<owner>/<project>`; malformed identifiers are a
    /// configuration error, raised before any request is sent.
    pub fn for_model(&self, model: &str) -> Result<Self> {
        let (username, project) = model
            .split_once('/')
            .ok_or_else(|| Error::Config(MODEL_FORMAT_HINT.to_owned()))?;
        if username.is_empty() || project.is_empty() || project.contains('/') {
            return Err(Error::Config(MODEL_FORMAT_HINT.to_owned()));
        }
        Ok(Self {
            api_key: self.api_key.clone(),
            username: Some(username.to_owned()),
            project: Some(project.to_owned()),
        })
    }

    /// Apply an optional per-call model override, verifying that a target
    /// project is known either way.
    pub fn resolved(&self, model: Option<&str>) -> Result<Self> {
        match model {
            Some(model) => self.for_model(model),
            None => {
                if self.username.is_none() || self.project.is_none() {
                    return Err(Error::Config(MODEL_FORMAT_HINT.to_owned()));
                }
                Ok(self.clone())
            }
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    fn project_path(&self) -> String {
        format!(
            "/api/v1/{}/{}/",
            self.username.as_deref().unwrap_or_default(),
            self.project.as_deref().unwrap_or_default()
        )
    }

    pub fn prediction_path(&self) -> String {
        format!("{}predict", self.project_path())
    }

    pub fn prediction_stream_path(&self) -> String {
        format!("{}predict/stream/", self.project_path())
    }

    pub fn prediction_async_path(&self) -> String {
        format!("{}predict/async/", self.project_path())
    }

    pub fn prediction_result_path(&self) -> String {
        format!("{}predict/async/result/", self.project_path())
    }

    pub fn prediction_cancel_path(&self) -> String {
        format!("{}predict/cancel/", self.project_path())
    }

    pub fn openapi_schema_path(&self) -> String {
        format!("{}openapi.json", self.project_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_owner_and_project() {
        let route = ApiKeyRoute::new("key").for_model("acme/echo").unwrap();
        assert_eq!(route.prediction_path(), "/api/v1/acme/echo/predict");
        assert_eq!(
            route.prediction_stream_path(),
            "/api/v1/acme/echo/predict/stream/"
        );
        assert_eq!(route.openapi_schema_path(), "/api/v1/acme/echo/openapi.json");
    }

    #[test]
    fn rejects_malformed_models() {
        let route = ApiKeyRoute::new("key");
        for bad in ["echo", "/echo", "acme/", "a/b/c", ""] {
            assert!(matches!(route.for_model(bad), Err(Error::Config(_))), "{bad}");
        }
    }

    #[test]
    fn resolved_requires_a_target() {
        let bare = ApiKeyRoute::new("key");
        assert!(matches!(bare.resolved(None), Err(Error::Config(_))));
        assert!(bare.resolved(Some("acme/echo")).is_ok());

        let bound = ApiKeyRoute::new("key").for_model("acme/echo").unwrap();
        assert!(bound.resolved(None).is_ok());
    }
}
