pub mod auth;
pub mod drive;
pub mod sheets;

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Url};

use crate::error::IntegrationError;
use auth::GoogleAuth;

/// Bearer-authenticated request factory shared by the Sheets and Drive clients.
#[derive(Clone, Debug)]
pub(crate) struct GoogleApi {
    http: reqwest::Client,
    auth: Arc<GoogleAuth>,
}

impl GoogleApi {
    pub(crate) fn new(http: reqwest::Client, auth: Arc<GoogleAuth>) -> Self {
        Self { http, auth }
    }

    pub(crate) async fn request(
        &self,
        method: Method,
        url: Url,
    ) -> Result<RequestBuilder, IntegrationError> {
        let token = self.auth.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }
}

/// Parses one of the fixed API base URLs and appends path segments, percent-encoding each.
pub(crate) fn api_url(base: &str, segments: &[&str]) -> Result<Url, IntegrationError> {
    let mut url = Url::parse(base)
        .map_err(|error| IntegrationError::InvalidRequest(format!("bad url `{base}`: {error}")))?;
    {
        let mut path = url.path_segments_mut().map_err(|()| {
            IntegrationError::InvalidRequest(format!("`{base}` cannot carry a path"))
        })?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}
