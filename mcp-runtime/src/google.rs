//! Search Console backend over the Google REST API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use gsc_core::GscError;
use gsc_core::analytics::{SearchAnalyticsQueryBody, SearchAnalyticsQueryResponse};
use gsc_core::credentials::{JWT_BEARER_GRANT_TYPE, ServiceAccountKey, WEBMASTERS_READONLY_SCOPE};
use gsc_core::sites::SitesListResponse;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use crate::analytics::SearchConsoleBackend;

pub const DEFAULT_API_URL: &str = "https://searchconsole.googleapis.com";

const LISTING_SITES: &str = "listing sites";
const QUERYING_SEARCH_ANALYTICS: &str = "querying search analytics";
const ERROR_BODY_PREVIEW_CHARS: usize = 300;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Clone)]
pub struct GoogleSearchConsole {
    http: reqwest::Client,
    api_url: String,
    credentials: Arc<ServiceAccountKey>,
}

impl GoogleSearchConsole {
    pub fn new(
        http: reqwest::Client,
        api_url: impl Into<String>,
        credentials: ServiceAccountKey,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            credentials: Arc::new(credentials),
        }
    }

    pub fn client_email(&self) -> &str {
        self.credentials.client_email()
    }

    /// Exchange a freshly signed assertion for a bearer token. Tokens are not
    /// cached; each backend call performs its own exchange.
    async fn access_token(&self, operation: &'static str) -> Result<String, GscError> {
        let assertion = self
            .credentials
            .assertion(WEBMASTERS_READONLY_SCOPE, Utc::now())
            .map_err(|err| GscError::backend(operation, err))?;

        let resp = self
            .http
            .post(self.credentials.token_uri())
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|err| GscError::backend(operation, err))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GscError::backend(
                operation,
                format!("token exchange failed ({status}): {}", describe_error_body(&body)),
            ));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|err| GscError::backend(operation, err))?;
        Ok(token.access_token)
    }

    async fn send<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GscError> {
        let token = self.access_token(operation).await?;
        let resp = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| GscError::backend(operation, err))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, operation, "search console request failed");
            return Err(GscError::backend(
                operation,
                format!("{status}: {}", describe_error_body(&body)),
            ));
        }

        resp.json()
            .await
            .map_err(|err| GscError::backend(operation, err))
    }
}

#[async_trait]
impl SearchConsoleBackend for GoogleSearchConsole {
    async fn list_sites(&self) -> Result<SitesListResponse, GscError> {
        let url = endpoint_url(&self.api_url, &["webmasters", "v3", "sites"])
            .map_err(|err| GscError::backend(LISTING_SITES, err))?;
        self.send(LISTING_SITES, self.http.get(url)).await
    }

    async fn query_search_analytics(
        &self,
        site_url: &str,
        body: &SearchAnalyticsQueryBody,
    ) -> Result<SearchAnalyticsQueryResponse, GscError> {
        let url = endpoint_url(
            &self.api_url,
            &["webmasters", "v3", "sites", site_url, "searchAnalytics", "query"],
        )
        .map_err(|err| GscError::backend(QUERYING_SEARCH_ANALYTICS, err))?;
        self.send(QUERYING_SEARCH_ANALYTICS, self.http.post(url).json(body)).await
    }
}

/// Append path segments to `base`, percent-encoding each one. A site URL such
/// as `https://example.com/` becomes a single segment.
fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, String> {
    let mut url = Url::parse(base).map_err(|err| format!("invalid API url '{base}': {err}"))?;
    url.path_segments_mut()
        .map_err(|_| format!("API url '{base}' cannot carry a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Pull the human-readable part out of a Google or OAuth error body.
fn describe_error_body(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return match value.get("error_description").and_then(Value::as_str) {
                Some(description) => format!("{error}: {description}"),
                None => error.to_string(),
            };
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    let mut preview: String = trimmed.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
    if trimmed.chars().count() > ERROR_BODY_PREVIEW_CHARS {
        preview.push_str("...");
    }
    preview
}
