use std::time::Duration;

use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

use crate::error::{DeployerError, Result};
use crate::model::Auth;
use crate::retry::{
    self, MAX_TRANSIENT_ATTEMPTS, RetrySetting, backoff_delay, is_transient_status,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Response surfaced to the client layer after retries were applied. Request
/// methods return `Ok` only for 2xx responses; everything else arrives as
/// `DeployerError::Api` once the applicable retry budgets are exhausted.
#[derive(Debug, Clone)]
pub struct RestResponse {
    pub status: u16,
    pub body: String,
}

impl RestResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn into_api_error(self) -> DeployerError {
        DeployerError::Api {
            status: self.status,
            body: self.body,
        }
    }
}

/// Per-environment pause gate. 429 responses move the gate forward; every
/// request waits for it before going out, so one throttled task slows the
/// whole environment instead of hammering it.
#[derive(Debug, Default)]
struct RateLimiter {
    not_before: Mutex<Option<Instant>>,
}

impl RateLimiter {
    async fn pause(&self) {
        let deadline = { *self.not_before.lock().await };
        if let Some(deadline) = deadline
            && deadline > Instant::now()
        {
            sleep_until(deadline).await;
        }
    }

    async fn throttle_for(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut guard = self.not_before.lock().await;
        if guard.map(|current| current < deadline).unwrap_or(true) {
            *guard = Some(deadline);
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Thin reqwest wrapper owning auth, rate limiting, retry, and pagination for
/// one remote base URL. One instance per environment and API surface; shared
/// by every task of a run.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Auth,
    token_cache: Mutex<Option<CachedToken>>,
    limiter: RateLimiter,
}

impl RestClient {
    pub fn new(base_url: &str, auth: Auth, insecure: bool) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| DeployerError::Config(format!("invalid URL '{base_url}': {err}")))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(insecure)
            .build()?;
        Ok(Self {
            http,
            base_url,
            auth,
            token_cache: Mutex::new(None),
            limiter: RateLimiter::default(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<RestResponse> {
        self.request(Method::GET, path, query, None, None).await
    }

    pub async fn delete(&self, path: &str) -> Result<RestResponse> {
        self.request(Method::DELETE, path, &[], None, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &Value,
    ) -> Result<RestResponse> {
        self.request(Method::POST, path, query, Some(body.clone()), None)
            .await
    }

    pub async fn put(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &Value,
    ) -> Result<RestResponse> {
        self.request(Method::PUT, path, query, Some(body.clone()), None)
            .await
    }

    /// POST with a caller-supplied retry budget that also covers 4xx
    /// responses. Used for upserts against eventually-consistent scopes.
    pub async fn post_with_retry(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &Value,
        setting: RetrySetting,
    ) -> Result<RestResponse> {
        self.request(Method::POST, path, query, Some(body.clone()), Some(setting))
            .await
    }

    /// PUT with a caller-supplied retry budget, see [`Self::post_with_retry`].
    pub async fn put_with_retry(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &Value,
        setting: RetrySetting,
    ) -> Result<RestResponse> {
        self.request(Method::PUT, path, query, Some(body.clone()), Some(setting))
            .await
    }

    /// Multipart upload with a single file part. Multipart bodies cannot be
    /// replayed through the generic retry loop, so this issues one attempt.
    pub async fn post_multipart(
        &self,
        path: &str,
        field: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<RestResponse> {
        self.limiter.pause().await;
        let url = self.join(path)?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part(field.to_string(), part);
        let bearer = self.bearer().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(bearer)
            .multipart(form)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let result = RestResponse { status, body };
        if !result.is_success() {
            return Err(result.into_api_error());
        }
        Ok(result)
    }

    /// GET a paginated collection, following `nextPageKey` until exhausted.
    pub async fn get_paginated(
        &self,
        path: &str,
        query: &[(&str, String)],
        items_key: &str,
    ) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next_page_key: Option<String> = None;
        loop {
            let page_query: Vec<(&str, String)> = match &next_page_key {
                // Follow-up pages only take the continuation key.
                Some(key) => vec![("nextPageKey", key.clone())],
                None => query.to_vec(),
            };
            let response = self.get(path, &page_query).await?;
            let page: Value = response.json()?;
            if let Some(page_items) = page.get(items_key).and_then(Value::as_array) {
                items.extend(page_items.iter().cloned());
            }
            next_page_key = page
                .get("nextPageKey")
                .and_then(Value::as_str)
                .map(str::to_string);
            if next_page_key.is_none() {
                return Ok(items);
            }
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
        override_setting: Option<RetrySetting>,
    ) -> Result<RestResponse> {
        let url = self.join(path)?;
        let mut transient_attempts = 0u32;
        let mut timing_attempts = 0u32;
        let mut override_attempts = 0u32;

        loop {
            self.limiter.pause().await;
            let bearer = self.bearer().await?;
            let mut builder = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(bearer)
                .query(query);
            if let Some(body) = &body {
                builder = builder.json(body);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(err) if transient_attempts + 1 < MAX_TRANSIENT_ATTEMPTS => {
                    transient_attempts += 1;
                    warn!(
                        url = %url,
                        attempt = transient_attempts,
                        "transport error, retrying: {err}"
                    );
                    sleep(backoff_delay(transient_attempts)).await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(&response).unwrap_or_else(|| backoff_delay(transient_attempts));
                let body = response.text().await.unwrap_or_default();
                if transient_attempts + 1 >= MAX_TRANSIENT_ATTEMPTS {
                    return Err(DeployerError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }
                transient_attempts += 1;
                debug!(url = %url, wait = ?wait, "rate limited, backing off");
                self.limiter.throttle_for(wait).await;
                continue;
            }

            let status = status.as_u16();
            let body = response.text().await?;
            let result = RestResponse { status, body };

            if result.is_success() {
                return Ok(result);
            }

            if let Some(setting) = override_setting
                && override_attempts + 1 < setting.max_attempts
            {
                override_attempts += 1;
                debug!(
                    url = %url,
                    status,
                    attempt = override_attempts,
                    "retrying with caller-supplied budget"
                );
                sleep(setting.delay).await;
                continue;
            }

            if is_transient_status(status) {
                if transient_attempts + 1 >= MAX_TRANSIENT_ATTEMPTS {
                    return Err(result.into_api_error());
                }
                transient_attempts += 1;
                warn!(url = %url, status, attempt = transient_attempts, "server error, retrying");
                sleep(backoff_delay(transient_attempts)).await;
                continue;
            }

            // Known eventual-consistency rejections get their typed budget.
            if let Some(setting) = retry::setting_for_body(&result.body)
                && timing_attempts + 1 < setting.max_attempts
            {
                timing_attempts += 1;
                debug!(
                    url = %url,
                    status,
                    attempt = timing_attempts,
                    "eventual-consistency rejection, retrying"
                );
                sleep(setting.delay).await;
                continue;
            }

            return Err(result.into_api_error());
        }
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|err| DeployerError::Config(format!("invalid request path '{path}': {err}")))
    }

    async fn bearer(&self) -> Result<String> {
        match &self.auth {
            Auth::Token { token } => Ok(token.clone()),
            Auth::OAuth {
                client_id,
                client_secret,
                token_url,
            } => {
                let mut cache = self.token_cache.lock().await;
                if let Some(cached) = cache.as_ref()
                    && cached.expires_at > Instant::now()
                {
                    return Ok(cached.access_token.clone());
                }
                let response = self
                    .http
                    .post(token_url)
                    .form(&[
                        ("grant_type", "client_credentials"),
                        ("client_id", client_id.as_str()),
                        ("client_secret", client_secret.as_str()),
                    ])
                    .send()
                    .await?;
                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(DeployerError::Auth(format!(
                        "token request failed (HTTP {status}): {body}"
                    )));
                }
                let token: TokenResponse = response
                    .json()
                    .await
                    .map_err(|err| DeployerError::Auth(format!("invalid token response: {err}")))?;
                let lifetime = Duration::from_secs(token.expires_in.unwrap_or(300));
                let expires_at =
                    Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN);
                *cache = Some(CachedToken {
                    access_token: token.access_token.clone(),
                    expires_at,
                });
                Ok(token.access_token)
            }
        }
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_response_success_range() {
        let ok = RestResponse {
            status: 201,
            body: String::new(),
        };
        assert!(ok.is_success());
        let nope = RestResponse {
            status: 404,
            body: String::new(),
        };
        assert!(!nope.is_success());
    }

    #[test]
    fn api_error_carries_status_and_body() {
        let err = RestResponse {
            status: 400,
            body: "bad scope".to_string(),
        }
        .into_api_error();
        assert_eq!(err.status(), Some(400));
        assert!(format!("{err}").contains("bad scope"));
    }
}
