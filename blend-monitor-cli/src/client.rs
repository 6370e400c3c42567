use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};

use blend_monitor::api::types::{ErrorResponse, DATA_SOURCE_HEADER};

use crate::config::Config;
use crate::types::Result;

/// Thin HTTP client for the blend-monitor API.
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("blendctl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.api_url, config.token.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins `segments` onto the base URL, percent-encoding each one so ids
    /// containing `/`, `?` or `#` stay a single path segment.
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| format!("{} cannot be used as an API base URL", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, path: &[&str]) -> Result<RequestBuilder> {
        let builder = self.http.request(method, self.url(path)?);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    fn require_token(&self) -> Result<()> {
        if self.token.is_none() {
            return Err("No API token configured. Run 'blendctl setup' to add one.".into());
        }
        Ok(())
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(describe_error(status, &body).into())
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &[&str], query: &[(&str, String)]) -> Result<T> {
        let response = self.request(Method::GET, path)?.query(query).send().await?;
        Self::decode(response).await
    }

    pub async fn get_authed<T: DeserializeOwned>(&self, path: &[&str], query: &[(&str, String)]) -> Result<T> {
        self.require_token()?;
        self.get(path, query).await
    }

    /// GET returning the body together with the `x-data-source` header.
    pub async fn get_with_source<T: DeserializeOwned>(
        &self,
        path: &[&str],
        query: &[(&str, String)],
    ) -> Result<(T, Option<String>)> {
        let response = self.request(Method::GET, path)?.query(query).send().await?;
        let source = response
            .headers()
            .get(DATA_SOURCE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok((Self::decode(response).await?, source))
    }

    pub async fn send_authed<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &[&str],
        body: &B,
    ) -> Result<T> {
        self.require_token()?;
        let response = self.request(method, path)?.json(body).send().await?;
        Self::decode(response).await
    }

    /// POST whose body is meaningful on failure statuses too.
    pub async fn post_raw(&self, path: &[&str]) -> Result<(StatusCode, String)> {
        let response = self.request(Method::POST, path)?.send().await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }
}

/// Turns an error response into a readable message, including the
/// per-source reasons when the server reports them.
pub fn describe_error(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => match err.details {
            Some(details) => format!(
                "{} (HTTP {})\n  database: {}\n  npm: {}\n  hint: {}",
                err.error,
                status.as_u16(),
                details.database,
                details.npm,
                details.suggestion
            ),
            None => format!("{} (HTTP {})", err.error, status.as_u16()),
        },
        Err(_) if body.trim().is_empty() => format!("Request failed with HTTP {}", status.as_u16()),
        Err(_) => format!("Request failed with HTTP {}: {}", status.as_u16(), body.trim()),
    }
}
