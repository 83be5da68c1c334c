//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::errors::TrailError;

/// Build an API path from raw segments, percent-encoding each one so ids
/// cannot add segments or a query.
pub fn resource_path(segments: &[&str]) -> Result<String, TrailError> {
    let mut url = Url::parse("http://localhost/").map_err(|e| TrailError::Internal(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| TrailError::Internal("base URL cannot carry a path".to_string()))?
        .clear()
        .extend(segments);
    Ok(url.path().to_string())
}

/// HTTP client for the TrailCommand REST API
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    origin: String,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client for a server origin (`scheme://host:port`).
    /// API calls go to `<origin>/api`.
    pub fn new(origin: &str) -> Result<Self, TrailError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let origin = origin.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url: format!("{}/api", origin),
            origin,
        })
    }

    /// Get the server origin
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Get the API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        match token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn check(method: &str, url: &str, response: Response) -> Result<Response, TrailError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        error!("HTTP {} {} failed: {} - {}", method, url, status, body);
        Err(TrailError::StatusError { status, body })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, TrailError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let request = Self::authorize(self.client.get(&url), token);
        let response = Self::check("GET", &url, request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T, TrailError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let request = Self::authorize(self.client.post(&url).json(body), token);
        let response = Self::check("POST", &url, request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Make a POST request and ignore the response body
    pub async fn post_empty<B: Serialize>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<(), TrailError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let request = Self::authorize(self.client.post(&url).json(body), token);
        Self::check("POST", &url, request.send().await?).await?;
        Ok(())
    }

    /// Make a DELETE request and ignore the response body
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<(), TrailError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("DELETE {}", url);

        let request = Self::authorize(self.client.delete(&url), token);
        Self::check("DELETE", &url, request.send().await?).await?;
        Ok(())
    }

    /// `GET <origin>/health` bounded by `timeout`
    pub async fn health(&self, timeout: Duration) -> Result<(), TrailError> {
        let url = format!("{}/health", self.origin);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await?;
        Self::check("GET", &url, response).await?;
        Ok(())
    }
}
