//! Auth API client

use trail_api::models::{LoginRequest, LoginResponse};

use crate::errors::TrailError;
use crate::http::client::HttpClient;

impl HttpClient {
    /// Log in as a human principal
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, TrailError> {
        self.post("/auth/login", None, request).await
    }
}
