//! Device enrollment and auth-code acquisition

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use trail_api::models::{
    AuthCodeResponse, CreateDeviceRequest, LoginRequest, LoginResponse,
};

use crate::authn::auth_code::AuthCode;
use crate::authn::fsm::{AuthEvent, AuthFsm, AuthState};
use crate::errors::TrailError;
use crate::http::client::HttpClient;
use crate::http::devices::DeviceCreation;
use crate::storage::config::{AuthConfig, DeviceConfig, LoginIdentity};

/// Server calls needed to enroll a device
#[async_trait]
pub trait DeviceAuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, TrailError>;

    async fn create_device(
        &self,
        token: &str,
        request: &CreateDeviceRequest,
    ) -> Result<DeviceCreation, TrailError>;

    async fn request_auth_code(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<AuthCodeResponse, TrailError>;
}

#[async_trait]
impl DeviceAuthApi for HttpClient {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, TrailError> {
        HttpClient::login(self, request).await
    }

    async fn create_device(
        &self,
        token: &str,
        request: &CreateDeviceRequest,
    ) -> Result<DeviceCreation, TrailError> {
        HttpClient::create_device(self, token, request).await
    }

    async fn request_auth_code(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<AuthCodeResponse, TrailError> {
        HttpClient::request_auth_code(self, token, device_id).await
    }
}

struct AuthSession {
    fsm: AuthFsm,
    user_token: Option<SecretString>,
    code: Option<AuthCode>,
}

/// Drives the device through login, registration and auth-code issuance
pub struct DeviceAuthenticator {
    api: Arc<dyn DeviceAuthApi>,
    credentials: AuthConfig,
    device: DeviceConfig,
    session: RwLock<AuthSession>,
}

impl DeviceAuthenticator {
    pub fn new(api: Arc<dyn DeviceAuthApi>, credentials: AuthConfig, device: DeviceConfig) -> Self {
        Self {
            api,
            credentials,
            device,
            session: RwLock::new(AuthSession {
                fsm: AuthFsm::new(),
                user_token: None,
                code: None,
            }),
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> AuthState {
        self.session.read().await.fsm.state()
    }

    /// Currently held auth code, if any
    pub async fn current_code(&self) -> Option<AuthCode> {
        self.session.read().await.code.clone()
    }

    /// Log in, ensure the device record exists and obtain an auth code.
    /// Any failure leaves the authenticator in the degraded no-code state.
    pub async fn setup(&self) -> Result<AuthCode, TrailError> {
        info!(device_id = %self.device.id, "Starting device authentication setup...");
        self.transition(AuthEvent::Login).await?;

        match self.setup_steps().await {
            Ok(code) => Ok(code),
            Err(e) => {
                error!(device_id = %self.device.id, error = %e, "Device authentication setup failed");
                self.transition(AuthEvent::Failed(e.to_string())).await?;
                Err(e)
            }
        }
    }

    async fn setup_steps(&self) -> Result<AuthCode, TrailError> {
        let user_token = self.login().await?;
        self.session.write().await.user_token = Some(user_token.clone());
        self.transition(AuthEvent::LoggedIn).await?;

        self.ensure_device(user_token.expose_secret()).await?;
        self.transition(AuthEvent::DeviceEnsured).await?;

        let code = self.issue_code(user_token.expose_secret()).await?;
        self.store_code(code.clone()).await?;
        Ok(code)
    }

    /// Replace the current code with a fresh one. On failure the previous
    /// code is kept.
    pub async fn renew(&self) -> Result<AuthCode, TrailError> {
        info!(device_id = %self.device.id, "Renewing auth code...");
        self.transition(AuthEvent::RenewalDue).await?;

        let user_token = self.session.read().await.user_token.clone();
        let result = match user_token {
            Some(token) => self.issue_code(token.expose_secret()).await,
            None => Err(TrailError::AuthError("no user session to renew with".to_string())),
        };

        match result {
            Ok(code) => {
                self.store_code(code.clone()).await?;
                Ok(code)
            }
            Err(e) => {
                error!(device_id = %self.device.id, error = %e, "Auth code renewal failed");
                self.transition(AuthEvent::Failed(e.to_string())).await?;
                Err(e)
            }
        }
    }

    async fn login(&self) -> Result<SecretString, TrailError> {
        let password = self.credentials.password.expose_secret().to_string();

        for identity in self.credentials.identities() {
            info!("Attempting authentication with {}", identity);
            let request = match &identity {
                LoginIdentity::Email(email) => LoginRequest {
                    email: Some(email.clone()),
                    username: None,
                    password: password.clone(),
                },
                LoginIdentity::Username(username) => LoginRequest {
                    email: None,
                    username: Some(username.clone()),
                    password: password.clone(),
                },
            };

            match self.api.login(&request).await {
                Ok(response) => {
                    info!("User authentication successful with {}", identity);
                    return Ok(SecretString::from(response.token));
                }
                Err(e) => warn!(error = %e, "Authentication failed with {}", identity),
            }
        }

        Err(TrailError::AuthError("all authentication methods failed".to_string()))
    }

    async fn ensure_device(&self, user_token: &str) -> Result<(), TrailError> {
        let request = CreateDeviceRequest {
            device_id: self.device.id.clone(),
            name: self.device.name.clone(),
            device_type: self.device.device_type.clone(),
            description: self.device.description.clone(),
            uuid: self.device.uuid.clone(),
        };

        match self.api.create_device(user_token, &request).await? {
            DeviceCreation::Created => info!(device_id = %self.device.id, "Device created successfully"),
            DeviceCreation::AlreadyExists => info!(device_id = %self.device.id, "Device already exists"),
        }
        Ok(())
    }

    async fn issue_code(&self, user_token: &str) -> Result<AuthCode, TrailError> {
        debug!(device_id = %self.device.id, "Requesting auth code from API");
        let response = self.api.request_auth_code(user_token, &self.device.id).await?;
        let code = AuthCode::from_response(&response)?;

        info!(
            device_id = %self.device.id,
            auth_code = %code.redacted(),
            expires = %code.expires_at().to_rfc3339(),
            "Device auth code generated"
        );
        Ok(code)
    }

    async fn store_code(&self, code: AuthCode) -> Result<(), TrailError> {
        let mut session = self.session.write().await;
        session
            .fsm
            .process(AuthEvent::CodeIssued)
            .map_err(TrailError::AuthError)?;
        session.code = Some(code);
        Ok(())
    }

    async fn transition(&self, event: AuthEvent) -> Result<(), TrailError> {
        self.session
            .write()
            .await
            .fsm
            .process(event)
            .map_err(TrailError::AuthError)
    }
}

/// Something that can replace the current auth code
#[async_trait]
pub trait CodeRenewer: Send + Sync {
    async fn renew(&self) -> Result<AuthCode, TrailError>;
}

#[async_trait]
impl CodeRenewer for DeviceAuthenticator {
    async fn renew(&self) -> Result<AuthCode, TrailError> {
        DeviceAuthenticator::renew(self).await
    }
}
