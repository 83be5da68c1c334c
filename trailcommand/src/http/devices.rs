//! Device API client

use trail_api::models::{
    AuthCodeResponse, ControlCommandRequest, CreateDeviceRequest, DeviceDetailsResponse,
};

use crate::errors::TrailError;
use crate::http::client::{resource_path, HttpClient};

/// Outcome of a device creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCreation {
    Created,
    AlreadyExists,
}

impl HttpClient {
    /// Create the device record. A 409 means it already exists.
    pub async fn create_device(
        &self,
        token: &str,
        request: &CreateDeviceRequest,
    ) -> Result<DeviceCreation, TrailError> {
        match self.post_empty("/devices", Some(token), request).await {
            Ok(()) => Ok(DeviceCreation::Created),
            Err(TrailError::StatusError { status: 409, .. }) => Ok(DeviceCreation::AlreadyExists),
            Err(e) => Err(e),
        }
    }

    /// Request a fresh auth code for a device
    pub async fn request_auth_code(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<AuthCodeResponse, TrailError> {
        let path = resource_path(&["devices", device_id, "auth-code"])?;
        self.post(&path, Some(token), &serde_json::json!({})).await
    }

    /// Enable auth for a device and issue a code
    pub async fn generate_auth(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<AuthCodeResponse, TrailError> {
        let path = resource_path(&["devices", device_id, "generate-auth"])?;
        self.post(&path, Some(token), &serde_json::json!({})).await
    }

    /// Revoke a device's auth code
    pub async fn revoke_auth(&self, token: &str, device_id: &str) -> Result<(), TrailError> {
        let path = resource_path(&["devices", device_id, "revoke-auth"])?;
        self.delete(&path, Some(token)).await
    }

    /// Get a device with its control states
    pub async fn get_device(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<DeviceDetailsResponse, TrailError> {
        let path = resource_path(&["devices", device_id])?;
        self.get(&path, Some(token)).await
    }

    /// Delete a device
    pub async fn delete_device(&self, token: &str, device_id: &str) -> Result<(), TrailError> {
        let path = resource_path(&["devices", device_id])?;
        self.delete(&path, Some(token)).await
    }

    /// Send a control command through the server
    pub async fn send_control_command(
        &self,
        token: &str,
        device_id: &str,
        command: &ControlCommandRequest,
    ) -> Result<(), TrailError> {
        let path = resource_path(&["devices", device_id, "control"])?;
        self.post_empty(&path, Some(token), command).await
    }
}
