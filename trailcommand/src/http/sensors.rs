//! Sensor API client

use trail_api::models::LatestSensorsResponse;

use crate::errors::TrailError;
use crate::http::client::{resource_path, HttpClient};

impl HttpClient {
    /// Latest reading per sensor of a device
    pub async fn latest_sensor_values(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<LatestSensorsResponse, TrailError> {
        let path = resource_path(&["sensors", device_id])?;
        self.get(&path, Some(token)).await
    }
}
