//! Dashboard session: user token, device selection and widget sync
//!
//! Widget values converge from three sources: the periodic poll, pushed
//! control state updates and the user's own optimistic commands. A poll
//! result is applied only if the selection it was started for is still
//! current.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use trail_api::models::{
    AuthCodeResponse, ControlCommandRequest, DeviceDetailsResponse, DeviceRecord,
    LatestSensorsResponse,
};

use crate::dashboard::devices::{
    confirmation_matches, ControlOption, DeviceDirectory, DeviceEntry, SensorOption,
};
use crate::dashboard::widgets::{default_widgets, Widget, WidgetChange, WidgetStore};
use crate::errors::TrailError;
use crate::http::client::HttpClient;
use crate::realtime::events::PushEvent;
use crate::workers::poller::{PollOutcome, PollTarget};

/// Server calls made on behalf of a dashboard user
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn latest_sensor_values(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<LatestSensorsResponse, TrailError>;

    async fn get_device(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<DeviceDetailsResponse, TrailError>;

    async fn send_control_command(
        &self,
        token: &str,
        device_id: &str,
        command: &ControlCommandRequest,
    ) -> Result<(), TrailError>;

    async fn delete_device(&self, token: &str, device_id: &str) -> Result<(), TrailError>;

    async fn generate_auth(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<AuthCodeResponse, TrailError>;

    async fn revoke_auth(&self, token: &str, device_id: &str) -> Result<(), TrailError>;

    async fn health(&self, timeout: Duration) -> Result<(), TrailError>;
}

#[async_trait]
impl DashboardApi for HttpClient {
    async fn latest_sensor_values(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<LatestSensorsResponse, TrailError> {
        HttpClient::latest_sensor_values(self, token, device_id).await
    }

    async fn get_device(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<DeviceDetailsResponse, TrailError> {
        HttpClient::get_device(self, token, device_id).await
    }

    async fn send_control_command(
        &self,
        token: &str,
        device_id: &str,
        command: &ControlCommandRequest,
    ) -> Result<(), TrailError> {
        HttpClient::send_control_command(self, token, device_id, command).await
    }

    async fn delete_device(&self, token: &str, device_id: &str) -> Result<(), TrailError> {
        HttpClient::delete_device(self, token, device_id).await
    }

    async fn generate_auth(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<AuthCodeResponse, TrailError> {
        HttpClient::generate_auth(self, token, device_id).await
    }

    async fn revoke_auth(&self, token: &str, device_id: &str) -> Result<(), TrailError> {
        HttpClient::revoke_auth(self, token, device_id).await
    }

    async fn health(&self, timeout: Duration) -> Result<(), TrailError> {
        HttpClient::health(self, timeout).await
    }
}

#[derive(Debug, Default)]
struct Selection {
    device_id: Option<String>,
    generation: u64,
}

/// One signed-in dashboard user
pub struct DashboardSession {
    api: Arc<dyn DashboardApi>,
    token: watch::Sender<Option<SecretString>>,
    server: watch::Sender<Option<String>>,
    // bumped whenever the poll target (token or selection) changes
    changes: watch::Sender<u64>,
    // lock order: selection, widgets, devices
    selection: RwLock<Selection>,
    widgets: RwLock<WidgetStore>,
    devices: RwLock<DeviceDirectory>,
}

impl DashboardSession {
    pub fn new(api: Arc<dyn DashboardApi>) -> Self {
        let (token, _) = watch::channel(None);
        let (server, _) = watch::channel(None);
        let (changes, _) = watch::channel(0);
        Self {
            api,
            token,
            server,
            changes,
            selection: RwLock::new(Selection::default()),
            widgets: RwLock::new(WidgetStore::default()),
            devices: RwLock::new(DeviceDirectory::default()),
        }
    }

    pub fn api(&self) -> Arc<dyn DashboardApi> {
        self.api.clone()
    }

    // ================================ TOKEN ================================= //

    pub fn set_token(&self, token: SecretString) {
        self.token.send_replace(Some(token));
        self.notify_change();
    }

    pub fn token(&self) -> Option<SecretString> {
        self.token.borrow().clone()
    }

    /// Watch token changes, for the push listener
    pub fn subscribe_token(&self) -> watch::Receiver<Option<SecretString>> {
        self.token.subscribe()
    }

    /// Realtime server origin (`scheme://host:port`)
    pub fn set_server(&self, origin: impl Into<String>) {
        let origin = origin.into();
        self.server.send_if_modified(|current| {
            if current.as_deref() == Some(origin.as_str()) {
                return false;
            }
            *current = Some(origin);
            true
        });
    }

    pub fn server(&self) -> Option<String> {
        self.server.borrow().clone()
    }

    /// Watch server origin changes, for the push listener
    pub fn subscribe_server(&self) -> watch::Receiver<Option<String>> {
        self.server.subscribe()
    }

    /// Watch changes of what the poller should fetch
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify_change(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }

    fn require_token(&self) -> Result<SecretString, TrailError> {
        self.token()
            .ok_or_else(|| TrailError::AuthError("not signed in".to_string()))
    }

    /// Drop the token and the selection. The poller goes idle.
    pub async fn logout(&self) {
        info!("Signing out of dashboard session");
        self.token.send_replace(None);
        self.deselect().await;
    }

    // ============================== SELECTION =============================== //

    pub async fn selected_device(&self) -> Option<String> {
        self.selection.read().await.device_id.clone()
    }

    /// Add devices to the directory
    pub async fn add_devices(&self, records: Vec<DeviceRecord>) {
        let mut devices = self.devices.write().await;
        for record in records {
            devices.upsert(DeviceEntry::from(record));
        }
    }

    /// Select a device. Without explicit widgets, the device is fetched and
    /// a default layout is built from its sensors and controls.
    pub async fn select_device(
        &self,
        device_id: &str,
        widgets: Option<Vec<Widget>>,
    ) -> Result<(), TrailError> {
        let generation = {
            let mut selection = self.selection.write().await;
            selection.generation += 1;
            selection.device_id = Some(device_id.to_string());
            self.widgets.write().await.clear();
            self.devices
                .write()
                .await
                .set_selected(Some(device_id.to_string()));
            selection.generation
        };
        info!(device_id, "Selected device");

        let widgets = match widgets {
            Some(widgets) => widgets,
            None => {
                let token = self.require_token()?;
                let details = self.api.get_device(token.expose_secret(), device_id).await?;
                let (sensors, controls) = match &details.device {
                    Some(record) => {
                        self.devices
                            .write()
                            .await
                            .upsert(DeviceEntry::from(record.clone()));
                        (record.sensors.clone(), details.control_states().to_vec())
                    }
                    None => (Vec::new(), details.control_states().to_vec()),
                };
                default_widgets(device_id, &sensors, &controls)
            }
        };

        let selection = self.selection.read().await;
        if selection.generation != generation {
            debug!(device_id, "Selection changed while loading widgets, discarding");
            return Ok(());
        }
        self.widgets.write().await.replace_all(widgets);
        drop(selection);
        self.notify_change();
        Ok(())
    }

    pub async fn deselect(&self) {
        {
            let mut selection = self.selection.write().await;
            selection.generation += 1;
            selection.device_id = None;
            self.widgets.write().await.clear();
            self.devices.write().await.set_selected(None);
        }
        self.notify_change();
    }

    // =============================== SNAPSHOTS ============================== //

    pub async fn widgets(&self) -> Vec<Widget> {
        self.widgets.read().await.widgets().to_vec()
    }

    pub async fn devices(&self) -> Vec<DeviceEntry> {
        self.devices.read().await.devices().to_vec()
    }

    pub async fn sensor_options(&self) -> Vec<SensorOption> {
        self.devices.read().await.sensor_options().to_vec()
    }

    pub async fn control_options(&self) -> Vec<ControlOption> {
        self.devices.read().await.control_options().to_vec()
    }

    // ================================= SYNC ================================= //

    /// Fetch latest sensor values and control states for the selected
    /// device. The two fetches fail independently.
    pub async fn refresh(&self) -> PollOutcome {
        let Some(token) = self.token() else {
            debug!("No token, stopping poll");
            return PollOutcome::Stop;
        };
        let (device_id, generation) = {
            let selection = self.selection.read().await;
            match &selection.device_id {
                Some(device_id) => (device_id.clone(), selection.generation),
                None => {
                    debug!("No device selected, stopping poll");
                    return PollOutcome::Stop;
                }
            }
        };

        let (sensors, details) = tokio::join!(
            self.api.latest_sensor_values(token.expose_secret(), &device_id),
            self.api.get_device(token.expose_secret(), &device_id),
        );

        let selection = self.selection.read().await;
        if selection.generation != generation {
            debug!(device_id, "Selection changed during poll, discarding results");
            return match selection.device_id {
                Some(_) => PollOutcome::Continue,
                None => PollOutcome::Stop,
            };
        }

        let mut widgets = self.widgets.write().await;
        match sensors {
            Ok(response) => {
                for change in widgets.apply_sensor_readings(&response.sensors) {
                    info!(widget_id = %change.widget_id, old = %change.old, new = %change.new, "Widget updated from poll");
                }
            }
            Err(e) => warn!(device_id, error = %e, "Failed to fetch sensor values"),
        }
        match details {
            Ok(response) => {
                for change in widgets.apply_control_states(response.control_states()) {
                    info!(widget_id = %change.widget_id, old = %change.old, new = %change.new, "Widget updated from poll");
                }
            }
            Err(e) => warn!(device_id, error = %e, "Failed to fetch control states"),
        }
        PollOutcome::Continue
    }

    /// Send a control value from a widget. Bound widgets commit only after
    /// the server accepts the command; unbound widgets update locally.
    pub async fn send_control_command(
        &self,
        widget_id: &str,
        value: Value,
    ) -> Result<Option<WidgetChange>, TrailError> {
        let widget = self
            .widgets
            .read()
            .await
            .get(widget_id)
            .cloned()
            .ok_or_else(|| TrailError::NotFound(format!("widget {}", widget_id)))?;

        let Some(control_id) = widget.control_id() else {
            return Ok(self.widgets.write().await.set_value(widget_id, value));
        };

        let token = self.require_token()?;
        let command = ControlCommandRequest {
            control_id: control_id.to_string(),
            value: value.clone(),
        };
        if let Err(e) = self
            .api
            .send_control_command(token.expose_secret(), &widget.device_id, &command)
            .await
        {
            warn!(widget_id, control_id, error = %e, "Control command rejected, widget unchanged");
            return Err(e);
        }

        info!(widget_id, control_id, value = %value, "Control command accepted");
        Ok(self.widgets.write().await.set_value(widget_id, value))
    }

    /// Apply a push notification
    pub async fn handle_push(&self, event: PushEvent) -> Vec<WidgetChange> {
        let changes = match &event {
            PushEvent::ControlStateUpdate(update) => {
                self.widgets.write().await.apply_control_update(update)
            }
            _ => Vec::new(),
        };
        if self.devices.write().await.apply_push(&event) {
            debug!("Refreshed widget pickers for the selected device");
        }
        changes
    }

    // ============================== MANAGEMENT ============================== //

    /// Delete a device once `confirmation` matches its uuid (or its name
    /// when it has none). A mismatch never reaches the server.
    pub async fn delete_device(&self, device_id: &str, confirmation: &str) -> Result<(), TrailError> {
        let entry = self
            .devices
            .read()
            .await
            .get(device_id)
            .cloned()
            .ok_or_else(|| TrailError::NotFound(format!("device {}", device_id)))?;
        if !confirmation_matches(&entry, confirmation) {
            return Err(TrailError::ValidationError(
                "deletion confirmation does not match".to_string(),
            ));
        }

        let token = self.require_token()?;
        self.api.delete_device(token.expose_secret(), device_id).await?;
        info!(device_id, "Deleted device");

        if self.selected_device().await.as_deref() == Some(device_id) {
            self.deselect().await;
        }
        self.devices.write().await.remove(device_id);
        Ok(())
    }

    pub async fn generate_auth(&self, device_id: &str) -> Result<AuthCodeResponse, TrailError> {
        let token = self.require_token()?;
        self.api.generate_auth(token.expose_secret(), device_id).await
    }

    pub async fn revoke_auth(&self, device_id: &str) -> Result<(), TrailError> {
        let token = self.require_token()?;
        self.api.revoke_auth(token.expose_secret(), device_id).await
    }

    pub async fn check_health(&self, timeout: Duration) -> Result<(), TrailError> {
        self.api.health(timeout).await
    }
}

#[async_trait]
impl PollTarget for DashboardSession {
    async fn poll_once(&self) -> PollOutcome {
        self.refresh().await
    }
}
