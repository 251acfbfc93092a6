//! Camera session: the state consumers drive and observe.
//!
//! A session owns the device list, the selected device, the persisted last
//! selection and the activation/visibility flags, and turns changes to them
//! into start/stop requests on its [`StreamController`].

use crate::config::SessionConfig;
use crate::devices::DeviceAccess;
use crate::errors::CameraError;
use crate::events::{SessionEvent, EVENT_CHANNEL_CAPACITY};
use crate::lock;
use crate::platform::{DeviceEvent, DeviceMonitor, MediaDevices, MediaStream, VideoSink};
use crate::store::{DeviceIdStore, FileStore, MemoryStore, LAST_DEVICE_ID_KEY};
use crate::stream::{log_error_callback, ErrorCallback, StreamController, StreamTiming};
use crate::types::{Capabilities, Device, SessionState, Visibility};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// Pick the device to auto-select from a fresh enumeration.
///
/// The persisted id wins when enabled and still present; otherwise the first
/// device does.
pub fn choose_initial_device<'a>(
    devices: &'a [Device],
    last_selected: Option<&str>,
    use_last_device_id: bool,
) -> Option<&'a Device> {
    let remembered = last_selected
        .filter(|_| use_last_device_id)
        .and_then(|id| devices.iter().find(|device| device.id == id));
    remembered.or_else(|| devices.first())
}

pub struct CameraSessionBuilder {
    media: Arc<dyn MediaDevices>,
    config: SessionConfig,
    store: Option<Arc<dyn DeviceIdStore>>,
    on_error: Option<ErrorCallback>,
}

impl CameraSessionBuilder {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn DeviceIdStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&CameraError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> CameraSession {
        let store: Arc<dyn DeviceIdStore> = match (self.store, &self.config.storage.last_device_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileStore::new(path)),
            (None, None) => Arc::new(MemoryStore::new()),
        };
        let on_error = self.on_error.unwrap_or_else(log_error_callback);

        let last_selected = match store.get(LAST_DEVICE_ID_KEY) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("Ignoring unreadable last device id: {}", e);
                None
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let access = DeviceAccess::new(self.media);
        let controller = Arc::new(StreamController::new(
            access.clone(),
            self.config.constraints.clone(),
            StreamTiming::from(&self.config.timing),
            events.clone(),
            on_error,
        ));

        let id = Uuid::new_v4();
        log::debug!("[{}] Camera session created", id);
        CameraSession {
            id,
            config: self.config,
            access,
            controller,
            store,
            events,
            inner: Mutex::new(SessionInner {
                devices: Vec::new(),
                selected: None,
                last_selected,
                active: true,
                visibility: Visibility::Visible,
            }),
        }
    }
}

struct SessionInner {
    devices: Vec<Device>,
    selected: Option<String>,
    last_selected: Option<String>,
    active: bool,
    visibility: Visibility,
}

/// A camera session, active from construction until [`deactivate`](Self::deactivate)
pub struct CameraSession {
    id: Uuid,
    config: SessionConfig,
    access: DeviceAccess,
    controller: Arc<StreamController>,
    store: Arc<dyn DeviceIdStore>,
    events: broadcast::Sender<SessionEvent>,
    inner: Mutex<SessionInner>,
}

impl CameraSession {
    pub fn builder(media: Arc<dyn MediaDevices>) -> CameraSessionBuilder {
        CameraSessionBuilder {
            media,
            config: SessionConfig::default(),
            store: None,
            on_error: None,
        }
    }

    pub fn new(media: Arc<dyn MediaDevices>, config: SessionConfig) -> Self {
        Self::builder(media).config(config).build()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Attach a sink, enumerate devices and auto-select one if configured
    pub async fn attach_sink(&self, sink: Arc<dyn VideoSink>) {
        self.controller.attach_sink(sink);

        let devices = match self.refresh_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                log::warn!("[{}] Device enumeration failed: {}", self.id, e);
                self.controller.fail(e).await;
                return;
            }
        };

        if self.config.auto_start {
            self.auto_select(&devices).await;
        }
    }

    /// Detach the sink and stop streaming
    pub async fn detach_sink(&self) {
        self.controller.detach_sink();
        self.controller.stop().await;
    }

    /// Request permission and re-enumerate devices, replacing the list wholesale
    pub async fn refresh_devices(&self) -> Result<Vec<Device>, CameraError> {
        let devices = self
            .access
            .list_devices(&self.config.constraints)
            .await?;
        Ok(self.replace_devices(devices))
    }

    fn replace_devices(&self, devices: Vec<Device>) -> Vec<Device> {
        lock(&self.inner).devices = devices.clone();
        let _ = self.events.send(SessionEvent::DevicesChanged(devices.clone()));
        devices
    }

    /// Select a device by id and stream from it.
    ///
    /// Returns `false` when the id is not in the current device list, in
    /// which case nothing happens.
    pub async fn select_device(&self, id: &str) -> bool {
        let (device, was_selected, active) = {
            let mut inner = lock(&self.inner);
            let Some(device) = inner.devices.iter().find(|d| d.id == id).cloned() else {
                log::debug!("[{}] Ignoring selection of unknown device {}", self.id, id);
                return false;
            };
            let was_selected = inner.selected.as_deref() == Some(id);
            inner.selected = Some(device.id.clone());
            inner.last_selected = Some(device.id.clone());
            (device, was_selected, inner.active)
        };

        if let Err(e) = self.store.set(LAST_DEVICE_ID_KEY, &device.id) {
            log::warn!("[{}] Failed to persist last device id: {}", self.id, e);
        }
        let _ = self.events.send(SessionEvent::DeviceSelected(device.clone()));

        let busy = matches!(
            self.controller.state(),
            SessionState::Starting | SessionState::Display
        );
        if was_selected && busy {
            log::debug!("[{}] Device {} already streaming", self.id, device.id);
            return true;
        }
        if !active {
            log::debug!("[{}] Session inactive, not starting {}", self.id, device.id);
            return true;
        }
        if self.paused_while_hidden() {
            log::debug!("[{}] Hidden, deferring start of {}", self.id, device.id);
            return true;
        }

        log::info!("[{}] Selected camera {} ({})", self.id, device.id, device.label);
        self.controller.start(device).await;
        true
    }

    /// React to page/window visibility; only acts when `auto_pause` is set
    pub async fn set_visibility(&self, visibility: Visibility) {
        let previous = std::mem::replace(&mut lock(&self.inner).visibility, visibility);
        if !self.config.auto_pause || previous == visibility {
            return;
        }

        match visibility {
            Visibility::Hidden => {
                log::debug!("[{}] Hidden, pausing camera", self.id);
                self.controller.stop().await;
            }
            Visibility::Visible => {
                if let Some(device) = self.resumable_device() {
                    log::debug!("[{}] Visible again, resuming {}", self.id, device.id);
                    self.controller.start(device).await;
                }
            }
        }
    }

    /// Mark the session active and resume the selected device if possible
    pub async fn activate(&self) {
        let was_active = std::mem::replace(&mut lock(&self.inner).active, true);
        if was_active {
            return;
        }
        log::debug!("[{}] Activated", self.id);

        if self.paused_while_hidden() {
            return;
        }
        if let Some(device) = self.resumable_device() {
            self.controller.start(device).await;
        }
    }

    fn paused_while_hidden(&self) -> bool {
        self.config.auto_pause && lock(&self.inner).visibility == Visibility::Hidden
    }

    /// Stop streaming and ignore start requests until reactivated
    pub async fn deactivate(&self) {
        lock(&self.inner).active = false;
        log::debug!("[{}] Deactivated", self.id);
        self.controller.stop().await;
    }

    pub async fn stop(&self) {
        self.controller.stop().await;
    }

    pub async fn set_torch(&self, enabled: bool) {
        self.controller.set_torch(enabled).await;
    }

    /// Apply a hot-plug event: refresh the list, stop if the active device
    /// went away, and auto-select when a camera appears and none is chosen
    pub async fn handle_device_event(&self, event: &DeviceEvent) {
        let listed = self
            .access
            .enumerate_devices(&self.config.constraints)
            .await;
        let devices = match listed {
            Ok(devices) => self.replace_devices(devices),
            Err(e) => {
                log::warn!("[{}] Refresh after {:?} failed: {}", self.id, event, e);
                return;
            }
        };

        match event {
            DeviceEvent::Disconnected(device) => {
                let active = self.controller.active_device();
                let selected = lock(&self.inner).selected.clone();
                let affected = active.as_ref().map(|d| d.id.as_str()) == Some(device.id.as_str())
                    || (selected.as_deref() == Some(device.id.as_str())
                        && self.controller.state() != SessionState::Idle);
                if affected {
                    log::info!("[{}] Active camera {} disconnected", self.id, device.id);
                    self.controller.stop().await;
                }
            }
            DeviceEvent::Connected(_) => {
                let has_selection = lock(&self.inner).selected.is_some();
                if !has_selection && self.config.auto_start && self.controller.sink().is_some()
                {
                    self.auto_select(&devices).await;
                }
            }
        }
    }

    /// Monitor polling this session's device access layer
    pub fn device_monitor(&self) -> DeviceMonitor {
        DeviceMonitor::new(
            self.access.clone(),
            self.config.constraints.clone(),
            Duration::from_millis(self.config.timing.device_poll_interval_ms),
        )
    }

    pub fn devices(&self) -> Vec<Device> {
        lock(&self.inner).devices.clone()
    }

    /// The selected device, resolved against the current list
    pub fn selected_device(&self) -> Option<Device> {
        let inner = lock(&self.inner);
        let id = inner.selected.as_deref()?;
        inner.devices.iter().find(|d| d.id == id).cloned()
    }

    pub fn last_selected(&self) -> Option<String> {
        lock(&self.inner).last_selected.clone()
    }

    /// Overwrite the persisted last selection without selecting anything
    pub fn set_last_selected(&self, id: &str) -> Result<(), CameraError> {
        self.store.set(LAST_DEVICE_ID_KEY, id)?;
        lock(&self.inner).last_selected = Some(id.to_string());
        Ok(())
    }

    pub fn visibility(&self) -> Visibility {
        lock(&self.inner).visibility
    }

    pub fn is_active(&self) -> bool {
        lock(&self.inner).active
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.controller.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.controller.stream()
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.controller.capabilities()
    }

    pub fn torch(&self) -> bool {
        self.controller.torch()
    }

    pub fn is_mirrored(&self) -> bool {
        self.controller.is_mirrored()
    }

    pub fn sink(&self) -> Option<Arc<dyn VideoSink>> {
        self.controller.sink()
    }

    pub fn controller(&self) -> Arc<StreamController> {
        self.controller.clone()
    }

    async fn auto_select(&self, devices: &[Device]) {
        let last = lock(&self.inner).last_selected.clone();
        let Some(device) =
            choose_initial_device(devices, last.as_deref(), self.config.use_last_device_id)
        else {
            return;
        };
        log::debug!("[{}] Auto-selecting {}", self.id, device.id);
        self.select_device(&device.id).await;
    }

    /// Selected device, if the session may stream it right now
    fn resumable_device(&self) -> Option<Device> {
        if !self.is_active() || self.controller.sink().is_none() {
            return None;
        }
        self.selected_device()
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if self.controller.stream().is_some() {
            log::debug!("[{}] Dropped while streaming", self.id);
            self.controller.release_now();
        }
    }
}
