//! Device monitoring and hot-plug detection
//!
//! Polls the device access layer on a fixed interval and turns differences
//! between consecutive scans into connect/disconnect events.

use crate::devices::DeviceAccess;
use crate::errors::CameraError;
use crate::types::{Device, StreamConstraints};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Device event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected(Device),
    Disconnected(Device),
}

impl DeviceEvent {
    pub fn device(&self) -> &Device {
        match self {
            DeviceEvent::Connected(device) | DeviceEvent::Disconnected(device) => device,
        }
    }
}

/// Device monitor for detecting camera changes
pub struct DeviceMonitor {
    access: DeviceAccess,
    constraints: StreamConstraints,
    interval: Duration,
    active_devices: Arc<RwLock<HashMap<String, Device>>>,
    event_sender: mpsc::UnboundedSender<DeviceEvent>,
    event_receiver: Arc<RwLock<mpsc::UnboundedReceiver<DeviceEvent>>>,
    is_monitoring: Arc<RwLock<bool>>,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl DeviceMonitor {
    pub fn new(access: DeviceAccess, constraints: StreamConstraints, interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            access,
            constraints,
            interval,
            active_devices: Arc::new(RwLock::new(HashMap::new())),
            event_sender: tx,
            event_receiver: Arc::new(RwLock::new(rx)),
            is_monitoring: Arc::new(RwLock::new(false)),
            task: RwLock::new(None),
        }
    }

    /// Start polling for device changes.
    ///
    /// The first scan runs inline and only seeds the device set; devices
    /// already present are not reported as connected.
    pub async fn start_monitoring(&self) -> Result<(), CameraError> {
        let mut is_monitoring = self.is_monitoring.write().await;
        if *is_monitoring {
            return Ok(());
        }

        log::info!("Starting device monitoring every {:?}", self.interval);
        let initial = self.access.enumerate_devices(&self.constraints).await?;
        *self.active_devices.write().await = initial
            .into_iter()
            .map(|device| (device.id.clone(), device))
            .collect();

        let access = self.access.clone();
        let constraints = self.constraints.clone();
        let interval = self.interval;
        let active_devices = self.active_devices.clone();
        let event_sender = self.event_sender.clone();
        let monitoring = self.is_monitoring.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !*monitoring.read().await {
                    break;
                }
                match access.enumerate_devices(&constraints).await {
                    Ok(devices) => {
                        let mut active = active_devices.write().await;
                        diff_devices(&mut active, devices, &event_sender);
                    }
                    Err(e) => log::warn!("Device scan failed: {}", e),
                }
            }
        });

        *self.task.write().await = Some(task);
        *is_monitoring = true;
        Ok(())
    }

    /// Stop monitoring for device changes
    pub async fn stop_monitoring(&self) -> Result<(), CameraError> {
        let mut is_monitoring = self.is_monitoring.write().await;
        if !*is_monitoring {
            return Ok(());
        }

        log::info!("Stopping device monitoring");
        if let Some(task) = self.task.write().await.take() {
            task.abort();
        }
        *is_monitoring = false;
        Ok(())
    }

    pub async fn is_monitoring(&self) -> bool {
        *self.is_monitoring.read().await
    }

    /// Scan once and emit events for whatever changed since the last scan
    pub async fn scan_once(&self) -> Result<Vec<DeviceEvent>, CameraError> {
        let devices = self.access.enumerate_devices(&self.constraints).await?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut active = self.active_devices.write().await;
            diff_devices(&mut active, devices, &tx);
        }
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            let _ = self.event_sender.send(event.clone());
            events.push(event);
        }
        Ok(events)
    }

    /// Get next device event (non-blocking)
    pub async fn poll_event(&self) -> Option<DeviceEvent> {
        let mut rx = self.event_receiver.write().await;
        rx.try_recv().ok()
    }

    /// Wait for next device event
    pub async fn wait_for_event(&self) -> Option<DeviceEvent> {
        let mut rx = self.event_receiver.write().await;
        rx.recv().await
    }

    /// Get list of currently known devices, ordered by id
    pub async fn active_devices(&self) -> Vec<Device> {
        let devices = self.active_devices.read().await;
        let mut devices: Vec<Device> = devices.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.try_write() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

/// Replace `active` with `devices`, reporting what disappeared and appeared
fn diff_devices(
    active: &mut HashMap<String, Device>,
    devices: Vec<Device>,
    events: &mpsc::UnboundedSender<DeviceEvent>,
) {
    let new_ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();

    let gone: Vec<String> = active
        .keys()
        .filter(|id| !new_ids.contains(&id.as_str()))
        .cloned()
        .collect();
    for id in gone {
        if let Some(device) = active.remove(&id) {
            log::info!("Device disconnected: {}", id);
            let _ = events.send(DeviceEvent::Disconnected(device));
        }
    }

    for device in devices {
        if !active.contains_key(&device.id) {
            log::info!("Device connected: {}", device.id);
            let _ = events.send(DeviceEvent::Connected(device.clone()));
        }
        active.insert(device.id.clone(), device);
    }
}
