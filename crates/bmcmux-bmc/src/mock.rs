//! In-memory BMC for tests
//!
//! [`MockBmc`] implements every capability trait. Its [`MockBehavior`] decides
//! how each operation answers, firmware task polls replay a scripted queue, and
//! every call is recorded so tests can assert on order.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::capability::*;
use crate::error::{BmcError, Result};
use crate::feature::Feature;
use crate::firmware::{
    FirmwareInstallStep, FirmwareStatus, FirmwareTaskKind, FirmwareTaskState,
    OperationApplyTime,
};
use crate::types::{
    BmcResetType, BootDevice, BootOptions, EventLogEntry, PowerAction, PowerState, Screenshot,
    SensorReading, UserAccount, UserRole, VirtualMediaKind,
};

/// Protocol tag reported by mock drivers
pub const PROTOCOL: &str = "mock";

/// How a [`MockBmc`] answers operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Every operation succeeds
    Succeed,
    /// Boolean operations come back `Ok(false)`
    Reject,
    /// Every operation fails with a command error
    Fail,
    /// Every operation fails with connection refused
    Refuse,
    /// Operations never complete
    Hang,
    /// Operations succeed after sleeping
    Delay(Duration),
}

/// Test double implementing the full capability surface
pub struct MockBmc {
    name: String,
    behavior: MockBehavior,
    power_state: AtomicU8,
    compatible: bool,
    install_steps: Vec<FirmwareInstallStep>,
    upload_task_id: String,
    install_task_id: String,
    task_statuses: Mutex<VecDeque<Result<FirmwareStatus>>>,
    open_failures: Mutex<VecDeque<BmcError>>,
    users: Mutex<Vec<UserAccount>>,
    calls: Mutex<Vec<String>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn encode_power(state: PowerState) -> u8 {
    match state {
        PowerState::Off => 0,
        PowerState::On => 1,
        PowerState::Unknown => 2,
    }
}

impl MockBmc {
    /// Create a mock that succeeds at everything, host powered off
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behavior: MockBehavior::Succeed,
            power_state: AtomicU8::new(0),
            compatible: true,
            install_steps: Vec::new(),
            upload_task_id: "upload-task".to_string(),
            install_task_id: "install-task".to_string(),
            task_statuses: Mutex::new(VecDeque::new()),
            open_failures: Mutex::new(VecDeque::new()),
            users: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_power_state(self, state: PowerState) -> Self {
        self.power_state.store(encode_power(state), Ordering::SeqCst);
        self
    }

    /// Report the target as not speaking this protocol
    pub fn incompatible(mut self) -> Self {
        self.compatible = false;
        self
    }

    pub fn with_install_steps(mut self, steps: Vec<FirmwareInstallStep>) -> Self {
        self.install_steps = steps;
        self
    }

    /// Task ids returned by upload and install calls
    pub fn with_task_ids(mut self, upload: impl Into<String>, install: impl Into<String>) -> Self {
        self.upload_task_id = upload.into();
        self.install_task_id = install.into();
        self
    }

    /// Queue task poll answers; once drained every poll reports complete
    pub fn with_task_statuses(self, statuses: impl IntoIterator<Item = Result<FirmwareStatus>>) -> Self {
        lock(&self.task_statuses).extend(statuses);
        self
    }

    /// Queue errors returned by successive `open` calls
    pub fn with_open_failures(self, failures: impl IntoIterator<Item = BmcError>) -> Self {
        lock(&self.open_failures).extend(failures);
        self
    }

    pub fn with_users(self, users: Vec<UserAccount>) -> Self {
        *lock(&self.users) = users;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every call received so far, e.g. `"power_set:cycle"`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls whose name starts with `prefix`
    pub fn call_count(&self, prefix: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Descriptor backing every feature
    pub fn capabilities(self: &Arc<Self>) -> Capabilities {
        self.capabilities_for(&Feature::ALL)
    }

    /// Descriptor backing only `features`
    pub fn capabilities_for(self: &Arc<Self>, features: &[Feature]) -> Capabilities {
        let mut caps = Capabilities::new().with_connection(self.clone());
        for feature in features {
            caps = match feature {
                Feature::PowerState => caps.with_power_state(self.clone()),
                Feature::PowerSet => caps.with_power_set(self.clone()),
                Feature::BootDeviceSet => caps.with_boot_device_set(self.clone()),
                Feature::UserCreate => caps.with_user_create(self.clone()),
                Feature::UserUpdate => caps.with_user_update(self.clone()),
                Feature::UserDelete => caps.with_user_delete(self.clone()),
                Feature::UserRead => caps.with_user_read(self.clone()),
                Feature::BmcReset => caps.with_bmc_reset(self.clone()),
                Feature::VirtualMedia => caps.with_virtual_media(self.clone()),
                Feature::FirmwareInstall => caps.with_firmware_install(self.clone()),
                Feature::FirmwareInstallStatus => caps.with_firmware_install_status(self.clone()),
                Feature::FirmwareUpload => caps.with_firmware_upload(self.clone()),
                Feature::FirmwareUploadInitiateInstall => {
                    caps.with_firmware_upload_initiate(self.clone())
                }
                Feature::FirmwareInstallUploaded => {
                    caps.with_firmware_install_uploaded(self.clone())
                }
                Feature::FirmwareTaskStatus => caps.with_firmware_task_status(self.clone()),
                Feature::FirmwareInstallSteps => caps.with_firmware_install_steps(self.clone()),
                Feature::Screenshot => caps.with_screenshot(self.clone()),
                Feature::GetSystemEventLog => caps.with_system_event_log(self.clone()),
                Feature::ClearSystemEventLog => caps.with_clear_system_event_log(self.clone()),
                Feature::InventoryRead => caps.with_inventory(self.clone()),
                Feature::SensorRead => caps.with_sensors(self.clone()),
            };
        }
        caps
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }

    /// Record `call`, then answer according to the configured behavior
    async fn perform(&self, call: String) -> Result<bool> {
        self.record(call.clone());
        match self.behavior {
            MockBehavior::Succeed => Ok(true),
            MockBehavior::Reject => Ok(false),
            MockBehavior::Fail => Err(BmcError::CommandFailed(format!(
                "{}: {} failed",
                self.name, call
            ))),
            MockBehavior::Refuse => Err(BmcError::ConnectionRefused(self.name.clone())),
            MockBehavior::Hang => std::future::pending().await,
            MockBehavior::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(true)
            }
        }
    }

    /// Like `perform`, but for operations without a boolean verdict
    async fn answer<T>(&self, call: String, value: T) -> Result<T> {
        self.perform(call).await.map(|_| value)
    }
}

impl std::fmt::Debug for MockBmc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBmc")
            .field("name", &self.name)
            .field("behavior", &self.behavior)
            .finish()
    }
}

#[async_trait]
impl Connection for MockBmc {
    async fn open(&self) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.record("open".to_string());
        match lock(&self.open_failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.record("close".to_string());
        Ok(())
    }

    async fn compatible(&self) -> bool {
        self.compatible
    }
}

#[async_trait]
impl PowerStateGetter for MockBmc {
    async fn power_state(&self) -> Result<PowerState> {
        self.perform("power_state".to_string()).await?;
        Ok(match self.power_state.load(Ordering::SeqCst) {
            0 => PowerState::Off,
            1 => PowerState::On,
            _ => PowerState::Unknown,
        })
    }
}

#[async_trait]
impl PowerSetter for MockBmc {
    async fn power_set(&self, action: PowerAction) -> Result<bool> {
        let ok = self.perform(format!("power_set:{}", action)).await?;
        if ok {
            let state = match action {
                PowerAction::On | PowerAction::Reset | PowerAction::Cycle => PowerState::On,
                PowerAction::Off | PowerAction::Soft => PowerState::Off,
            };
            self.power_state.store(encode_power(state), Ordering::SeqCst);
        }
        Ok(ok)
    }
}

#[async_trait]
impl BootDeviceSetter for MockBmc {
    async fn boot_device_set(&self, device: BootDevice, options: BootOptions) -> Result<bool> {
        self.perform(format!(
            "boot_device_set:{}:persistent={}:efi={}",
            device, options.persistent, options.efi
        ))
        .await
    }
}

#[async_trait]
impl UserCreator for MockBmc {
    async fn user_create(&self, user: &str, _password: &str, role: UserRole) -> Result<bool> {
        let ok = self.perform(format!("user_create:{}", user)).await?;
        if ok {
            let mut users = lock(&self.users);
            let id = (users.len() + 2).to_string();
            users.push(UserAccount {
                id,
                name: user.to_string(),
                role: Some(role),
                enabled: true,
            });
        }
        Ok(ok)
    }
}

#[async_trait]
impl UserUpdater for MockBmc {
    async fn user_update(&self, user: &str, _password: &str, role: UserRole) -> Result<bool> {
        let ok = self.perform(format!("user_update:{}", user)).await?;
        if !ok {
            return Ok(false);
        }
        let mut users = lock(&self.users);
        match users.iter_mut().find(|u| u.name == user) {
            Some(account) => {
                account.role = Some(role);
                Ok(true)
            }
            None => Err(BmcError::CommandFailed(format!("no such user: {}", user))),
        }
    }
}

#[async_trait]
impl UserDeleter for MockBmc {
    async fn user_delete(&self, user: &str) -> Result<bool> {
        let ok = self.perform(format!("user_delete:{}", user)).await?;
        if ok {
            lock(&self.users).retain(|u| u.name != user);
        }
        Ok(ok)
    }
}

#[async_trait]
impl UserReader for MockBmc {
    async fn users(&self) -> Result<Vec<UserAccount>> {
        self.perform("users".to_string()).await?;
        Ok(lock(&self.users).clone())
    }
}

#[async_trait]
impl BmcResetter for MockBmc {
    async fn bmc_reset(&self, reset_type: BmcResetType) -> Result<bool> {
        self.perform(format!("bmc_reset:{}", reset_type)).await
    }
}

#[async_trait]
impl VirtualMediaSetter for MockBmc {
    async fn set_virtual_media(&self, kind: VirtualMediaKind, media_url: &str) -> Result<bool> {
        self.perform(format!("set_virtual_media:{}:{}", kind, media_url))
            .await
    }
}

#[async_trait]
impl FirmwareInstaller for MockBmc {
    async fn firmware_install(
        &self,
        component: &str,
        _apply_time: OperationApplyTime,
        _force: bool,
        _image: Bytes,
    ) -> Result<String> {
        self.answer(
            format!("firmware_install:{}", component),
            self.install_task_id.clone(),
        )
        .await
    }
}

#[async_trait]
impl FirmwareInstallStatusGetter for MockBmc {
    async fn firmware_install_status(
        &self,
        _install_version: &str,
        component: &str,
        task_id: &str,
    ) -> Result<String> {
        self.answer(
            format!("firmware_install_status:{}:{}", component, task_id),
            "complete".to_string(),
        )
        .await
    }
}

#[async_trait]
impl FirmwareUploader for MockBmc {
    async fn firmware_upload(&self, component: &str, _image: Bytes) -> Result<String> {
        self.answer(
            format!("firmware_upload:{}", component),
            self.upload_task_id.clone(),
        )
        .await
    }
}

#[async_trait]
impl FirmwareUploadInitiator for MockBmc {
    async fn firmware_upload_and_initiate(&self, component: &str, _image: Bytes) -> Result<String> {
        self.answer(
            format!("firmware_upload_and_initiate:{}", component),
            self.install_task_id.clone(),
        )
        .await
    }
}

#[async_trait]
impl FirmwareInstallerUploaded for MockBmc {
    async fn firmware_install_uploaded(
        &self,
        component: &str,
        upload_task_id: &str,
    ) -> Result<String> {
        self.answer(
            format!("firmware_install_uploaded:{}:{}", component, upload_task_id),
            self.install_task_id.clone(),
        )
        .await
    }
}

#[async_trait]
impl FirmwareTaskVerifier for MockBmc {
    async fn firmware_task_status(
        &self,
        kind: FirmwareTaskKind,
        _component: &str,
        task_id: &str,
        _install_version: &str,
    ) -> Result<FirmwareStatus> {
        self.record(format!("firmware_task_status:{}:{}", kind, task_id));
        match lock(&self.task_statuses).pop_front() {
            Some(status) => status,
            None => Ok(FirmwareStatus::new(FirmwareTaskState::Complete, "done")),
        }
    }
}

#[async_trait]
impl FirmwareInstallStepsGetter for MockBmc {
    async fn firmware_install_steps(&self, component: &str) -> Result<Vec<FirmwareInstallStep>> {
        self.record(format!("firmware_install_steps:{}", component));
        Ok(self.install_steps.clone())
    }
}

#[async_trait]
impl ScreenshotGetter for MockBmc {
    async fn screenshot(&self) -> Result<Screenshot> {
        let shot = Screenshot {
            data: self.name.as_bytes().to_vec(),
            file_type: "png".to_string(),
        };
        self.answer("screenshot".to_string(), shot).await
    }
}

#[async_trait]
impl SystemEventLogGetter for MockBmc {
    async fn system_event_log(&self) -> Result<Vec<EventLogEntry>> {
        let entries = vec![EventLogEntry {
            id: "1".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            description: "Power Unit".to_string(),
            message: "Power off/down".to_string(),
        }];
        self.answer("system_event_log".to_string(), entries).await
    }
}

#[async_trait]
impl SystemEventLogClearer for MockBmc {
    async fn clear_system_event_log(&self) -> Result<()> {
        self.answer("clear_system_event_log".to_string(), ()).await
    }
}

#[async_trait]
impl InventoryGetter for MockBmc {
    async fn inventory(&self) -> Result<serde_json::Value> {
        let doc = serde_json::json!({ "Name": self.name, "Model": "mock" });
        self.answer("inventory".to_string(), doc).await
    }
}

#[async_trait]
impl SensorReader for MockBmc {
    async fn sensors(&self) -> Result<Vec<SensorReading>> {
        let readings = vec![SensorReading {
            name: "Inlet Temp".to_string(),
            kind: "temperature".to_string(),
            value: Some(24.0),
            unit: "degrees C".to_string(),
        }];
        self.answer("sensors".to_string(), readings).await
    }
}
