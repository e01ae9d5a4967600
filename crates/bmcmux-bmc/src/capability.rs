//! Capability traits and the per-driver capability descriptor
//!
//! Each BMC operation is its own narrow trait. A driver implements the subset
//! it supports and hands out a [`Capabilities`] value that records, once,
//! which of those traits it satisfies. Callers never probe a driver for a
//! trait at call time; they look the capability up in the descriptor.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::error::Result;
use crate::feature::{Feature, Features};
use crate::firmware::{
    FirmwareInstallStep, FirmwareStatus, FirmwareTaskKind, OperationApplyTime,
};
use crate::types::{
    BmcResetType, BootDevice, BootOptions, EventLogEntry, PowerAction, PowerState, Screenshot,
    SensorReading, UserAccount, UserRole, VirtualMediaKind,
};

/// Session lifecycle of a driver
///
/// Stateless drivers (e.g. ones that shell out per call) can rely on the
/// default implementations.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Log in / establish the session
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Log out / release the session
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Check whether the target speaks this driver's protocol
    async fn compatible(&self) -> bool {
        true
    }
}

/// Read the current power state
#[async_trait]
pub trait PowerStateGetter: Send + Sync {
    async fn power_state(&self) -> Result<PowerState>;
}

/// Apply a power action
///
/// Returns `Ok(false)` when the BMC accepted the request but reported it as
/// unsuccessful.
#[async_trait]
pub trait PowerSetter: Send + Sync {
    async fn power_set(&self, action: PowerAction) -> Result<bool>;
}

/// Set the next (or persistent) boot device
#[async_trait]
pub trait BootDeviceSetter: Send + Sync {
    async fn boot_device_set(&self, device: BootDevice, options: BootOptions) -> Result<bool>;
}

#[async_trait]
pub trait UserCreator: Send + Sync {
    async fn user_create(&self, user: &str, password: &str, role: UserRole) -> Result<bool>;
}

#[async_trait]
pub trait UserUpdater: Send + Sync {
    async fn user_update(&self, user: &str, password: &str, role: UserRole) -> Result<bool>;
}

#[async_trait]
pub trait UserDeleter: Send + Sync {
    async fn user_delete(&self, user: &str) -> Result<bool>;
}

#[async_trait]
pub trait UserReader: Send + Sync {
    async fn users(&self) -> Result<Vec<UserAccount>>;
}

/// Reset the management controller itself
#[async_trait]
pub trait BmcResetter: Send + Sync {
    async fn bmc_reset(&self, reset_type: BmcResetType) -> Result<bool>;
}

/// Attach (or, with an empty URL, eject) virtual media
#[async_trait]
pub trait VirtualMediaSetter: Send + Sync {
    async fn set_virtual_media(&self, kind: VirtualMediaKind, media_url: &str) -> Result<bool>;
}

/// Upload and install an image in one call, returning the install task id
#[async_trait]
pub trait FirmwareInstaller: Send + Sync {
    async fn firmware_install(
        &self,
        component: &str,
        apply_time: OperationApplyTime,
        force: bool,
        image: Bytes,
    ) -> Result<String>;
}

/// Free-form status of an install started by [`FirmwareInstaller`]
#[async_trait]
pub trait FirmwareInstallStatusGetter: Send + Sync {
    async fn firmware_install_status(
        &self,
        install_version: &str,
        component: &str,
        task_id: &str,
    ) -> Result<String>;
}

/// Upload an image without installing it, returning the upload task id
#[async_trait]
pub trait FirmwareUploader: Send + Sync {
    async fn firmware_upload(&self, component: &str, image: Bytes) -> Result<String>;
}

/// Upload an image that the BMC installs on its own, returning the install task id
#[async_trait]
pub trait FirmwareUploadInitiator: Send + Sync {
    async fn firmware_upload_and_initiate(&self, component: &str, image: Bytes) -> Result<String>;
}

/// Install a previously uploaded image, returning the install task id
#[async_trait]
pub trait FirmwareInstallerUploaded: Send + Sync {
    async fn firmware_install_uploaded(
        &self,
        component: &str,
        upload_task_id: &str,
    ) -> Result<String>;
}

/// Poll a firmware upload or install task
#[async_trait]
pub trait FirmwareTaskVerifier: Send + Sync {
    async fn firmware_task_status(
        &self,
        kind: FirmwareTaskKind,
        component: &str,
        task_id: &str,
        install_version: &str,
    ) -> Result<FirmwareStatus>;
}

/// The ordered steps this driver needs to install firmware for a component
#[async_trait]
pub trait FirmwareInstallStepsGetter: Send + Sync {
    async fn firmware_install_steps(&self, component: &str) -> Result<Vec<FirmwareInstallStep>>;
}

#[async_trait]
pub trait ScreenshotGetter: Send + Sync {
    async fn screenshot(&self) -> Result<Screenshot>;
}

#[async_trait]
pub trait SystemEventLogGetter: Send + Sync {
    async fn system_event_log(&self) -> Result<Vec<EventLogEntry>>;
}

#[async_trait]
pub trait SystemEventLogClearer: Send + Sync {
    async fn clear_system_event_log(&self) -> Result<()>;
}

/// Raw inventory document; mapping it onto a device schema is the caller's job
#[async_trait]
pub trait InventoryGetter: Send + Sync {
    async fn inventory(&self) -> Result<serde_json::Value>;
}

#[async_trait]
pub trait SensorReader: Send + Sync {
    async fn sensors(&self) -> Result<Vec<SensorReading>>;
}

macro_rules! capabilities {
    ($($field:ident: $trait:ident => $feature:ident, $with:ident;)*) => {
        /// Which capability traits a driver satisfies, resolved once
        #[derive(Clone, Default)]
        pub struct Capabilities {
            connection: Option<Arc<dyn Connection>>,
            $($field: Option<Arc<dyn $trait>>,)*
        }

        impl Capabilities {
            /// An empty descriptor
            pub fn new() -> Self {
                Self::default()
            }

            /// Attach the session lifecycle
            pub fn with_connection(mut self, connection: Arc<dyn Connection>) -> Self {
                self.connection = Some(connection);
                self
            }

            pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
                self.connection.as_ref()
            }

            $(
                pub fn $with(mut self, capability: Arc<dyn $trait>) -> Self {
                    self.$field = Some(capability);
                    self
                }

                pub fn $field(&self) -> Option<&Arc<dyn $trait>> {
                    self.$field.as_ref()
                }
            )*

            /// Whether the descriptor backs `feature` with an implementation
            pub fn supports(&self, feature: Feature) -> bool {
                match feature {
                    $(Feature::$feature => self.$field.is_some(),)*
                }
            }

            /// Every feature this descriptor backs
            pub fn features(&self) -> Features {
                Feature::ALL
                    .iter()
                    .copied()
                    .filter(|f| self.supports(*f))
                    .collect()
            }
        }

        impl std::fmt::Debug for Capabilities {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct("Capabilities")
                    .field("connection", &self.connection.is_some())
                    .field("features", &self.features().to_string())
                    .finish()
            }
        }
    };
}

capabilities! {
    power_state: PowerStateGetter => PowerState, with_power_state;
    power_set: PowerSetter => PowerSet, with_power_set;
    boot_device_set: BootDeviceSetter => BootDeviceSet, with_boot_device_set;
    user_create: UserCreator => UserCreate, with_user_create;
    user_update: UserUpdater => UserUpdate, with_user_update;
    user_delete: UserDeleter => UserDelete, with_user_delete;
    user_read: UserReader => UserRead, with_user_read;
    bmc_reset: BmcResetter => BmcReset, with_bmc_reset;
    virtual_media: VirtualMediaSetter => VirtualMedia, with_virtual_media;
    firmware_install: FirmwareInstaller => FirmwareInstall, with_firmware_install;
    firmware_install_status: FirmwareInstallStatusGetter => FirmwareInstallStatus, with_firmware_install_status;
    firmware_upload: FirmwareUploader => FirmwareUpload, with_firmware_upload;
    firmware_upload_initiate: FirmwareUploadInitiator => FirmwareUploadInitiateInstall, with_firmware_upload_initiate;
    firmware_install_uploaded: FirmwareInstallerUploaded => FirmwareInstallUploaded, with_firmware_install_uploaded;
    firmware_task_status: FirmwareTaskVerifier => FirmwareTaskStatus, with_firmware_task_status;
    firmware_install_steps: FirmwareInstallStepsGetter => FirmwareInstallSteps, with_firmware_install_steps;
    screenshot: ScreenshotGetter => Screenshot, with_screenshot;
    system_event_log: SystemEventLogGetter => GetSystemEventLog, with_system_event_log;
    clear_system_event_log: SystemEventLogClearer => ClearSystemEventLog, with_clear_system_event_log;
    inventory: InventoryGetter => InventoryRead, with_inventory;
    sensors: SensorReader => SensorRead, with_sensors;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};

    // Minimal driver for exercising the descriptor
    struct MockPower {
        power_state: AtomicU8,
    }

    impl MockPower {
        fn new(initial_state: PowerState) -> Self {
            let state = match initial_state {
                PowerState::On => 1,
                PowerState::Off => 0,
                PowerState::Unknown => 2,
            };
            Self {
                power_state: AtomicU8::new(state),
            }
        }
    }

    #[async_trait]
    impl PowerStateGetter for MockPower {
        async fn power_state(&self) -> Result<PowerState> {
            match self.power_state.load(Ordering::SeqCst) {
                0 => Ok(PowerState::Off),
                1 => Ok(PowerState::On),
                _ => Ok(PowerState::Unknown),
            }
        }
    }

    #[async_trait]
    impl PowerSetter for MockPower {
        async fn power_set(&self, action: PowerAction) -> Result<bool> {
            match action {
                PowerAction::On | PowerAction::Cycle | PowerAction::Reset => {
                    self.power_state.store(1, Ordering::SeqCst)
                }
                PowerAction::Off | PowerAction::Soft => self.power_state.store(0, Ordering::SeqCst),
            }
            Ok(true)
        }
    }

    impl Connection for MockPower {}

    fn descriptor(driver: Arc<MockPower>) -> Capabilities {
        Capabilities::new()
            .with_connection(driver.clone())
            .with_power_state(driver.clone())
            .with_power_set(driver)
    }

    #[test]
    fn test_empty_descriptor() {
        let caps = Capabilities::new();
        assert!(caps.features().is_empty());
        assert!(caps.connection().is_none());
        assert!(!caps.supports(Feature::PowerState));
    }

    #[test]
    fn test_descriptor_features() {
        let caps = descriptor(Arc::new(MockPower::new(PowerState::Off)));

        assert!(caps.supports(Feature::PowerState));
        assert!(caps.supports(Feature::PowerSet));
        assert!(!caps.supports(Feature::BootDeviceSet));
        assert_eq!(
            caps.features(),
            Features::from([Feature::PowerState, Feature::PowerSet])
        );
        assert!(caps.connection().is_some());
    }

    #[tokio::test]
    async fn test_descriptor_dispatches_to_driver() {
        let caps = descriptor(Arc::new(MockPower::new(PowerState::Off)));

        let getter = caps.power_state().unwrap();
        assert_eq!(getter.power_state().await.unwrap(), PowerState::Off);

        assert!(caps.power_set().unwrap().power_set(PowerAction::On).await.unwrap());
        assert_eq!(getter.power_state().await.unwrap(), PowerState::On);
    }

    #[tokio::test]
    async fn test_connection_defaults() {
        let driver = MockPower::new(PowerState::On);
        assert!(driver.open().await.is_ok());
        assert!(driver.close().await.is_ok());
        assert!(driver.compatible().await);
    }

    #[test]
    fn test_descriptor_debug() {
        let caps = descriptor(Arc::new(MockPower::new(PowerState::On)));
        let debug = format!("{:?}", caps);
        assert!(debug.contains("powerstate"));
        assert!(debug.contains("powerset"));
    }
}
