//! One client method per capability, each dispatched across the current view

use bmcmux_bmc::*;
use bytes::Bytes;
use std::sync::Arc;

use crate::client::Client;
use crate::context::CallContext;
use crate::dispatch::{accepted, dispatch};
use crate::error::Result;

impl Client {
    pub async fn power_state(&self, ctx: &CallContext) -> Result<PowerState> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::PowerState,
                self.default_timeout(),
                Capabilities::power_state,
                move |cap: Arc<dyn PowerStateGetter>| async move { cap.power_state().await },
            )
            .await,
        )
    }

    pub async fn power_set(&self, ctx: &CallContext, action: PowerAction) -> Result<()> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::PowerSet,
                self.default_timeout(),
                Capabilities::power_set,
                move |cap: Arc<dyn PowerSetter>| async move {
                    accepted(cap.power_set(action).await, "power set")
                },
            )
            .await,
        )
    }

    pub async fn boot_device_set(
        &self,
        ctx: &CallContext,
        device: BootDevice,
        options: BootOptions,
    ) -> Result<()> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::BootDeviceSet,
                self.default_timeout(),
                Capabilities::boot_device_set,
                move |cap: Arc<dyn BootDeviceSetter>| async move {
                    accepted(cap.boot_device_set(device, options).await, "boot device set")
                },
            )
            .await,
        )
    }

    pub async fn user_create(
        &self,
        ctx: &CallContext,
        user: &str,
        password: &str,
        role: UserRole,
    ) -> Result<()> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::UserCreate,
                self.default_timeout(),
                Capabilities::user_create,
                move |cap: Arc<dyn UserCreator>| async move {
                    accepted(cap.user_create(user, password, role).await, "user create")
                },
            )
            .await,
        )
    }

    pub async fn user_update(
        &self,
        ctx: &CallContext,
        user: &str,
        password: &str,
        role: UserRole,
    ) -> Result<()> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::UserUpdate,
                self.default_timeout(),
                Capabilities::user_update,
                move |cap: Arc<dyn UserUpdater>| async move {
                    accepted(cap.user_update(user, password, role).await, "user update")
                },
            )
            .await,
        )
    }

    pub async fn user_delete(&self, ctx: &CallContext, user: &str) -> Result<()> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::UserDelete,
                self.default_timeout(),
                Capabilities::user_delete,
                move |cap: Arc<dyn UserDeleter>| async move {
                    accepted(cap.user_delete(user).await, "user delete")
                },
            )
            .await,
        )
    }

    pub async fn users(&self, ctx: &CallContext) -> Result<Vec<UserAccount>> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::UserRead,
                self.default_timeout(),
                Capabilities::user_read,
                move |cap: Arc<dyn UserReader>| async move { cap.users().await },
            )
            .await,
        )
    }

    pub async fn bmc_reset(&self, ctx: &CallContext, reset_type: BmcResetType) -> Result<()> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::BmcReset,
                self.default_timeout(),
                Capabilities::bmc_reset,
                move |cap: Arc<dyn BmcResetter>| async move {
                    accepted(cap.bmc_reset(reset_type).await, "bmc reset")
                },
            )
            .await,
        )
    }

    pub async fn set_virtual_media(
        &self,
        ctx: &CallContext,
        kind: VirtualMediaKind,
        media_url: &str,
    ) -> Result<()> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::VirtualMedia,
                self.default_timeout(),
                Capabilities::virtual_media,
                move |cap: Arc<dyn VirtualMediaSetter>| async move {
                    accepted(cap.set_virtual_media(kind, media_url).await, "virtual media set")
                },
            )
            .await,
        )
    }

    /// Upload and install `image` in one call; returns the install task id
    pub async fn firmware_install(
        &self,
        ctx: &CallContext,
        component: &str,
        apply_time: OperationApplyTime,
        force: bool,
        image: Bytes,
    ) -> Result<String> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::FirmwareInstall,
                self.default_timeout(),
                Capabilities::firmware_install,
                move |cap: Arc<dyn FirmwareInstaller>| {
                    let image = image.clone();
                    async move {
                        cap.firmware_install(component, apply_time, force, image)
                            .await
                            .map(normalize_task_id)
                    }
                },
            )
            .await,
        )
    }

    pub async fn firmware_install_status(
        &self,
        ctx: &CallContext,
        install_version: &str,
        component: &str,
        task_id: &str,
    ) -> Result<String> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::FirmwareInstallStatus,
                self.default_timeout(),
                Capabilities::firmware_install_status,
                move |cap: Arc<dyn FirmwareInstallStatusGetter>| async move {
                    cap.firmware_install_status(install_version, component, task_id)
                        .await
                },
            )
            .await,
        )
    }

    /// Upload `image` without installing it; returns the upload task id
    pub async fn firmware_upload(
        &self,
        ctx: &CallContext,
        component: &str,
        image: Bytes,
    ) -> Result<String> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::FirmwareUpload,
                self.default_timeout(),
                Capabilities::firmware_upload,
                move |cap: Arc<dyn FirmwareUploader>| {
                    let image = image.clone();
                    async move {
                        cap.firmware_upload(component, image)
                            .await
                            .map(normalize_task_id)
                    }
                },
            )
            .await,
        )
    }

    pub async fn firmware_upload_and_initiate(
        &self,
        ctx: &CallContext,
        component: &str,
        image: Bytes,
    ) -> Result<String> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::FirmwareUploadInitiateInstall,
                self.default_timeout(),
                Capabilities::firmware_upload_initiate,
                move |cap: Arc<dyn FirmwareUploadInitiator>| {
                    let image = image.clone();
                    async move {
                        cap.firmware_upload_and_initiate(component, image)
                            .await
                            .map(normalize_task_id)
                    }
                },
            )
            .await,
        )
    }

    pub async fn firmware_install_uploaded(
        &self,
        ctx: &CallContext,
        component: &str,
        upload_task_id: &str,
    ) -> Result<String> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::FirmwareInstallUploaded,
                self.default_timeout(),
                Capabilities::firmware_install_uploaded,
                move |cap: Arc<dyn FirmwareInstallerUploaded>| async move {
                    cap.firmware_install_uploaded(component, upload_task_id)
                        .await
                        .map(normalize_task_id)
                },
            )
            .await,
        )
    }

    pub async fn firmware_task_status(
        &self,
        ctx: &CallContext,
        kind: FirmwareTaskKind,
        component: &str,
        task_id: &str,
        install_version: &str,
    ) -> Result<FirmwareStatus> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::FirmwareTaskStatus,
                self.default_timeout(),
                Capabilities::firmware_task_status,
                move |cap: Arc<dyn FirmwareTaskVerifier>| async move {
                    cap.firmware_task_status(kind, component, task_id, install_version)
                        .await
                },
            )
            .await,
        )
    }

    pub async fn firmware_install_steps(
        &self,
        ctx: &CallContext,
        component: &str,
    ) -> Result<Vec<FirmwareInstallStep>> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::FirmwareInstallSteps,
                self.default_timeout(),
                Capabilities::firmware_install_steps,
                move |cap: Arc<dyn FirmwareInstallStepsGetter>| async move {
                    cap.firmware_install_steps(component).await
                },
            )
            .await,
        )
    }

    pub async fn screenshot(&self, ctx: &CallContext) -> Result<Screenshot> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::Screenshot,
                self.default_timeout(),
                Capabilities::screenshot,
                move |cap: Arc<dyn ScreenshotGetter>| async move { cap.screenshot().await },
            )
            .await,
        )
    }

    pub async fn system_event_log(&self, ctx: &CallContext) -> Result<Vec<EventLogEntry>> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::GetSystemEventLog,
                self.default_timeout(),
                Capabilities::system_event_log,
                move |cap: Arc<dyn SystemEventLogGetter>| async move { cap.system_event_log().await },
            )
            .await,
        )
    }

    pub async fn clear_system_event_log(&self, ctx: &CallContext) -> Result<()> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::ClearSystemEventLog,
                self.default_timeout(),
                Capabilities::clear_system_event_log,
                move |cap: Arc<dyn SystemEventLogClearer>| async move {
                    cap.clear_system_event_log().await
                },
            )
            .await,
        )
    }

    /// The BMC's hardware inventory as an opaque JSON document
    pub async fn inventory(&self, ctx: &CallContext) -> Result<serde_json::Value> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::InventoryRead,
                self.default_timeout(),
                Capabilities::inventory,
                move |cap: Arc<dyn InventoryGetter>| async move { cap.inventory().await },
            )
            .await,
        )
    }

    pub async fn sensors(&self, ctx: &CallContext) -> Result<Vec<SensorReading>> {
        self.finish(
            dispatch(
                ctx,
                self.registry(),
                Feature::SensorRead,
                self.default_timeout(),
                Capabilities::sensors,
                move |cap: Arc<dyn SensorReader>| async move { cap.sensors().await },
            )
            .await,
        )
    }
}
