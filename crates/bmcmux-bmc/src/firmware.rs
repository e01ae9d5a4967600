//! Firmware install vocabulary
//!
//! Drivers declare an ordered list of [`FirmwareInstallStep`]s and report
//! progress as [`FirmwareTaskState`]s. Both sets are fixed; vendors differ
//! only in which steps they declare and in what order.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::BmcError;

/// Task id used when a driver has no task tracking of its own
pub const NO_TASK_ID: &str = "NO_TASK_ID";

/// Replace an empty task id with [`NO_TASK_ID`].
pub fn normalize_task_id(id: String) -> String {
    if id.trim().is_empty() {
        NO_TASK_ID.to_string()
    } else {
        id
    }
}

/// One abstract stage in a vendor firmware update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum FirmwareInstallStep {
    /// Upload the image without installing it
    Upload,
    /// Poll the upload task until it is verified
    UploadStatus,
    /// Upload and install in a single call
    Install,
    /// Poll the install task until it finishes
    InstallStatus,
    /// Upload the image; the BMC starts installing on its own
    UploadAndInitiateInstall,
    /// Install an image uploaded by an earlier step
    InstallFromUploaded,
    /// Power the host off before installing
    PowerOffHost,
    /// Reset the BMC once the install completed
    ResetBmcPostInstall,
    /// Reset the BMC if any step fails
    ResetBmcOnFailure,
}

impl FirmwareInstallStep {
    pub const ALL: [FirmwareInstallStep; 9] = [
        FirmwareInstallStep::Upload,
        FirmwareInstallStep::UploadStatus,
        FirmwareInstallStep::Install,
        FirmwareInstallStep::InstallStatus,
        FirmwareInstallStep::UploadAndInitiateInstall,
        FirmwareInstallStep::InstallFromUploaded,
        FirmwareInstallStep::PowerOffHost,
        FirmwareInstallStep::ResetBmcPostInstall,
        FirmwareInstallStep::ResetBmcOnFailure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FirmwareInstallStep::Upload => "upload",
            FirmwareInstallStep::UploadStatus => "upload-status",
            FirmwareInstallStep::Install => "install",
            FirmwareInstallStep::InstallStatus => "install-status",
            FirmwareInstallStep::UploadAndInitiateInstall => "upload-and-initiate-install",
            FirmwareInstallStep::InstallFromUploaded => "install-from-uploaded",
            FirmwareInstallStep::PowerOffHost => "power-off-host",
            FirmwareInstallStep::ResetBmcPostInstall => "reset-bmc-post-install",
            FirmwareInstallStep::ResetBmcOnFailure => "reset-bmc-on-failure",
        }
    }
}

impl std::fmt::Display for FirmwareInstallStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FirmwareInstallStep {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FirmwareInstallStep::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| BmcError::InvalidConfig(format!("unknown firmware install step: {}", s)))
    }
}

impl From<FirmwareInstallStep> for String {
    fn from(step: FirmwareInstallStep) -> Self {
        step.as_str().to_string()
    }
}

impl TryFrom<String> for FirmwareInstallStep {
    type Error = BmcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Narrowed projection of a firmware task's native state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirmwareTaskState {
    Initializing,
    Queued,
    Running,
    Complete,
    Failed,
    /// The install finishes only after the host is power cycled
    #[serde(rename = "powercycle-host")]
    PowerCycleHost,
    /// The install finishes only after the BMC is reset
    #[serde(rename = "powercycle-bmc")]
    PowerCycleBmc,
    Unknown,
}

impl FirmwareTaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirmwareTaskState::Initializing => "initializing",
            FirmwareTaskState::Queued => "queued",
            FirmwareTaskState::Running => "running",
            FirmwareTaskState::Complete => "complete",
            FirmwareTaskState::Failed => "failed",
            FirmwareTaskState::PowerCycleHost => "powercycle-host",
            FirmwareTaskState::PowerCycleBmc => "powercycle-bmc",
            FirmwareTaskState::Unknown => "unknown",
        }
    }

    /// Collapse a Redfish `TaskState` into this vocabulary.
    pub fn from_redfish(task_state: &str) -> Self {
        match task_state {
            "New" | "Starting" => FirmwareTaskState::Initializing,
            "Pending" | "Suspended" => FirmwareTaskState::Queued,
            "Running" | "Stopping" | "Cancelling" | "Service" => FirmwareTaskState::Running,
            "Completed" => FirmwareTaskState::Complete,
            "Exception" | "Killed" | "Cancelled" | "Interrupted" => FirmwareTaskState::Failed,
            _ => FirmwareTaskState::Unknown,
        }
    }
}

impl std::fmt::Display for FirmwareTaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which task a status query refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareTaskKind {
    Upload,
    Install,
}

impl std::fmt::Display for FirmwareTaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FirmwareTaskKind::Upload => write!(f, "upload"),
            FirmwareTaskKind::Install => write!(f, "install"),
        }
    }
}

/// When the BMC should apply an installed image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationApplyTime {
    #[default]
    Immediate,
    OnReset,
    OnStartUpdateRequest,
}

impl std::fmt::Display for OperationApplyTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationApplyTime::Immediate => write!(f, "Immediate"),
            OperationApplyTime::OnReset => write!(f, "OnReset"),
            OperationApplyTime::OnStartUpdateRequest => write!(f, "OnStartUpdateRequest"),
        }
    }
}

/// A polled firmware task state plus the driver's free-form status text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareStatus {
    pub state: FirmwareTaskState,
    pub status: String,
}

impl FirmwareStatus {
    pub fn new(state: FirmwareTaskState, status: impl Into<String>) -> Self {
        Self {
            state,
            status: status.into(),
        }
    }
}
