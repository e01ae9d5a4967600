//! Common types for BMC operations

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::BmcError;

/// Power state of a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Machine is powered on
    On,
    /// Machine is powered off
    Off,
    /// Power state is unknown
    Unknown,
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::On => write!(f, "on"),
            PowerState::Off => write!(f, "off"),
            PowerState::Unknown => write!(f, "unknown"),
        }
    }
}

/// A power action requested of the BMC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    /// Power on
    On,
    /// Hard power off
    Off,
    /// ACPI shutdown signal
    Soft,
    /// Warm reset without removing power
    Reset,
    /// Off then on
    Cycle,
}

impl PowerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerAction::On => "on",
            PowerAction::Off => "off",
            PowerAction::Soft => "soft",
            PowerAction::Reset => "reset",
            PowerAction::Cycle => "cycle",
        }
    }
}

impl std::fmt::Display for PowerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerAction {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(PowerAction::On),
            "off" => Ok(PowerAction::Off),
            "soft" => Ok(PowerAction::Soft),
            "reset" => Ok(PowerAction::Reset),
            "cycle" => Ok(PowerAction::Cycle),
            other => Err(BmcError::InvalidConfig(format!("unknown power action: {}", other))),
        }
    }
}

/// Boot device selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootDevice {
    /// Boot from network (PXE)
    Pxe,
    /// Boot from local disk
    Disk,
    /// Boot from CD/DVD
    Cdrom,
    /// Boot from BIOS setup
    BiosSetup,
    /// No override (use default)
    None,
}

impl std::fmt::Display for BootDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootDevice::Pxe => write!(f, "pxe"),
            BootDevice::Disk => write!(f, "disk"),
            BootDevice::Cdrom => write!(f, "cdrom"),
            BootDevice::BiosSetup => write!(f, "bios"),
            BootDevice::None => write!(f, "none"),
        }
    }
}

impl FromStr for BootDevice {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pxe" => Ok(BootDevice::Pxe),
            "disk" | "hdd" => Ok(BootDevice::Disk),
            "cdrom" | "cd" => Ok(BootDevice::Cdrom),
            "bios" | "biossetup" => Ok(BootDevice::BiosSetup),
            "none" => Ok(BootDevice::None),
            other => Err(BmcError::InvalidConfig(format!("unknown boot device: {}", other))),
        }
    }
}

/// How a boot device override should be applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootOptions {
    /// Keep the override for every boot rather than the next one only
    pub persistent: bool,
    /// Boot in UEFI mode
    pub efi: bool,
}

impl BootOptions {
    pub fn once() -> Self {
        Self::default()
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn efi(mut self, efi: bool) -> Self {
        self.efi = efi;
        self
    }
}

/// BMC reset flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BmcResetType {
    /// Graceful restart of the management controller
    Warm,
    /// Full power reset of the management controller
    Cold,
}

impl std::fmt::Display for BmcResetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BmcResetType::Warm => write!(f, "warm"),
            BmcResetType::Cold => write!(f, "cold"),
        }
    }
}

/// Privilege level of a BMC user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Administrator,
    Operator,
    User,
    ReadOnly,
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserRole::Administrator => write!(f, "administrator"),
            UserRole::Operator => write!(f, "operator"),
            UserRole::User => write!(f, "user"),
            UserRole::ReadOnly => write!(f, "readonly"),
        }
    }
}

impl FromStr for UserRole {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "administrator" | "admin" => Ok(UserRole::Administrator),
            "operator" => Ok(UserRole::Operator),
            "user" => Ok(UserRole::User),
            "readonly" | "callback" => Ok(UserRole::ReadOnly),
            other => Err(BmcError::InvalidConfig(format!("unknown user role: {}", other))),
        }
    }
}

/// A user account as reported by the BMC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Slot or account id on the BMC
    pub id: String,
    pub name: String,
    pub role: Option<UserRole>,
    pub enabled: bool,
}

/// Virtual media type to attach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtualMediaKind {
    Cd,
    Floppy,
}

impl std::fmt::Display for VirtualMediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VirtualMediaKind::Cd => write!(f, "CD"),
            VirtualMediaKind::Floppy => write!(f, "Floppy"),
        }
    }
}

/// A captured console image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub data: Vec<u8>,
    /// File type of `data`, e.g. "png" or "jpg"
    pub file_type: String,
}

/// One system event log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: String,
    pub timestamp: String,
    pub description: String,
    pub message: String,
}

/// One sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub name: String,
    /// e.g. "temperature", "fan", "voltage"
    pub kind: String,
    pub value: Option<f64>,
    pub unit: String,
}
