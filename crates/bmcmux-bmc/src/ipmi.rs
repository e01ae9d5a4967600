//! IPMI driver
//!
//! IPMI (Intelligent Platform Management Interface) is the most common
//! BMC protocol for server hardware. This driver shells out to `ipmitool`
//! over LAN for every call, so it holds no session and relies on the default
//! [`Connection`] lifecycle apart from the compatibility probe.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::capability::*;
use crate::error::{BmcError, Result};
use crate::feature::Feature;
use crate::target::{BmcTarget, IpmiConfig};
use crate::types::{
    BmcResetType, BootDevice, BootOptions, EventLogEntry, PowerAction, PowerState,
    SensorReading, UserAccount, UserRole,
};

pub const NAME: &str = "ipmitool";
pub const PROTOCOL: &str = "ipmi";

pub const FEATURES: &[Feature] = &[
    Feature::PowerState,
    Feature::PowerSet,
    Feature::BootDeviceSet,
    Feature::BmcReset,
    Feature::UserCreate,
    Feature::UserUpdate,
    Feature::UserDelete,
    Feature::UserRead,
    Feature::GetSystemEventLog,
    Feature::ClearSystemEventLog,
    Feature::SensorRead,
];

/// Build the capability descriptor for `target`.
pub fn init(target: &BmcTarget) -> Result<Capabilities> {
    if target.host.is_empty() {
        return Err(BmcError::InvalidConfig("ipmi: host is required".to_string()));
    }
    let tool = Arc::new(IpmiTool::new(target));
    Ok(Capabilities::new()
        .with_connection(tool.clone())
        .with_power_state(tool.clone())
        .with_power_set(tool.clone())
        .with_boot_device_set(tool.clone())
        .with_bmc_reset(tool.clone())
        .with_user_create(tool.clone())
        .with_user_update(tool.clone())
        .with_user_delete(tool.clone())
        .with_user_read(tool.clone())
        .with_system_event_log(tool.clone())
        .with_clear_system_event_log(tool.clone())
        .with_sensors(tool))
}

/// IPMI driver backed by the external ipmitool binary
#[derive(Debug)]
pub struct IpmiTool {
    host: String,
    username: String,
    password: String,
    config: IpmiConfig,
}

impl IpmiTool {
    pub fn new(target: &BmcTarget) -> Self {
        Self {
            host: target.host.clone(),
            username: target.username.clone(),
            password: target.password.clone(),
            config: target.options.ipmi.clone(),
        }
    }

    /// Build ipmitool command args
    ///
    /// The password travels in `IPMI_PASSWORD` (`-E`) to keep it off the
    /// process list.
    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-I".to_string(),
            self.config.interface.clone(),
            "-H".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.config.port.to_string(),
            "-U".to_string(),
            self.username.clone(),
            "-E".to_string(),
        ];
        if let Some(suite) = self.config.cipher_suite {
            args.push("-C".to_string());
            args.push(suite.to_string());
        }
        args
    }

    /// Run one ipmitool command and return its stdout
    async fn run(&self, command: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.config.tool_path);
        cmd.args(self.base_args())
            .args(command)
            .env("IPMI_PASSWORD", &self.password)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(host = %self.host, command = %command.join(" "), "Running ipmitool");

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BmcError::Unsupported(format!("{} not found", self.config.tool_path))
            } else {
                BmcError::CommandFailed(format!("ipmitool execution failed: {}", e))
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(
                host = %self.host,
                code = code,
                stderr = %stderr.trim(),
                "ipmitool failed"
            );
            return Err(classify_failure(code, stderr.trim()));
        }

        Ok(stdout)
    }
}

/// Map an ipmitool failure onto the error taxonomy
fn classify_failure(code: i32, stderr: &str) -> BmcError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("rakp") || lower.contains("unauthorized") || lower.contains("password") {
        BmcError::AuthenticationFailed(stderr.to_string())
    } else if lower.contains("unable to establish") || lower.contains("timeout") {
        BmcError::Timeout(stderr.to_string())
    } else {
        BmcError::CommandFailed(format!("ipmitool exited with code {}: {}", code, stderr))
    }
}

fn power_action_arg(action: PowerAction) -> &'static str {
    match action {
        PowerAction::On => "on",
        PowerAction::Off => "off",
        PowerAction::Soft => "soft",
        PowerAction::Reset => "reset",
        PowerAction::Cycle => "cycle",
    }
}

fn boot_device_arg(device: BootDevice) -> &'static str {
    match device {
        BootDevice::Pxe => "pxe",
        BootDevice::Disk => "disk",
        BootDevice::Cdrom => "cdrom",
        BootDevice::BiosSetup => "bios",
        BootDevice::None => "none",
    }
}

pub(crate) fn parse_power_status(output: &str) -> PowerState {
    let lower = output.to_ascii_lowercase();
    if lower.contains("is on") {
        PowerState::On
    } else if lower.contains("is off") {
        PowerState::Off
    } else {
        PowerState::Unknown
    }
}

fn privilege_level(role: UserRole) -> &'static str {
    match role {
        UserRole::Administrator => "privilege=4",
        UserRole::Operator => "privilege=3",
        UserRole::User => "privilege=2",
        UserRole::ReadOnly => "privilege=1",
    }
}

fn parse_privilege(privilege: &str) -> Option<UserRole> {
    match privilege {
        "ADMINISTRATOR" => Some(UserRole::Administrator),
        "OPERATOR" => Some(UserRole::Operator),
        "USER" => Some(UserRole::User),
        "CALLBACK" => Some(UserRole::ReadOnly),
        _ => None,
    }
}

/// Parse `ipmitool user list` output
///
/// ```text
/// ID  Name             Callin  Link Auth  IPMI Msg   Channel Priv Limit
/// 1                    true    false      false      NO ACCESS
/// 2   ADMIN            false   false      true       ADMINISTRATOR
/// ```
pub(crate) fn parse_user_list(output: &str) -> Vec<UserAccount> {
    parse_user_slots(output)
        .into_iter()
        .filter(|u| !u.name.is_empty())
        .collect()
}

/// Every slot in `ipmitool user list` output, empty ones included
fn parse_user_slots(output: &str) -> Vec<UserAccount> {
    let mut users = Vec::new();
    for line in output.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((id, rest)) = tokens.split_first() else {
            continue;
        };
        if id.parse::<u32>().is_err() {
            continue;
        }
        let Some(flags_at) = rest.iter().position(|t| *t == "true" || *t == "false") else {
            continue;
        };
        let name = rest[..flags_at].join(" ");
        let privilege = rest.get(flags_at + 3..).map(|p| p.join(" ")).unwrap_or_default();
        let role = parse_privilege(&privilege);
        users.push(UserAccount {
            id: id.to_string(),
            name,
            role,
            enabled: role.is_some(),
        });
    }
    users
}

/// Parse `ipmitool sel elist` output
///
/// ```text
///    1 | 01/02/2026 | 10:00:00 | Power Unit #0x01 | Power off/down | Asserted
/// ```
pub(crate) fn parse_sel(output: &str) -> Vec<EventLogEntry> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            if fields.len() < 5 {
                return None;
            }
            Some(EventLogEntry {
                id: fields[0].to_string(),
                timestamp: format!("{} {}", fields[1], fields[2]),
                description: fields[3].to_string(),
                message: fields[4..].join(" | "),
            })
        })
        .collect()
}

fn sensor_kind(unit: &str) -> &'static str {
    match unit {
        "degrees C" | "degrees F" => "temperature",
        "RPM" => "fan",
        "Volts" => "voltage",
        "Amps" => "current",
        "Watts" => "power",
        _ => "other",
    }
}

/// Parse `ipmitool sensor` output
///
/// ```text
/// Inlet Temp       | 24.000     | degrees C  | ok    | na | ...
/// ```
pub(crate) fn parse_sensors(output: &str) -> Vec<SensorReading> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            if fields.len() < 3 || fields[0].is_empty() {
                return None;
            }
            Some(SensorReading {
                name: fields[0].to_string(),
                kind: sensor_kind(fields[2]).to_string(),
                value: fields[1].parse().ok(),
                unit: fields[2].to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl Connection for IpmiTool {
    async fn compatible(&self) -> bool {
        match self.run(&["chassis", "power", "status"]).await {
            Ok(_) => true,
            Err(e) => {
                debug!(host = %self.host, error = %e, "ipmi compatibility probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl PowerStateGetter for IpmiTool {
    async fn power_state(&self) -> Result<PowerState> {
        let output = self.run(&["chassis", "power", "status"]).await?;
        Ok(parse_power_status(&output))
    }
}

#[async_trait]
impl PowerSetter for IpmiTool {
    async fn power_set(&self, action: PowerAction) -> Result<bool> {
        // ipmitool refuses to cycle a host that is off
        let action = if action == PowerAction::Cycle
            && self.power_state().await? == PowerState::Off
        {
            PowerAction::On
        } else {
            action
        };

        let output = self
            .run(&["chassis", "power", power_action_arg(action)])
            .await?;
        Ok(output.contains("Chassis Power Control"))
    }
}

#[async_trait]
impl BootDeviceSetter for IpmiTool {
    async fn boot_device_set(&self, device: BootDevice, options: BootOptions) -> Result<bool> {
        let mut flags = Vec::new();
        if options.persistent {
            flags.push("persistent");
        }
        if options.efi {
            flags.push("efiboot");
        }
        let options_arg = format!("options={}", flags.join(","));

        let mut command = vec!["chassis", "bootdev", boot_device_arg(device)];
        if !flags.is_empty() {
            command.push(&options_arg);
        }

        let output = self.run(&command).await?;
        Ok(output.contains("Set Boot Device"))
    }
}

#[async_trait]
impl BmcResetter for IpmiTool {
    async fn bmc_reset(&self, reset_type: BmcResetType) -> Result<bool> {
        let kind = match reset_type {
            BmcResetType::Warm => "warm",
            BmcResetType::Cold => "cold",
        };
        let output = self.run(&["mc", "reset", kind]).await?;
        Ok(output.contains("reset command"))
    }
}

impl IpmiTool {
    async fn user_slots(&self) -> Result<Vec<UserAccount>> {
        let output = self.run(&["user", "list", "1"]).await?;
        Ok(parse_user_slots(&output))
    }

    async fn user_id(&self, user: &str) -> Result<String> {
        self.user_slots()
            .await?
            .into_iter()
            .find(|slot| slot.name == user)
            .map(|slot| slot.id)
            .ok_or_else(|| BmcError::CommandFailed(format!("no such user: {}", user)))
    }

    async fn grant(&self, id: &str, role: UserRole) -> Result<()> {
        self.run(&[
            "channel",
            "setaccess",
            "1",
            id,
            "link=on",
            "ipmi=on",
            "callin=on",
            privilege_level(role),
        ])
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserCreator for IpmiTool {
    async fn user_create(&self, user: &str, password: &str, role: UserRole) -> Result<bool> {
        let slots = self.user_slots().await?;
        if slots.iter().any(|slot| slot.name == user) {
            return Err(BmcError::CommandFailed(format!("user already exists: {}", user)));
        }
        // Slot 1 is the reserved anonymous user
        let id = slots
            .iter()
            .find(|slot| slot.id != "1" && slot.name.is_empty())
            .map(|slot| slot.id.clone())
            .ok_or_else(|| BmcError::CommandFailed("no free user slot".to_string()))?;

        self.run(&["user", "set", "name", &id, user]).await?;
        self.run(&["user", "set", "password", &id, password]).await?;
        self.grant(&id, role).await?;
        self.run(&["user", "enable", &id]).await?;
        Ok(true)
    }
}

#[async_trait]
impl UserUpdater for IpmiTool {
    async fn user_update(&self, user: &str, password: &str, role: UserRole) -> Result<bool> {
        let id = self.user_id(user).await?;
        self.run(&["user", "set", "password", &id, password]).await?;
        self.grant(&id, role).await?;
        Ok(true)
    }
}

#[async_trait]
impl UserDeleter for IpmiTool {
    async fn user_delete(&self, user: &str) -> Result<bool> {
        let id = self.user_id(user).await?;
        self.run(&["user", "disable", &id]).await?;
        self.run(&["user", "set", "name", &id, ""]).await?;
        Ok(true)
    }
}

#[async_trait]
impl UserReader for IpmiTool {
    async fn users(&self) -> Result<Vec<UserAccount>> {
        let output = self.run(&["user", "list", "1"]).await?;
        Ok(parse_user_list(&output))
    }
}

#[async_trait]
impl SystemEventLogGetter for IpmiTool {
    async fn system_event_log(&self) -> Result<Vec<EventLogEntry>> {
        let output = self.run(&["sel", "elist"]).await?;
        Ok(parse_sel(&output))
    }
}

#[async_trait]
impl SystemEventLogClearer for IpmiTool {
    async fn clear_system_event_log(&self) -> Result<()> {
        self.run(&["sel", "clear"]).await?;
        Ok(())
    }
}

#[async_trait]
impl SensorReader for IpmiTool {
    async fn sensors(&self) -> Result<Vec<SensorReading>> {
        let output = self.run(&["sensor"]).await?;
        Ok(parse_sensors(&output))
    }
}
