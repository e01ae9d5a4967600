//! Redfish driver
//!
//! Redfish is a modern REST-based BMC management protocol. It's becoming
//! the standard for newer server hardware, replacing IPMI for many use cases.
//!
//! `open` logs in through the session service and discovers the system and
//! manager resources; when the BMC offers no sessions every request falls
//! back to basic auth. A 401 on a session token surfaces as
//! [`BmcError::SessionExpired`] so long-running callers can log in again.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::LOCATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::capability::*;
use crate::error::{BmcError, Result};
use crate::feature::Feature;
use crate::firmware::{
    normalize_task_id, FirmwareInstallStep, FirmwareStatus, FirmwareTaskKind, FirmwareTaskState,
    OperationApplyTime,
};
use crate::target::{BmcTarget, RedfishConfig};
use crate::types::{
    BmcResetType, BootDevice, BootOptions, PowerAction, PowerState, UserAccount, UserRole,
    VirtualMediaKind,
};

pub const NAME: &str = "redfish";
pub const PROTOCOL: &str = "redfish";

pub const FEATURES: &[Feature] = &[
    Feature::PowerState,
    Feature::PowerSet,
    Feature::BootDeviceSet,
    Feature::BmcReset,
    Feature::UserRead,
    Feature::UserCreate,
    Feature::UserUpdate,
    Feature::UserDelete,
    Feature::VirtualMedia,
    Feature::FirmwareInstall,
    Feature::FirmwareTaskStatus,
    Feature::FirmwareInstallSteps,
    Feature::InventoryRead,
];

const SERVICE_ROOT: &str = "/redfish/v1";
const SESSIONS: &str = "/redfish/v1/SessionService/Sessions";
const ACCOUNTS: &str = "/redfish/v1/AccountService/Accounts";
const UPDATE_SERVICE: &str = "/redfish/v1/UpdateService";
const TASKS: &str = "/redfish/v1/TaskService/Tasks";
const DEFAULT_SYSTEM: &str = "/redfish/v1/Systems/1";
const DEFAULT_MANAGER: &str = "/redfish/v1/Managers/1";

/// Build the capability descriptor for `target`.
pub fn init(target: &BmcTarget) -> Result<Capabilities> {
    if target.host.is_empty() {
        return Err(BmcError::InvalidConfig("redfish: host is required".to_string()));
    }
    let client = Arc::new(RedfishClient::new(target)?);
    Ok(Capabilities::new()
        .with_connection(client.clone())
        .with_power_state(client.clone())
        .with_power_set(client.clone())
        .with_boot_device_set(client.clone())
        .with_bmc_reset(client.clone())
        .with_user_read(client.clone())
        .with_user_create(client.clone())
        .with_user_update(client.clone())
        .with_user_delete(client.clone())
        .with_virtual_media(client.clone())
        .with_firmware_install(client.clone())
        .with_firmware_task_status(client.clone())
        .with_firmware_install_steps(client.clone())
        .with_inventory(client))
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    /// Session resource, deleted on close
    location: Option<String>,
}

#[derive(Debug, Clone)]
struct Resources {
    system: String,
    manager: String,
}

/// Redfish REST API client
#[derive(Debug)]
pub struct RedfishClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    session: RwLock<Option<Session>>,
    resources: RwLock<Resources>,
    discover: bool,
}

impl RedfishClient {
    pub fn new(target: &BmcTarget) -> Result<Self> {
        let config: &RedfishConfig = &target.options.redfish;
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BmcError::InvalidConfig(format!("redfish http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url(&target.host),
            username: target.username.clone(),
            password: target.password.clone(),
            session: RwLock::new(None),
            resources: RwLock::new(Resources {
                system: config
                    .system_path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM.to_string()),
                manager: config
                    .manager_path
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MANAGER.to_string()),
            }),
            discover: config.system_path.is_none() || config.manager_path.is_none(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn system_path(&self) -> String {
        self.resources.read().await.system.clone()
    }

    async fn manager_path(&self) -> String {
        self.resources.read().await.manager.clone()
    }

    /// Start a request carrying the current credentials
    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.session.read().await.as_ref() {
            Some(session) => builder.header("X-Auth-Token", &session.token),
            None => builder.basic_auth(&self.username, Some(&self.password)),
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let has_session = self.session.read().await.is_some();
        let response = builder.send().await.map_err(BmcError::from_http)?;
        let status = response.status();
        let url = response.url().path().to_string();

        if status == StatusCode::UNAUTHORIZED {
            return Err(if has_session {
                BmcError::SessionExpired(format!("401 from {}", url))
            } else {
                BmcError::AuthenticationFailed(format!("401 from {}", url))
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BmcError::CommandFailed(format!(
                "{} {}: {}",
                status.as_u16(),
                url,
                body.trim()
            )));
        }
        Ok(response)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self.send(self.request(Method::GET, path).await).await?;
        response.json().await.map_err(BmcError::from_http)
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Response> {
        self.send(self.request(Method::POST, path).await.json(&body))
            .await
    }

    async fn patch_json(&self, path: &str, body: Value) -> Result<Response> {
        self.send(self.request(Method::PATCH, path).await.json(&body))
            .await
    }

    /// Member links of a collection resource
    async fn members(&self, path: &str) -> Result<Vec<String>> {
        let collection = self.get_json(path).await?;
        Ok(member_links(&collection))
    }

    async fn login(&self) -> Result<()> {
        let body = json!({ "UserName": self.username, "Password": self.password });
        let response = self
            .http
            .post(self.url(SESSIONS))
            .json(&body)
            .send()
            .await
            .map_err(BmcError::from_http)?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                BmcError::AuthenticationFailed(format!("session login rejected for {}", self.username)),
            ),
            status if status.is_success() => {
                let token = response
                    .headers()
                    .get("X-Auth-Token")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                match token {
                    Some(token) => {
                        *self.session.write().await = Some(Session { token, location });
                        debug!(base_url = %self.base_url, "Redfish session established");
                    }
                    None => debug!(base_url = %self.base_url, "No session token, using basic auth"),
                }
                Ok(())
            }
            status => {
                debug!(
                    base_url = %self.base_url,
                    status = status.as_u16(),
                    "Session service unavailable, using basic auth"
                );
                Ok(())
            }
        }
    }

    async fn discover_resources(&self) {
        let system = match self.members("/redfish/v1/Systems").await {
            Ok(links) => links.into_iter().next(),
            Err(e) => {
                debug!(error = %e, "System discovery failed");
                None
            }
        };
        let manager = match self.members("/redfish/v1/Managers").await {
            Ok(links) => links.into_iter().next(),
            Err(e) => {
                debug!(error = %e, "Manager discovery failed");
                None
            }
        };

        let mut resources = self.resources.write().await;
        if let Some(system) = system {
            resources.system = system;
        }
        if let Some(manager) = manager {
            resources.manager = manager;
        }
    }

    /// Resource link of the account named `user`
    async fn find_account(&self, user: &str) -> Result<String> {
        for link in self.members(ACCOUNTS).await? {
            let account = self.get_json(&link).await?;
            if account["UserName"].as_str() == Some(user) {
                return Ok(link);
            }
        }
        Err(BmcError::CommandFailed(format!("no such user: {}", user)))
    }
}

fn member_links(collection: &Value) -> Vec<String> {
    collection["Members"]
        .as_array()
        .map(|members| {
            members
                .iter()
                .filter_map(|m| m["@odata.id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn reset_type(action: PowerAction) -> &'static str {
    match action {
        PowerAction::On => "On",
        PowerAction::Off => "ForceOff",
        PowerAction::Soft => "GracefulShutdown",
        PowerAction::Reset | PowerAction::Cycle => "ForceRestart",
    }
}

fn boot_source(device: BootDevice) -> &'static str {
    match device {
        BootDevice::Pxe => "Pxe",
        BootDevice::Disk => "Hdd",
        BootDevice::Cdrom => "Cd",
        BootDevice::BiosSetup => "BiosSetup",
        BootDevice::None => "None",
    }
}

fn role_id(role: UserRole) -> &'static str {
    match role {
        UserRole::Administrator => "Administrator",
        UserRole::Operator => "Operator",
        UserRole::User | UserRole::ReadOnly => "ReadOnly",
    }
}

fn parse_role(role_id: &str) -> Option<UserRole> {
    match role_id {
        "Administrator" => Some(UserRole::Administrator),
        "Operator" => Some(UserRole::Operator),
        "ReadOnly" => Some(UserRole::ReadOnly),
        _ => None,
    }
}

fn parse_power_state(system: &Value) -> PowerState {
    match system["PowerState"].as_str() {
        Some("On") | Some("PoweringOn") => PowerState::On,
        Some("Off") | Some("PoweringOff") => PowerState::Off,
        _ => PowerState::Unknown,
    }
}

/// Task id from a `Location` header or an `Id` in the body
async fn task_id_from(response: Response) -> String {
    let from_header = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|loc| loc.trim_end_matches('/').rsplit('/').next())
        .map(str::to_string);
    if let Some(id) = from_header {
        return normalize_task_id(id);
    }
    let body: Value = response.json().await.unwrap_or(Value::Null);
    normalize_task_id(body["Id"].as_str().unwrap_or_default().to_string())
}

#[async_trait]
impl Connection for RedfishClient {
    async fn open(&self) -> Result<()> {
        self.login().await?;
        if self.discover {
            self.discover_resources().await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let session = self.session.write().await.take();
        if let Some(Session {
            token,
            location: Some(location),
        }) = session
        {
            let response = self
                .http
                .delete(self.url(&location))
                .header("X-Auth-Token", token)
                .send()
                .await
                .map_err(BmcError::from_http)?;
            debug!(status = response.status().as_u16(), "Redfish session closed");
        }
        Ok(())
    }

    async fn compatible(&self) -> bool {
        match self.get_json(SERVICE_ROOT).await {
            Ok(root) => root.get("RedfishVersion").is_some(),
            Err(e) => {
                debug!(base_url = %self.base_url, error = %e, "redfish compatibility probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl PowerStateGetter for RedfishClient {
    async fn power_state(&self) -> Result<PowerState> {
        let system = self.get_json(&self.system_path().await).await?;
        Ok(parse_power_state(&system))
    }
}

#[async_trait]
impl PowerSetter for RedfishClient {
    async fn power_set(&self, action: PowerAction) -> Result<bool> {
        // A restart request against a host that is off does nothing
        let action = if action == PowerAction::Cycle
            && self.power_state().await? == PowerState::Off
        {
            PowerAction::On
        } else {
            action
        };

        let path = format!("{}/Actions/ComputerSystem.Reset", self.system_path().await);
        let response = self
            .post_json(&path, json!({ "ResetType": reset_type(action) }))
            .await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl BootDeviceSetter for RedfishClient {
    async fn boot_device_set(&self, device: BootDevice, options: BootOptions) -> Result<bool> {
        let mut boot = json!({
            "BootSourceOverrideEnabled": if options.persistent { "Continuous" } else { "Once" },
            "BootSourceOverrideTarget": boot_source(device),
        });
        if options.efi {
            boot["BootSourceOverrideMode"] = json!("UEFI");
        }

        let response = self
            .patch_json(&self.system_path().await, json!({ "Boot": boot }))
            .await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl BmcResetter for RedfishClient {
    async fn bmc_reset(&self, reset_type: BmcResetType) -> Result<bool> {
        let kind = match reset_type {
            BmcResetType::Warm => "GracefulRestart",
            BmcResetType::Cold => "ForceRestart",
        };
        let path = format!("{}/Actions/Manager.Reset", self.manager_path().await);
        let response = self.post_json(&path, json!({ "ResetType": kind })).await?;

        // The session dies with the BMC
        self.session.write().await.take();
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl UserReader for RedfishClient {
    async fn users(&self) -> Result<Vec<UserAccount>> {
        let mut users = Vec::new();
        for link in self.members(ACCOUNTS).await? {
            let account = self.get_json(&link).await?;
            let name = account["UserName"].as_str().unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            users.push(UserAccount {
                id: account["Id"].as_str().unwrap_or_default().to_string(),
                name: name.to_string(),
                role: account["RoleId"].as_str().and_then(parse_role),
                enabled: account["Enabled"].as_bool().unwrap_or(false),
            });
        }
        Ok(users)
    }
}

#[async_trait]
impl UserCreator for RedfishClient {
    async fn user_create(&self, user: &str, password: &str, role: UserRole) -> Result<bool> {
        let body = json!({
            "UserName": user,
            "Password": password,
            "RoleId": role_id(role),
            "Enabled": true,
        });
        let response = self.post_json(ACCOUNTS, body).await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl UserUpdater for RedfishClient {
    async fn user_update(&self, user: &str, password: &str, role: UserRole) -> Result<bool> {
        let link = self.find_account(user).await?;
        let response = self
            .patch_json(&link, json!({ "Password": password, "RoleId": role_id(role) }))
            .await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl UserDeleter for RedfishClient {
    async fn user_delete(&self, user: &str) -> Result<bool> {
        let link = self.find_account(user).await?;
        let response = self.send(self.request(Method::DELETE, &link).await).await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl VirtualMediaSetter for RedfishClient {
    async fn set_virtual_media(&self, kind: VirtualMediaKind, media_url: &str) -> Result<bool> {
        let collection = format!("{}/VirtualMedia", self.manager_path().await);
        let wanted = kind.to_string();

        for link in self.members(&collection).await? {
            let media = self.get_json(&link).await?;
            let matches = media["MediaTypes"]
                .as_array()
                .map(|types| types.iter().any(|t| t.as_str() == Some(wanted.as_str())))
                .unwrap_or(false);
            if !matches {
                continue;
            }

            let response = if media_url.is_empty() {
                self.post_json(&format!("{}/Actions/VirtualMedia.EjectMedia", link), json!({}))
                    .await?
            } else {
                self.post_json(
                    &format!("{}/Actions/VirtualMedia.InsertMedia", link),
                    json!({ "Image": media_url, "Inserted": true, "WriteProtected": true }),
                )
                .await?
            };
            return Ok(response.status().is_success());
        }

        Err(BmcError::Unsupported(format!("no {} virtual media slot", wanted)))
    }
}

#[async_trait]
impl FirmwareInstaller for RedfishClient {
    async fn firmware_install(
        &self,
        component: &str,
        apply_time: OperationApplyTime,
        force: bool,
        image: Bytes,
    ) -> Result<String> {
        let service = self.get_json(UPDATE_SERVICE).await?;
        let push_uri = service["MultipartHttpPushUri"]
            .as_str()
            .ok_or_else(|| {
                BmcError::Unsupported("BMC does not offer multipart firmware push".to_string())
            })?
            .to_string();

        let parameters = json!({
            "Targets": [],
            "@Redfish.OperationApplyTime": apply_time.to_string(),
            "ForceUpdate": force,
        });
        let form = Form::new()
            .part(
                "UpdateParameters",
                Part::text(parameters.to_string())
                    .mime_str("application/json")
                    .map_err(BmcError::from_http)?,
            )
            .part(
                "UpdateFile",
                Part::bytes(image.to_vec())
                    .file_name(format!("{}.bin", component))
                    .mime_str("application/octet-stream")
                    .map_err(BmcError::from_http)?,
            );

        info!(component = %component, size = image.len(), "Pushing firmware image");
        let response = self
            .send(self.request(Method::POST, &push_uri).await.multipart(form))
            .await?;
        Ok(task_id_from(response).await)
    }
}

#[async_trait]
impl FirmwareTaskVerifier for RedfishClient {
    async fn firmware_task_status(
        &self,
        _kind: FirmwareTaskKind,
        _component: &str,
        task_id: &str,
        _install_version: &str,
    ) -> Result<FirmwareStatus> {
        let task = self.get_json(&format!("{}/{}", TASKS, task_id)).await?;
        let task_state = task["TaskState"].as_str().unwrap_or("Unknown");
        let status = format!(
            "{} ({}) {}%",
            task_state,
            task["TaskStatus"].as_str().unwrap_or("Unknown"),
            task["PercentComplete"].as_u64().unwrap_or(0)
        );
        Ok(FirmwareStatus::new(FirmwareTaskState::from_redfish(task_state), status))
    }
}

#[async_trait]
impl FirmwareInstallStepsGetter for RedfishClient {
    async fn firmware_install_steps(&self, _component: &str) -> Result<Vec<FirmwareInstallStep>> {
        Ok(vec![FirmwareInstallStep::Install, FirmwareInstallStep::InstallStatus])
    }
}

#[async_trait]
impl InventoryGetter for RedfishClient {
    async fn inventory(&self) -> Result<Value> {
        self.get_json(&self.system_path().await).await
    }
}
