//! RPC bridge driver
//!
//! Forwards operations as signed JSON requests to an operator-provided HTTP
//! endpoint, which performs them however it likes. Every request carries an
//! HMAC over the body followed by the configured header values, one
//! signature per shared secret.

use async_trait::async_trait;
use ring::hmac;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::capability::*;
use crate::error::{BmcError, Result};
use crate::feature::Feature;
use crate::target::{BmcTarget, HmacAlgorithm, RpcConfig};
use crate::types::{BootDevice, BootOptions, PowerAction, PowerState, VirtualMediaKind};

pub const NAME: &str = "rpc";
pub const PROTOCOL: &str = "rpc";

pub const FEATURES: &[Feature] = &[
    Feature::PowerState,
    Feature::PowerSet,
    Feature::BootDeviceSet,
    Feature::VirtualMedia,
];

/// Build the capability descriptor for `target`.
///
/// Fails when no RPC endpoint or secret is configured, which keeps the
/// driver out of the registry.
pub fn init(target: &BmcTarget) -> Result<Capabilities> {
    let config = target
        .options
        .rpc
        .clone()
        .ok_or_else(|| BmcError::InvalidConfig("rpc: no consumer configured".to_string()))?;
    if config.consumer_url.is_empty() {
        return Err(BmcError::InvalidConfig("rpc: consumer_url is required".to_string()));
    }
    if config.secrets.is_empty() {
        return Err(BmcError::InvalidConfig("rpc: at least one secret is required".to_string()));
    }

    let client = Arc::new(RpcClient::new(&target.host, config)?);
    Ok(Capabilities::new()
        .with_connection(client.clone())
        .with_power_state(client.clone())
        .with_power_set(client.clone())
        .with_boot_device_set(client.clone())
        .with_virtual_media(client))
}

/// Request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: i64,
    pub host: String,
    pub method: String,
    pub params: Value,
}

/// Error object in a response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RpcResponseError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: i64,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<RpcResponseError>,
}

/// Sign `message` with one secret, formatted as `<algo>=<hex>`.
pub fn sign(algorithm: HmacAlgorithm, secret: &str, message: &[u8]) -> String {
    let alg = match algorithm {
        HmacAlgorithm::Sha256 => hmac::HMAC_SHA256,
        HmacAlgorithm::Sha512 => hmac::HMAC_SHA512,
    };
    let key = hmac::Key::new(alg, secret.as_bytes());
    let tag = hmac::sign(&key, message);
    format!("{}={}", algorithm.as_str(), hex::encode(tag.as_ref()))
}

/// Driver speaking the RPC bridge protocol
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    host: String,
    config: RpcConfig,
}

impl RpcClient {
    pub fn new(host: &str, config: RpcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BmcError::InvalidConfig(format!("rpc http client: {}", e)))?;
        Ok(Self {
            http,
            host: host.to_string(),
            config,
        })
    }

    /// Signature header value for `body` sent with `headers`
    fn signature(&self, body: &[u8], headers: &[(String, String)]) -> String {
        let mut message = body.to_vec();
        for name in &self.config.signed_headers {
            if let Some((_, value)) = headers.iter().find(|(h, _)| h.eq_ignore_ascii_case(name)) {
                message.extend_from_slice(value.as_bytes());
            }
        }
        self.config
            .secrets
            .iter()
            .map(|secret| sign(self.config.algorithm, secret, &message))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Send one request and return its `result`
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = RpcRequest {
            id: i64::from(rand::random::<u32>()),
            host: self.host.clone(),
            method: method.to_string(),
            params,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| BmcError::Protocol(format!("encode rpc request: {}", e)))?;

        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                self.config.timestamp_header.clone(),
                chrono::Utc::now().to_rfc3339(),
            ),
        ];
        let signature = self.signature(&body, &headers);

        debug!(host = %self.host, method = %method, id = request.id, "Sending rpc request");

        let mut builder = self
            .http
            .post(&self.config.consumer_url)
            .header(self.config.signature_header.as_str(), signature);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(body)
            .send()
            .await
            .map_err(BmcError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BmcError::CommandFailed(format!(
                "rpc consumer returned {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }

        let reply: RpcResponse = response.json().await.map_err(BmcError::from_http)?;
        if reply.id != request.id {
            return Err(BmcError::Protocol(format!(
                "rpc response id {} does not match request id {}",
                reply.id, request.id
            )));
        }
        if let Some(err) = reply.error {
            if err.code != 0 || !err.message.is_empty() {
                return Err(BmcError::Rpc {
                    code: err.code,
                    message: err.message,
                });
            }
        }
        Ok(reply.result)
    }
}

#[async_trait]
impl Connection for RpcClient {}

#[async_trait]
impl PowerStateGetter for RpcClient {
    async fn power_state(&self) -> Result<PowerState> {
        let result = self.call("getPowerState", json!({})).await?;
        let state = result.as_str().unwrap_or_default().to_ascii_lowercase();
        Ok(match state.as_str() {
            "on" => PowerState::On,
            "off" => PowerState::Off,
            _ => PowerState::Unknown,
        })
    }
}

#[async_trait]
impl PowerSetter for RpcClient {
    async fn power_set(&self, action: PowerAction) -> Result<bool> {
        self.call("setPowerState", json!({ "state": action.as_str() }))
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl BootDeviceSetter for RpcClient {
    async fn boot_device_set(&self, device: BootDevice, options: BootOptions) -> Result<bool> {
        self.call(
            "setBootDevice",
            json!({
                "device": device.to_string(),
                "persistent": options.persistent,
                "efiBoot": options.efi,
            }),
        )
        .await?;
        Ok(true)
    }
}

#[async_trait]
impl VirtualMediaSetter for RpcClient {
    async fn set_virtual_media(&self, kind: VirtualMediaKind, media_url: &str) -> Result<bool> {
        self.call(
            "setVirtualMedia",
            json!({ "mediaUrl": media_url, "kind": kind.to_string() }),
        )
        .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Echo the request id back with a fixed result or error
    struct Echo {
        result: Value,
        error: Option<RpcResponseError>,
    }

    impl Respond for Echo {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let req: RpcRequest = serde_json::from_slice(&request.body).unwrap();
            ResponseTemplate::new(200).set_body_json(RpcResponse {
                id: req.id,
                host: req.host,
                result: self.result.clone(),
                error: self.error.clone(),
            })
        }
    }

    fn client_for(server: &MockServer) -> RpcClient {
        let config = RpcConfig::new(format!("{}/rpc", server.uri()), "superSecret1");
        RpcClient::new("10.0.0.9", config).unwrap()
    }

    #[test]
    fn test_sign_format() {
        let sig = sign(HmacAlgorithm::Sha256, "key", b"body");
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);

        let sig = sign(HmacAlgorithm::Sha512, "key", b"body");
        assert!(sig.starts_with("sha512="));
        assert_eq!(sig.len(), "sha512=".len() + 128);
    }

    #[test]
    fn test_sign_is_deterministic_per_secret() {
        assert_eq!(
            sign(HmacAlgorithm::Sha256, "a", b"x"),
            sign(HmacAlgorithm::Sha256, "a", b"x")
        );
        assert_ne!(
            sign(HmacAlgorithm::Sha256, "a", b"x"),
            sign(HmacAlgorithm::Sha256, "b", b"x")
        );
    }

    #[test]
    fn test_signature_one_per_secret() {
        let mut config = RpcConfig::new("http://localhost/rpc", "one");
        config.secrets.push("two".to_string());
        let client = RpcClient::new("h", config).unwrap();

        let sig = client.signature(b"{}", &[]);
        assert_eq!(sig.split(',').count(), 2);
    }

    #[test]
    fn test_init_requires_consumer() {
        let target = BmcTarget::new("10.0.0.9", "", "");
        assert!(matches!(init(&target), Err(BmcError::InvalidConfig(_))));

        let mut target = target;
        target.options.rpc = Some(RpcConfig::new("http://hooks/rpc", "s"));
        let caps = init(&target).unwrap();
        let declared: crate::feature::Features = FEATURES.iter().copied().collect();
        assert_eq!(caps.features(), declared);
    }

    #[tokio::test]
    async fn test_power_state_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(Echo {
                result: json!("on"),
                error: None,
            })
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.power_state().await.unwrap(), PowerState::On);

        let received = server.received_requests().await.unwrap();
        let req: RpcRequest = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(req.method, "getPowerState");
        assert_eq!(req.host, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_request_signature_verifies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(Echo {
                result: Value::Null,
                error: None,
            })
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.power_set(PowerAction::Cycle).await.unwrap());

        let received = server.received_requests().await.unwrap();
        let request = &received[0];
        let timestamp = request
            .headers
            .get("X-BMCLIB-Timestamp")
            .unwrap()
            .to_str()
            .unwrap();
        let signature = request
            .headers
            .get("X-BMCLIB-Signature")
            .unwrap()
            .to_str()
            .unwrap();

        let mut message = request.body.clone();
        message.extend_from_slice(timestamp.as_bytes());
        assert_eq!(signature, sign(HmacAlgorithm::Sha256, "superSecret1", &message));

        let req: RpcRequest = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(req.params, json!({ "state": "cycle" }));
    }

    #[tokio::test]
    async fn test_error_object_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(Echo {
                result: Value::Null,
                error: Some(RpcResponseError {
                    code: 500,
                    message: "bmc unreachable".to_string(),
                }),
            })
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .boot_device_set(BootDevice::Pxe, BootOptions::once())
            .await
            .unwrap_err();
        assert!(matches!(err, BmcError::Rpc { code: 500, .. }));
    }

    #[tokio::test]
    async fn test_http_failure_is_command_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.set_virtual_media(VirtualMediaKind::Cd, "http://img/boot.iso").await,
            Err(BmcError::CommandFailed(_))
        ));
    }
}
