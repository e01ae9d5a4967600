//! Connection settings for one BMC
//!
//! A [`BmcTarget`] is what every driver's init function receives. Protocol
//! specific knobs live in [`DriverOptions`]; a driver whose options are
//! missing declines to initialize.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Address and credentials of a BMC, plus per-driver options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BmcTarget {
    /// BMC hostname or IP address
    pub host: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub options: DriverOptions,
}

impl BmcTarget {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            options: DriverOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }
}

/// Per-protocol driver options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    pub ipmi: IpmiConfig,
    pub redfish: RedfishConfig,
    /// RPC bridge settings (driver disabled when absent)
    pub rpc: Option<RpcConfig>,
    /// Wake-on-LAN settings (driver disabled when absent)
    pub wol: Option<WolConfig>,
}

/// IPMI connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpmiConfig {
    /// BMC port (default 623)
    pub port: u16,
    /// Path to the ipmitool binary
    pub tool_path: String,
    /// ipmitool interface (default "lanplus")
    pub interface: String,
    /// Optional cipher suite (`-C`)
    pub cipher_suite: Option<u8>,
}

impl Default for IpmiConfig {
    fn default() -> Self {
        Self {
            port: 623,
            tool_path: "ipmitool".to_string(),
            interface: "lanplus".to_string(),
            cipher_suite: None,
        }
    }
}

impl IpmiConfig {
    /// Set custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_tool_path(mut self, path: impl Into<String>) -> Self {
        self.tool_path = path.into();
        self
    }
}

/// Redfish REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedfishConfig {
    /// HTTPS port (default 443)
    pub port: u16,
    /// URL scheme, "https" unless testing against a plain-HTTP emulator
    pub scheme: String,
    /// Skip TLS verification (for self-signed certs)
    pub insecure: bool,
    /// System resource to manage; discovered on open when empty
    pub system_path: Option<String>,
    /// Manager resource to reset; discovered on open when empty
    pub manager_path: Option<String>,
}

impl Default for RedfishConfig {
    fn default() -> Self {
        Self {
            port: 443,
            scheme: "https".to_string(),
            insecure: false,
            system_path: None,
            manager_path: None,
        }
    }
}

impl RedfishConfig {
    /// Allow insecure TLS (self-signed certs)
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Base URL for `host`
    pub fn base_url(&self, host: &str) -> String {
        format!("{}://{}:{}", self.scheme, host, self.port)
    }
}

/// HMAC algorithm for signing RPC requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmacAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HmacAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HmacAlgorithm::Sha256 => "sha256",
            HmacAlgorithm::Sha512 => "sha512",
        }
    }
}

/// RPC bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Endpoint that receives the signed JSON requests
    pub consumer_url: String,
    /// Header carrying the signature(s)
    pub signature_header: String,
    /// Header carrying the request timestamp
    pub timestamp_header: String,
    /// Header values appended to the body before signing, in order
    pub signed_headers: Vec<String>,
    pub algorithm: HmacAlgorithm,
    /// Shared secrets; one signature is produced per secret
    pub secrets: Vec<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            consumer_url: String::new(),
            signature_header: "X-BMCLIB-Signature".to_string(),
            timestamp_header: "X-BMCLIB-Timestamp".to_string(),
            signed_headers: vec!["X-BMCLIB-Timestamp".to_string()],
            algorithm: HmacAlgorithm::Sha256,
            secrets: Vec::new(),
        }
    }
}

impl RpcConfig {
    pub fn new(consumer_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            consumer_url: consumer_url.into(),
            secrets: vec![secret.into()],
            ..Self::default()
        }
    }

    pub fn with_algorithm(mut self, algorithm: HmacAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_signature_header(mut self, header: impl Into<String>) -> Self {
        self.signature_header = header.into();
        self
    }
}

/// Wake-on-LAN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WolConfig {
    /// Target MAC address
    pub mac_address: [u8; 6],
    /// Broadcast address (default 255.255.255.255)
    pub broadcast_address: IpAddr,
    /// Port (default 9)
    pub port: u16,
}

impl WolConfig {
    /// Create new WoL config from MAC address
    pub fn new(mac_address: [u8; 6]) -> Self {
        Self {
            mac_address,
            broadcast_address: IpAddr::V4(std::net::Ipv4Addr::BROADCAST),
            port: 9,
        }
    }

    /// Parse MAC address from string (e.g., "aa:bb:cc:dd:ee:ff")
    pub fn from_mac_string(mac: &str) -> Option<Self> {
        let parts: Vec<&str> = mac.split(':').collect();
        if parts.len() != 6 {
            return None;
        }

        let mut addr = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            addr[i] = u8::from_str_radix(part, 16).ok()?;
        }

        Some(Self::new(addr))
    }

    /// Set custom broadcast address
    pub fn with_broadcast(mut self, addr: IpAddr) -> Self {
        self.broadcast_address = addr;
        self
    }

    /// Set custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Get MAC address as string
    pub fn mac_string(&self) -> String {
        self.mac_address
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}
