//! Wake-on-LAN driver
//!
//! Wake-on-LAN is a simple protocol that sends a "magic packet" to wake
//! a machine from a powered-off state. The driver backs only the power set
//! capability, and only for [`PowerAction::On`].

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::capability::*;
use crate::error::{BmcError, Result};
use crate::feature::Feature;
use crate::target::{BmcTarget, WolConfig};
use crate::types::PowerAction;

pub const NAME: &str = "wol";
pub const PROTOCOL: &str = "wol";

pub const FEATURES: &[Feature] = &[Feature::PowerSet];

/// Build the capability descriptor for `target`.
pub fn init(target: &BmcTarget) -> Result<Capabilities> {
    let config = target
        .options
        .wol
        .clone()
        .ok_or_else(|| BmcError::InvalidConfig("wol: no MAC address configured".to_string()))?;
    let driver = Arc::new(WakeOnLan::new(config));
    Ok(Capabilities::new()
        .with_connection(driver.clone())
        .with_power_set(driver))
}

/// Wake-on-LAN driver
#[derive(Debug)]
pub struct WakeOnLan {
    config: WolConfig,
}

impl WakeOnLan {
    pub fn new(config: WolConfig) -> Self {
        Self { config }
    }

    /// Create from MAC address string
    pub fn from_mac(mac: &str) -> Result<Self> {
        let config = WolConfig::from_mac_string(mac)
            .ok_or_else(|| BmcError::InvalidConfig(format!("invalid MAC address: {}", mac)))?;
        Ok(Self::new(config))
    }

    /// Build the magic packet
    ///
    /// Magic packet format:
    /// - 6 bytes of 0xFF
    /// - Target MAC repeated 16 times (96 bytes)
    /// - Total: 102 bytes
    fn build_magic_packet(&self) -> [u8; 102] {
        let mut packet = [0xFFu8; 102];
        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.config.mac_address);
        }
        packet
    }

    /// Get the target MAC address
    pub fn mac_address(&self) -> &[u8; 6] {
        &self.config.mac_address
    }

    async fn wake(&self) -> Result<()> {
        let packet = self.build_magic_packet();

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| BmcError::NetworkError(e.to_string()))?;
        socket
            .set_broadcast(true)
            .map_err(|e| BmcError::NetworkError(e.to_string()))?;

        let target = SocketAddr::new(self.config.broadcast_address, self.config.port);
        socket
            .send_to(&packet, target)
            .await
            .map_err(|e| BmcError::NetworkError(e.to_string()))?;

        debug!(mac = %self.config.mac_string(), target = %target, "Sent magic packet");
        Ok(())
    }
}

impl Connection for WakeOnLan {}

#[async_trait]
impl PowerSetter for WakeOnLan {
    async fn power_set(&self, action: PowerAction) -> Result<bool> {
        match action {
            PowerAction::On => {
                self.wake().await?;
                Ok(true)
            }
            other => Err(BmcError::Unsupported(format!(
                "Wake-on-LAN does not support power {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_wol_from_mac() {
        let driver = WakeOnLan::from_mac("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(driver.mac_address(), &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }

    #[test]
    fn test_wol_from_invalid_mac() {
        assert!(WakeOnLan::from_mac("invalid").is_err());
    }

    #[test]
    fn test_magic_packet_format() {
        let driver = WakeOnLan::from_mac("11:22:33:44:55:66").unwrap();
        let packet = driver.build_magic_packet();

        assert_eq!(&packet[0..6], &[0xFF; 6]);
        let mac = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
        for i in 0..16 {
            let offset = 6 + (i * 6);
            assert_eq!(&packet[offset..offset + 6], &mac);
        }
    }

    #[test]
    fn test_init_without_mac_fails() {
        let target = BmcTarget::new("10.0.0.1", "", "");
        assert!(init(&target).is_err());

        let mut target = target;
        target.options.wol = WolConfig::from_mac_string("aa:bb:cc:dd:ee:ff");
        let caps = init(&target).unwrap();
        assert!(caps.supports(Feature::PowerSet));
        assert_eq!(caps.features().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_actions() {
        let driver = WakeOnLan::from_mac("aa:bb:cc:dd:ee:ff").unwrap();

        for action in [PowerAction::Off, PowerAction::Soft, PowerAction::Reset, PowerAction::Cycle] {
            assert!(matches!(
                driver.power_set(action).await,
                Err(BmcError::Unsupported(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_power_on_sends_magic_packet() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();

        let config = WolConfig::from_mac_string("aa:bb:cc:dd:ee:ff")
            .unwrap()
            .with_broadcast(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(port);
        let driver = WakeOnLan::new(config);

        assert!(driver.power_set(PowerAction::On).await.unwrap());

        let mut buf = [0u8; 128];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(len, 102);
        assert_eq!(&buf[6..12], &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
    }
}
