//! bmcmux BMC vocabulary and drivers
//!
//! This crate defines what a BMC driver is: a set of narrow capability
//! traits, one per operation, collected into a [`Capabilities`] descriptor
//! that records which of them a driver implements. It also ships the
//! built-in drivers.
//!
//! # Supported Protocols
//!
//! - **IPMI**: Traditional BMC protocol, driven through `ipmitool`
//! - **Redfish**: Modern REST-based protocol for newer hardware
//! - **RPC**: Signed JSON requests to an operator-provided endpoint
//! - **Wake-on-LAN**: Simple power-on only (no other operations)
//!
//! # Example
//!
//! ```
//! use bmcmux_bmc::{wol, BmcTarget, Feature, WolConfig};
//!
//! let mut target = BmcTarget::new("10.0.0.5", "admin", "password");
//! target.options.wol = WolConfig::from_mac_string("aa:bb:cc:dd:ee:ff");
//!
//! let caps = wol::init(&target).unwrap();
//! assert!(caps.supports(Feature::PowerSet));
//! assert!(!caps.supports(Feature::PowerState));
//! ```

pub mod capability;
pub mod error;
pub mod feature;
pub mod firmware;
pub mod ipmi;
pub mod mock;
pub mod redfish;
pub mod rpc;
pub mod target;
pub mod types;
pub mod wol;

pub use capability::*;
pub use error::{BmcError, Result};
pub use feature::{Feature, Features};
pub use firmware::{
    normalize_task_id, FirmwareInstallStep, FirmwareStatus, FirmwareTaskKind, FirmwareTaskState,
    OperationApplyTime, NO_TASK_ID,
};
pub use target::{
    BmcTarget, DriverOptions, HmacAlgorithm, IpmiConfig, RedfishConfig, RpcConfig, WolConfig,
};
pub use types::{
    BmcResetType, BootDevice, BootOptions, EventLogEntry, PowerAction, PowerState, Screenshot,
    SensorReading, UserAccount, UserRole, VirtualMediaKind,
};
