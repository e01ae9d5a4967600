//! bmcmux client
//!
//! Fans BMC operations out across an ordered set of drivers. Each call walks
//! the drivers that implement the requested capability, gives each attempt an
//! even share of the caller's remaining time, and returns the first success
//! along with [`Metadata`] on who was tried. When every driver fails, the
//! error carries each driver's failure.
//!
//! # Example
//!
//! ```
//! use bmcmux_bmc::{mock::MockBmc, PowerAction};
//! use bmcmux_client::{CallContext, Client};
//! use bmcmux_registry::Driver;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let bmc = Arc::new(MockBmc::new("lab-1"));
//! let client = Client::new(vec![Driver::from_capabilities("mock", "mock", bmc.capabilities())].into());
//!
//! let ctx = CallContext::with_timeout(Duration::from_secs(5));
//! client.power_set(&ctx, PowerAction::On).await.unwrap();
//! assert_eq!(client.metadata().successful_provider.as_deref(), Some("mock"));
//! # });
//! ```

pub mod builtin;
pub mod client;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod firmware;
pub mod metadata;
mod operations;
pub mod timeout;

pub use builtin::{builtin_catalog, register_builtin_drivers};
pub use client::Client;
pub use config::{ClientConfig, FirmwarePollConfig};
pub use context::{CallContext, ContextError};
pub use dispatch::{dispatch, Dispatched};
pub use error::{ClientError, FirmwareError, ProviderError, ProviderErrors, ProviderFailure, Result};
pub use firmware::{FirmwareJob, FirmwareReport};
pub use metadata::Metadata;
pub use timeout::{allocate_timeout, DEFAULT_PROVIDER_TIMEOUT};
