//! bmcmux driver registry
//!
//! Ordered, filterable collections of drivers. A [`Registry`] holds drivers
//! bound to one target; a [`Catalog`] holds the registrations they are built
//! from. Both support the same pure views (`for_driver`, `using`,
//! `supports`, `prefer_driver`, `prefer_protocol`), which never mutate the
//! source and return an empty collection when nothing matches.
//!
//! # Example
//!
//! ```
//! use bmcmux_bmc::{mock::MockBmc, Feature};
//! use bmcmux_registry::{Driver, Registry};
//! use std::sync::Arc;
//!
//! let a = Arc::new(MockBmc::new("a"));
//! let b = Arc::new(MockBmc::new("b"));
//! let c = Arc::new(MockBmc::new("c"));
//! let registry: Registry = vec![
//!     Driver::from_capabilities("A", "web", a.capabilities()),
//!     Driver::from_capabilities("B", "ipmi", b.capabilities()),
//!     Driver::from_capabilities("C", "web", c.capabilities()),
//! ]
//! .into();
//!
//! assert_eq!(registry.prefer_protocol(&["web"]).names(), vec!["A", "C", "B"]);
//! assert!(registry.supports(&[Feature::PowerSet]).len() == 3);
//! ```

pub mod catalog;
pub mod collection;
pub mod driver;
pub mod error;

pub use catalog::{global, register_global, Catalog, InitFn, Registration};
pub use collection::{Collection, Entry};
pub use driver::{Driver, Registry};
pub use error::{RegistryError, Result};
