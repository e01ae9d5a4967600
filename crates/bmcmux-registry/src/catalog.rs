//! Driver registrations and the process-wide catalog
//!
//! A [`Registration`] is a driver before it meets a target: a name, a
//! protocol, the features it promises and the init function that builds its
//! capabilities. [`Catalog::instantiate`] turns every registration into a
//! [`Driver`] for one [`BmcTarget`].

use bmcmux_bmc::{BmcTarget, Capabilities, Features};
use once_cell::sync::Lazy;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::collection::{Collection, Entry};
use crate::driver::{Driver, Registry};
use crate::error::{RegistryError, Result};

/// Builds a driver's capabilities for one target
pub type InitFn = Arc<dyn Fn(&BmcTarget) -> bmcmux_bmc::Result<Capabilities> + Send + Sync>;

/// A registered driver, not yet bound to a target
#[derive(Clone)]
pub struct Registration {
    name: String,
    protocol: String,
    features: Features,
    init: InitFn,
}

impl Registration {
    pub fn new(
        name: impl Into<String>,
        protocol: impl Into<String>,
        features: Features,
        init: InitFn,
    ) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
            features,
            init,
        }
    }

    /// Run the init function and check the result against the declared features
    pub fn instantiate(&self, target: &BmcTarget) -> Result<Driver> {
        let capabilities = (self.init)(target).map_err(|source| RegistryError::Init {
            driver: self.name.clone(),
            source,
        })?;

        if let Some(feature) = self.features.iter().find(|f| !capabilities.supports(*f)) {
            return Err(RegistryError::MissingCapability {
                driver: self.name.clone(),
                feature,
            });
        }

        Ok(Driver::new(
            self.name.clone(),
            self.protocol.clone(),
            self.features.clone(),
            capabilities,
        ))
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("features", &self.features)
            .finish()
    }
}

impl Entry for Registration {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> &str {
        &self.protocol
    }

    fn features(&self) -> &Features {
        &self.features
    }
}

/// Ordered driver registrations
pub type Catalog = Collection<Registration>;

impl Collection<Registration> {
    /// Append a registration; names must be unique.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        protocol: impl Into<String>,
        features: impl Into<Features>,
        init: F,
    ) -> Result<()>
    where
        F: Fn(&BmcTarget) -> bmcmux_bmc::Result<Capabilities> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.contains(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.push(Registration::new(name, protocol, features.into(), Arc::new(init)));
        Ok(())
    }

    /// Bind every registration to `target`, in order
    ///
    /// Drivers that fail to initialize are left out and reported alongside
    /// the registry.
    pub fn instantiate(&self, target: &BmcTarget) -> (Registry, Vec<RegistryError>) {
        let mut registry = Registry::new();
        let mut failures = Vec::new();

        for registration in self {
            match registration.instantiate(target) {
                Ok(driver) => {
                    debug!(driver = %registration.name(), host = %target.host, "Driver initialized");
                    registry.push(driver);
                }
                Err(e) => {
                    warn!(driver = %registration.name(), error = %e, "Driver left out");
                    failures.push(e);
                }
            }
        }

        (registry, failures)
    }
}

static GLOBAL: Lazy<RwLock<Catalog>> = Lazy::new(|| RwLock::new(Catalog::new()));

/// Snapshot of the process-wide catalog
pub fn global() -> Catalog {
    GLOBAL
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Append a registration to the process-wide catalog
pub fn register_global<F>(
    name: impl Into<String>,
    protocol: impl Into<String>,
    features: impl Into<Features>,
    init: F,
) -> Result<()>
where
    F: Fn(&BmcTarget) -> bmcmux_bmc::Result<Capabilities> + Send + Sync + 'static,
{
    GLOBAL
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .register(name, protocol, features, init)
}
