//! Instantiated drivers

use bmcmux_bmc::{Capabilities, Features};

use crate::collection::{Collection, Entry};

/// A named, protocol-tagged driver and the capabilities it resolved to
///
/// Immutable once built; filtering produces new collections of clones, which
/// share the underlying implementations.
#[derive(Debug, Clone)]
pub struct Driver {
    name: String,
    protocol: String,
    features: Features,
    capabilities: Capabilities,
}

impl Driver {
    /// Create a driver with an explicitly declared feature set
    ///
    /// Keeping `features` consistent with `capabilities` is the caller's job;
    /// [`Driver::from_capabilities`] derives it instead.
    pub fn new(
        name: impl Into<String>,
        protocol: impl Into<String>,
        features: Features,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            name: name.into(),
            protocol: protocol.into(),
            features,
            capabilities,
        }
    }

    /// Create a driver advertising exactly what `capabilities` backs
    pub fn from_capabilities(
        name: impl Into<String>,
        protocol: impl Into<String>,
        capabilities: Capabilities,
    ) -> Self {
        let features = capabilities.features();
        Self::new(name, protocol, features, capabilities)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

impl Entry for Driver {
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

/// Ordered drivers; order is attempt order
pub type Registry = Collection<Driver>;
