//! Error types for driver registration

use bmcmux_bmc::{BmcError, Feature};
use thiserror::Error;

/// Error type for catalog registration and driver instantiation
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A driver with this name is already registered
    #[error("driver already registered: {0}")]
    Duplicate(String),

    /// The driver declares a feature its capabilities do not back
    #[error("driver {driver} declares {feature} but does not implement it")]
    MissingCapability { driver: String, feature: Feature },

    /// The driver's init function declined the target
    #[error("driver {driver} failed to initialize: {source}")]
    Init {
        driver: String,
        #[source]
        source: BmcError,
    },
}

impl RegistryError {
    /// Name of the driver this error concerns
    pub fn driver(&self) -> &str {
        match self {
            RegistryError::Duplicate(name) => name,
            RegistryError::MissingCapability { driver, .. } => driver,
            RegistryError::Init { driver, .. } => driver,
        }
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RegistryError::Duplicate("ipmitool".to_string());
        assert_eq!(err.to_string(), "driver already registered: ipmitool");

        let err = RegistryError::MissingCapability {
            driver: "redfish".to_string(),
            feature: Feature::BmcReset,
        };
        assert_eq!(
            err.to_string(),
            "driver redfish declares bmcreset but does not implement it"
        );

        let err = RegistryError::Init {
            driver: "rpc".to_string(),
            source: BmcError::InvalidConfig("no consumer".to_string()),
        };
        assert_eq!(err.driver(), "rpc");
        assert!(err.to_string().contains("no consumer"));
    }
}
