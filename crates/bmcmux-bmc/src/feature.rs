//! Capability feature tags
//!
//! A driver advertises the operations it implements as a set of [`Feature`]s.
//! Registries filter on these tags; the orchestrator uses the capability
//! descriptor itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::BmcError;

/// A tag declaring that a driver implements one capability interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Feature {
    PowerState,
    PowerSet,
    BootDeviceSet,
    UserCreate,
    UserUpdate,
    UserDelete,
    UserRead,
    BmcReset,
    VirtualMedia,
    FirmwareInstall,
    FirmwareInstallStatus,
    FirmwareUpload,
    FirmwareUploadInitiateInstall,
    FirmwareInstallUploaded,
    FirmwareTaskStatus,
    FirmwareInstallSteps,
    Screenshot,
    GetSystemEventLog,
    ClearSystemEventLog,
    InventoryRead,
    SensorRead,
}

impl Feature {
    pub const ALL: [Feature; 21] = [
        Feature::PowerState,
        Feature::PowerSet,
        Feature::BootDeviceSet,
        Feature::UserCreate,
        Feature::UserUpdate,
        Feature::UserDelete,
        Feature::UserRead,
        Feature::BmcReset,
        Feature::VirtualMedia,
        Feature::FirmwareInstall,
        Feature::FirmwareInstallStatus,
        Feature::FirmwareUpload,
        Feature::FirmwareUploadInitiateInstall,
        Feature::FirmwareInstallUploaded,
        Feature::FirmwareTaskStatus,
        Feature::FirmwareInstallSteps,
        Feature::Screenshot,
        Feature::GetSystemEventLog,
        Feature::ClearSystemEventLog,
        Feature::InventoryRead,
        Feature::SensorRead,
    ];

    /// Wire name of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::PowerState => "powerstate",
            Feature::PowerSet => "powerset",
            Feature::BootDeviceSet => "bootdeviceset",
            Feature::UserCreate => "usercreate",
            Feature::UserUpdate => "userupdate",
            Feature::UserDelete => "userdelete",
            Feature::UserRead => "userread",
            Feature::BmcReset => "bmcreset",
            Feature::VirtualMedia => "virtualmedia",
            Feature::FirmwareInstall => "firmwareinstall",
            Feature::FirmwareInstallStatus => "firmwareinstallstatus",
            Feature::FirmwareUpload => "firmwareupload",
            Feature::FirmwareUploadInitiateInstall => "firmwareuploadinitiateinstall",
            Feature::FirmwareInstallUploaded => "firmwareinstalluploaded",
            Feature::FirmwareTaskStatus => "firmwaretaskstatus",
            Feature::FirmwareInstallSteps => "firmwareinstallsteps",
            Feature::Screenshot => "screenshot",
            Feature::GetSystemEventLog => "getsystemeventlog",
            Feature::ClearSystemEventLog => "clearsystemeventlog",
            Feature::InventoryRead => "inventoryread",
            Feature::SensorRead => "sensorread",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = BmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| BmcError::InvalidConfig(format!("unknown feature: {}", s)))
    }
}

impl From<Feature> for String {
    fn from(feature: Feature) -> Self {
        feature.as_str().to_string()
    }
}

impl TryFrom<String> for Feature {
    type Error = BmcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The set of features a driver advertises
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Features(BTreeSet<Feature>);

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: Feature) -> bool {
        self.0.insert(feature)
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.0.contains(&feature)
    }

    /// True only if every requested feature is present.
    pub fn includes(&self, wanted: &[Feature]) -> bool {
        wanted.iter().all(|f| self.0.contains(f))
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Feature> for Features {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Feature; N]> for Features {
    fn from(features: [Feature; N]) -> Self {
        features.into_iter().collect()
    }
}

impl std::fmt::Display for Features {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Feature::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_names_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(feature.as_str().parse::<Feature>().unwrap(), feature);
        }
    }

    #[test]
    fn test_unknown_feature() {
        assert!("teleport".parse::<Feature>().is_err());
    }

    #[test]
    fn test_includes_is_conjunction() {
        let features = Features::from([Feature::PowerState, Feature::PowerSet]);

        assert!(features.includes(&[Feature::PowerState]));
        assert!(features.includes(&[Feature::PowerState, Feature::PowerSet]));
        assert!(!features.includes(&[Feature::PowerState, Feature::BootDeviceSet]));
        assert!(features.includes(&[]));
    }

    #[test]
    fn test_features_serde() {
        let features = Features::from([Feature::UserRead, Feature::BmcReset]);
        let json = serde_json::to_string(&features).unwrap();
        assert_eq!(json, r#"["userread","bmcreset"]"#);

        let back: Features = serde_json::from_str(&json).unwrap();
        assert_eq!(back, features);
    }

    #[test]
    fn test_features_display() {
        let features = Features::from([Feature::PowerSet, Feature::PowerState]);
        assert_eq!(features.to_string(), "[powerstate, powerset]");
    }
}
