//! Error types for orchestrated calls

use bmcmux_bmc::{BmcError, Feature, FirmwareInstallStep, FirmwareTaskState};
use bmcmux_registry::RegistryError;
use std::time::Duration;
use thiserror::Error;

use crate::context::ContextError;

/// Why one provider attempt failed
#[derive(Debug, Error)]
pub enum ProviderFailure {
    #[error(transparent)]
    Driver(#[from] BmcError),

    #[error("attempt timed out after {0:?}")]
    TimedOut(Duration),

    #[error("attempt canceled")]
    Canceled,
}

/// One provider's failure, tagged with its name
#[derive(Debug, Error)]
#[error("provider {provider}: {cause}")]
pub struct ProviderError {
    pub provider: String,
    #[source]
    pub cause: ProviderFailure,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, cause: impl Into<ProviderFailure>) -> Self {
        Self {
            provider: provider.into(),
            cause: cause.into(),
        }
    }
}

/// Every provider failure of one call, in attempt order
#[derive(Debug, Default)]
pub struct ProviderErrors(Vec<ProviderError>);

impl ProviderErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ProviderError) {
        self.0.push(error);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProviderError> {
        self.0.iter()
    }

    /// Names of the failed providers, in attempt order
    pub fn providers(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.provider.as_str()).collect()
    }
}

impl std::fmt::Display for ProviderErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ProviderErrors {
    type Item = &'a ProviderError;
    type IntoIter = std::slice::Iter<'a, ProviderError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn after(failures: &ProviderErrors) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!(" after {}", failures)
    }
}

/// Error type for client calls
#[derive(Debug, Error)]
pub enum ClientError {
    /// No driver in the current view implements the capability
    #[error("no driver implements {feature}")]
    NotImplemented { feature: Feature },

    /// Every eligible driver was tried and none succeeded
    #[error("no driver succeeded at {operation}: {failures}")]
    Exhausted {
        operation: String,
        failures: ProviderErrors,
    },

    /// Some drivers failed where every driver had to succeed
    #[error("{operation} failed for some drivers: {failures}")]
    Partial {
        operation: String,
        failures: ProviderErrors,
    },

    /// The caller's context ended the call
    #[error("{source}{}", after(.failures))]
    Context {
        #[source]
        source: ContextError,
        failures: ProviderErrors,
    },

    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ClientError {
    /// Provider failures collected before the call gave up
    pub fn failures(&self) -> Option<&ProviderErrors> {
        match self {
            ClientError::Exhausted { failures, .. }
            | ClientError::Partial { failures, .. }
            | ClientError::Context { failures, .. } => Some(failures),
            _ => None,
        }
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, ClientError::NotImplemented { .. })
    }
}

/// Error type for the firmware install state machine
#[derive(Debug, Error)]
pub enum FirmwareError {
    /// The driver could not say how to install this component
    #[error("driver {provider} could not list install steps for {component}: {source}")]
    Steps {
        provider: String,
        component: String,
        #[source]
        source: BmcError,
    },

    /// The driver declared no install steps for this component
    #[error("driver {provider} declares no install steps for {component}")]
    NoSteps { provider: String, component: String },

    /// A declared step needs a capability the driver lacks
    #[error("driver {provider} lacks {feature} required by step {step}")]
    MissingCapability {
        provider: String,
        step: FirmwareInstallStep,
        feature: Feature,
    },

    /// The driver returned an error the machine cannot recover from
    #[error("step {step} failed: {source} (last state {last_state}: {last_status})")]
    Provider {
        step: FirmwareInstallStep,
        #[source]
        source: BmcError,
        last_state: FirmwareTaskState,
        last_status: String,
    },

    /// The BMC reported the task as failed
    #[error("step {step} ended in state {state}: {status}")]
    StepFailed {
        step: FirmwareInstallStep,
        state: FirmwareTaskState,
        status: String,
    },

    /// Host power or BMC reset failed while the install needed it
    #[error("step {step} could not control the host: {source} (last state {last_state}: {last_status})")]
    HostControl {
        step: FirmwareInstallStep,
        #[source]
        source: Box<ClientError>,
        last_state: FirmwareTaskState,
        last_status: String,
    },

    /// The caller's context ended the install mid-step
    #[error("step {step} interrupted: {source} (last state {last_state}: {last_status})")]
    Interrupted {
        step: FirmwareInstallStep,
        #[source]
        source: ContextError,
        last_state: FirmwareTaskState,
        last_status: String,
    },
}

/// Result type for client calls
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn two_failures() -> ProviderErrors {
        let mut failures = ProviderErrors::new();
        failures.push(ProviderError::new(
            "d1",
            BmcError::CommandFailed("boom".to_string()),
        ));
        failures.push(ProviderError::new(
            "d2",
            ProviderFailure::TimedOut(Duration::from_millis(1250)),
        ));
        failures
    }

    #[test]
    fn test_provider_errors_display_names_each_provider() {
        let failures = two_failures();
        assert_eq!(
            failures.to_string(),
            "provider d1: command failed: boom; provider d2: attempt timed out after 1.25s"
        );
        assert_eq!(failures.providers(), vec!["d1", "d2"]);
    }

    #[test]
    fn test_exhausted_display() {
        let err = ClientError::Exhausted {
            operation: Feature::PowerSet.to_string(),
            failures: two_failures(),
        };
        let text = err.to_string();
        assert!(text.starts_with("no driver succeeded at powerset: provider d1"));
        assert_eq!(err.failures().map(ProviderErrors::len), Some(2));
    }

    #[test]
    fn test_context_display() {
        let err = ClientError::Context {
            source: ContextError::DeadlineExceeded,
            failures: ProviderErrors::new(),
        };
        assert_eq!(err.to_string(), "deadline exceeded");

        let err = ClientError::Context {
            source: ContextError::Canceled,
            failures: two_failures(),
        };
        assert!(err.to_string().starts_with("call canceled after provider d1"));
    }

    #[test]
    fn test_not_implemented() {
        let err = ClientError::NotImplemented {
            feature: Feature::Screenshot,
        };
        assert!(err.is_not_implemented());
        assert!(err.failures().is_none());
    }
}
