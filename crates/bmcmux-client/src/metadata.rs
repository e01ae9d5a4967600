//! Per-call provider metadata

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which providers a call tried and how each fared
///
/// Every call starts from an empty record; nothing carries over between calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Providers tried, in attempt order
    pub providers_attempted: Vec<String>,
    /// The provider whose answer was returned
    pub successful_provider: Option<String>,
    /// Providers whose connection opened
    pub successful_open_conns: Vec<String>,
    /// Providers whose connection closed cleanly
    pub successful_close_conns: Vec<String>,
    /// Failure text per provider
    pub failed_provider_detail: BTreeMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&mut self, provider: &str) {
        self.providers_attempted.push(provider.to_string());
    }

    pub fn record_success(&mut self, provider: &str) {
        self.successful_provider = Some(provider.to_string());
    }

    pub fn record_failure(&mut self, provider: &str, detail: impl std::fmt::Display) {
        self.failed_provider_detail
            .insert(provider.to_string(), detail.to_string());
    }
}
