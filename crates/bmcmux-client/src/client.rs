//! The multi-provider client
//!
//! A [`Client`] wraps an ordered [`Registry`] view. Filtering returns a new
//! client over a narrower or reordered view; clients derived from one another
//! share the slot that holds the most recent call's [`Metadata`].

use bmcmux_bmc::{BmcTarget, Feature};
use bmcmux_registry::{Driver, Entry, Registry, RegistryError};
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::builtin;
use crate::config::ClientConfig;
use crate::context::{CallContext, ContextError};
use crate::dispatch::Dispatched;
use crate::error::{ClientError, ProviderError, ProviderErrors, ProviderFailure, Result};
use crate::metadata::Metadata;
use crate::timeout::allocate_timeout;

/// Orchestrates calls across the drivers of one BMC
#[derive(Debug, Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    registry: Registry,
    metadata: Arc<Mutex<Metadata>>,
}

fn lock(slot: &Mutex<Metadata>) -> MutexGuard<'_, Metadata> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Collapse one lifecycle attempt into a provider failure
fn settle(
    outcome: std::result::Result<bmcmux_bmc::Result<()>, ContextError>,
    timeout: Duration,
) -> std::result::Result<(), ProviderFailure> {
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ProviderFailure::Driver(e)),
        Err(ContextError::Canceled) => Err(ProviderFailure::Canceled),
        Err(ContextError::DeadlineExceeded) => Err(ProviderFailure::TimedOut(timeout)),
    }
}

impl Client {
    /// Create a client over `registry` with default settings
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, ClientConfig::default())
    }

    pub fn with_config(registry: Registry, config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            metadata: Arc::new(Mutex::new(Metadata::new())),
        }
    }

    /// Build a client for `target` from the built-in drivers plus anything
    /// registered in the process-wide catalog
    ///
    /// Drivers that decline the target are left out and returned alongside
    /// the client.
    pub fn from_target(target: &BmcTarget, config: ClientConfig) -> (Self, Vec<RegistryError>) {
        builtin::register_builtin_drivers();
        let (registry, skipped) = bmcmux_registry::global().instantiate(target);
        info!(
            host = %target.host,
            drivers = ?registry.names(),
            skipped = skipped.len(),
            "Client ready"
        );
        (Self::with_config(registry, config), skipped)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Metadata of the most recent call made through this client or a view
    /// sharing its slot
    pub fn metadata(&self) -> Metadata {
        lock(&self.metadata).clone()
    }

    pub(crate) fn record(&self, metadata: Metadata) {
        *lock(&self.metadata) = metadata;
    }

    /// Store a dispatch's metadata and hand back its result
    pub(crate) fn finish<T>(&self, dispatched: Dispatched<T>) -> Result<T> {
        self.record(dispatched.metadata);
        dispatched.result
    }

    pub(crate) fn default_timeout(&self) -> Option<Duration> {
        self.config.per_provider_timeout
    }

    fn view(&self, registry: Registry) -> Self {
        Self {
            config: self.config.clone(),
            registry,
            metadata: self.metadata.clone(),
        }
    }

    /// A view with its own metadata slot
    pub(crate) fn detached(&self, registry: Registry) -> Self {
        Self {
            config: self.config.clone(),
            registry,
            metadata: Arc::new(Mutex::new(Metadata::new())),
        }
    }

    /// Only the driver named `name`
    pub fn for_driver(&self, name: &str) -> Self {
        self.view(self.registry.for_driver(name))
    }

    /// Only drivers speaking `protocol`
    pub fn using(&self, protocol: &str) -> Self {
        self.view(self.registry.using(protocol))
    }

    /// Only drivers advertising every one of `features`
    pub fn supports(&self, features: &[Feature]) -> Self {
        self.view(self.registry.supports(features))
    }

    /// The driver named `name` first, the rest in order
    pub fn prefer_driver(&self, name: &str) -> Self {
        self.view(self.registry.prefer_driver(name))
    }

    /// Drivers speaking any of `protocols` first, grouped in argument order
    pub fn prefer_protocol(&self, protocols: &[&str]) -> Self {
        self.view(self.registry.prefer_protocol(protocols))
    }

    fn lifecycle_timeout(&self, ctx: &CallContext) -> Duration {
        allocate_timeout(
            ctx,
            1,
            ctx.per_provider_timeout().or(self.config.per_provider_timeout),
        )
    }

    /// Open every driver's session concurrently and keep the ones that opened
    pub async fn open(&mut self, ctx: &CallContext) -> Result<()> {
        let mut metadata = Metadata::new();
        if self.registry.is_empty() {
            self.record(metadata);
            return Ok(());
        }

        let timeout = self.lifecycle_timeout(ctx);
        let attempts = self.registry.iter().map(|driver| {
            let attempt = ctx.sub_context(timeout);
            async move {
                let outcome = match driver.capabilities().connection() {
                    Some(connection) => attempt.run(connection.open()).await,
                    None => Ok(Ok(())),
                };
                (driver, settle(outcome, timeout))
            }
        });
        let outcomes = join_all(attempts).await;

        let mut opened = Registry::new();
        let mut failures = ProviderErrors::new();
        for (driver, outcome) in outcomes {
            metadata.record_attempt(driver.name());
            match outcome {
                Ok(()) => {
                    debug!(provider = %driver.name(), "Connection opened");
                    metadata.successful_open_conns.push(driver.name().to_string());
                    opened.push(driver.clone());
                }
                Err(cause) => {
                    warn!(provider = %driver.name(), error = %cause, "Connection failed to open");
                    metadata.record_failure(driver.name(), &cause);
                    failures.push(ProviderError::new(driver.name(), cause));
                }
            }
        }
        self.record(metadata);

        if opened.is_empty() {
            if let Some(source) = ctx.err() {
                return Err(ClientError::Context { source, failures });
            }
            return Err(ClientError::Exhausted {
                operation: "open".to_string(),
                failures,
            });
        }

        self.registry = opened;
        Ok(())
    }

    /// Close every driver's session concurrently
    pub async fn close(&self, ctx: &CallContext) -> Result<()> {
        let mut metadata = Metadata::new();
        let timeout = self.lifecycle_timeout(ctx);
        let attempts = self.registry.iter().map(|driver| {
            let attempt = ctx.sub_context(timeout);
            async move {
                let outcome = match driver.capabilities().connection() {
                    Some(connection) => attempt.run(connection.close()).await,
                    None => Ok(Ok(())),
                };
                (driver, settle(outcome, timeout))
            }
        });

        let mut failures = ProviderErrors::new();
        for (driver, outcome) in join_all(attempts).await {
            metadata.record_attempt(driver.name());
            match outcome {
                Ok(()) => metadata.successful_close_conns.push(driver.name().to_string()),
                Err(cause) => {
                    warn!(provider = %driver.name(), error = %cause, "Connection failed to close");
                    metadata.record_failure(driver.name(), &cause);
                    failures.push(ProviderError::new(driver.name(), cause));
                }
            }
        }
        self.record(metadata);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Partial {
                operation: "close".to_string(),
                failures,
            })
        }
    }

    /// Probe every driver concurrently and keep the compatible ones in order
    pub async fn filter_for_compatible(&mut self, ctx: &CallContext) {
        let timeout = self.lifecycle_timeout(ctx);
        let probes = self.registry.iter().map(|driver| {
            let attempt = ctx.sub_context(timeout);
            async move {
                let compatible = match driver.capabilities().connection() {
                    Some(connection) => attempt.run(connection.compatible()).await.unwrap_or(false),
                    None => true,
                };
                (driver, compatible)
            }
        });

        let kept: Vec<Driver> = join_all(probes)
            .await
            .into_iter()
            .filter_map(|(driver, compatible)| {
                if !compatible {
                    debug!(provider = %driver.name(), "Driver not compatible, dropping");
                }
                compatible.then(|| driver.clone())
            })
            .collect();
        self.registry = kept.into();
    }
}
