//! First-success-wins provider dispatch
//!
//! [`dispatch`] walks a registry in order, skips drivers that lack the
//! requested capability and calls the rest one at a time until one succeeds.
//! Every attempt runs under a sub-context bounded by an even share of the
//! caller's remaining time. A driver that answers `Ok(false)` is counted as a
//! failure.

use bmcmux_bmc::{BmcError, Capabilities, Feature};
use bmcmux_registry::{Entry, Registry};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::error::{ClientError, ProviderError, ProviderErrors, ProviderFailure, Result};
use crate::metadata::Metadata;
use crate::timeout::allocate_timeout;

/// Outcome of one dispatched call together with its metadata
#[derive(Debug)]
pub struct Dispatched<T> {
    pub result: Result<T>,
    pub metadata: Metadata,
}

impl<T> Dispatched<T> {
    fn new(result: Result<T>, metadata: Metadata) -> Self {
        Self { result, metadata }
    }

    pub fn into_result(self) -> Result<T> {
        self.result
    }
}

/// Turn a driver's boolean verdict into a result
pub(crate) fn accepted(verdict: bmcmux_bmc::Result<bool>, operation: &str) -> bmcmux_bmc::Result<()> {
    match verdict {
        Ok(true) => Ok(()),
        Ok(false) => Err(BmcError::CommandFailed(format!(
            "{} reported unsuccessful",
            operation
        ))),
        Err(e) => Err(e),
    }
}

/// Run `invoke` against each driver that `select` finds a capability on
///
/// `default_timeout` applies when the context carries no per-provider
/// override; without either, the context's remaining time is split across
/// the eligible drivers.
pub async fn dispatch<C, T, S, F, Fut>(
    ctx: &CallContext,
    registry: &Registry,
    feature: Feature,
    default_timeout: Option<Duration>,
    select: S,
    invoke: F,
) -> Dispatched<T>
where
    C: ?Sized,
    S: Fn(&Capabilities) -> Option<&Arc<C>>,
    F: Fn(Arc<C>) -> Fut,
    Fut: Future<Output = bmcmux_bmc::Result<T>>,
{
    let mut metadata = Metadata::new();
    let mut failures = ProviderErrors::new();

    if let Some(source) = ctx.err() {
        return Dispatched::new(Err(ClientError::Context { source, failures }), metadata);
    }

    let eligible: Vec<(&str, Arc<C>)> = registry
        .iter()
        .filter_map(|driver| {
            select(driver.capabilities()).map(|capability| (driver.name(), capability.clone()))
        })
        .collect();

    if eligible.is_empty() {
        debug!(feature = %feature, "No driver implements feature");
        return Dispatched::new(Err(ClientError::NotImplemented { feature }), metadata);
    }

    let explicit = ctx.per_provider_timeout().or(default_timeout);
    let per_attempt = allocate_timeout(ctx, eligible.len(), explicit);

    for (provider, capability) in eligible {
        metadata.record_attempt(provider);
        debug!(
            provider = %provider,
            feature = %feature,
            timeout_ms = per_attempt.as_millis() as u64,
            "Attempting provider"
        );

        let attempt = ctx.sub_context(per_attempt);
        match attempt.run(invoke(capability)).await {
            Ok(Ok(value)) => {
                debug!(provider = %provider, feature = %feature, "Provider succeeded");
                metadata.record_success(provider);
                return Dispatched::new(Ok(value), metadata);
            }
            Ok(Err(e)) => {
                warn!(provider = %provider, feature = %feature, error = %e, "Provider failed");
                metadata.record_failure(provider, &e);
                failures.push(ProviderError::new(provider, e));
            }
            Err(_) => {
                if let Some(source) = ctx.err() {
                    warn!(provider = %provider, feature = %feature, error = %source, "Call ended");
                    metadata.record_failure(provider, source);
                    return Dispatched::new(Err(ClientError::Context { source, failures }), metadata);
                }
                let cause = ProviderFailure::TimedOut(per_attempt);
                warn!(provider = %provider, feature = %feature, error = %cause, "Provider failed");
                metadata.record_failure(provider, &cause);
                failures.push(ProviderError::new(provider, cause));
            }
        }
    }

    Dispatched::new(
        Err(ClientError::Exhausted {
            operation: feature.to_string(),
            failures,
        }),
        metadata,
    )
}
