//! Firmware install state machine
//!
//! The driver chosen for an install declares the ordered steps it needs for
//! a component. The machine runs them in order, polls task state where a
//! step calls for it, and recovers from the errors a BMC produces while it
//! reboots itself: transient errors back off and retry, an expired session
//! is re-opened. `reset-bmc-on-failure` is never run in sequence; it only
//! fires once another step has failed.

use bmcmux_bmc::{
    normalize_task_id, BmcError, BmcResetType, Capabilities, Feature, FirmwareInstallStep,
    FirmwareTaskKind, FirmwareTaskState, OperationApplyTime, PowerAction, NO_TASK_ID,
};
use bmcmux_registry::Entry;
use bytes::Bytes;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::client::Client;
use crate::config::FirmwarePollConfig;
use crate::context::{CallContext, ContextError};
use crate::error::{ClientError, FirmwareError, ProviderErrors, Result};
use crate::metadata::Metadata;

/// An image to install and how to install it
#[derive(Debug, Clone)]
pub struct FirmwareJob {
    pub component: String,
    pub image: Bytes,
    /// Version the image carries; some BMCs key task status on it
    pub install_version: String,
    pub apply_time: OperationApplyTime,
    pub force: bool,
}

impl FirmwareJob {
    pub fn new(component: impl Into<String>, image: impl Into<Bytes>) -> Self {
        Self {
            component: component.into(),
            image: image.into(),
            install_version: String::new(),
            apply_time: OperationApplyTime::default(),
            force: false,
        }
    }

    pub fn with_install_version(mut self, version: impl Into<String>) -> Self {
        self.install_version = version.into();
        self
    }

    pub fn with_apply_time(mut self, apply_time: OperationApplyTime) -> Self {
        self.apply_time = apply_time;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// What a completed install did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FirmwareReport {
    pub provider: String,
    /// Steps that ran to completion, in order
    pub steps_executed: Vec<FirmwareInstallStep>,
    pub upload_task_id: Option<String>,
    pub install_task_id: Option<String>,
    /// Last polled task state
    pub final_state: Option<FirmwareTaskState>,
    /// Last polled status text
    pub final_status: String,
    /// Number of task status polls across all steps
    pub polls: u32,
}

impl FirmwareReport {
    fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            steps_executed: Vec::new(),
            upload_task_id: None,
            install_task_id: None,
            final_state: None,
            final_status: String::new(),
            polls: 0,
        }
    }
}

struct Installer<'a> {
    provider: &'a str,
    capabilities: &'a Capabilities,
    /// Host power and BMC reset, tried on the installing driver first
    host: Client,
    pacing: &'a FirmwarePollConfig,
    job: &'a FirmwareJob,
}

impl Installer<'_> {
    async fn run(&self, ctx: &CallContext) -> Result<FirmwareReport> {
        let component = self.job.component.as_str();
        let getter = self.capabilities.firmware_install_steps().ok_or(
            ClientError::NotImplemented {
                feature: Feature::FirmwareInstallSteps,
            },
        )?;

        let steps = match ctx.run(getter.firmware_install_steps(component)).await {
            Ok(Ok(steps)) => steps,
            Ok(Err(source)) => {
                return Err(FirmwareError::Steps {
                    provider: self.provider.to_string(),
                    component: component.to_string(),
                    source,
                }
                .into())
            }
            Err(source) => {
                return Err(ClientError::Context {
                    source,
                    failures: ProviderErrors::new(),
                })
            }
        };

        if steps.is_empty() {
            return Err(FirmwareError::NoSteps {
                provider: self.provider.to_string(),
                component: component.to_string(),
            }
            .into());
        }

        info!(
            provider = %self.provider,
            component = %component,
            steps = ?steps,
            "Starting firmware install"
        );

        let reset_on_failure = steps.contains(&FirmwareInstallStep::ResetBmcOnFailure);
        let mut report = FirmwareReport::new(self.provider);

        for step in steps
            .into_iter()
            .filter(|s| *s != FirmwareInstallStep::ResetBmcOnFailure)
        {
            info!(provider = %self.provider, step = %step, "Running firmware install step");
            if let Err(e) = self.step(ctx, step, &mut report).await {
                error!(provider = %self.provider, step = %step, error = %e, "Firmware install step failed");
                if reset_on_failure {
                    self.reset_after_failure(ctx).await;
                }
                return Err(e.into());
            }
            report.steps_executed.push(step);
        }

        info!(
            provider = %self.provider,
            component = %component,
            polls = report.polls,
            "Firmware install complete"
        );
        Ok(report)
    }

    async fn reset_after_failure(&self, ctx: &CallContext) {
        if ctx.is_done() {
            warn!(provider = %self.provider, "Skipping BMC reset after failure, call already ended");
            return;
        }
        info!(provider = %self.provider, "Resetting BMC after failed install");
        if let Err(e) = self.host.bmc_reset(ctx, BmcResetType::Warm).await {
            warn!(provider = %self.provider, error = %e, "BMC reset after failure did not succeed");
        }
    }

    fn require<'c, C: ?Sized>(
        &self,
        step: FirmwareInstallStep,
        capability: Option<&'c Arc<C>>,
        feature: Feature,
    ) -> std::result::Result<&'c Arc<C>, FirmwareError> {
        capability.ok_or_else(|| FirmwareError::MissingCapability {
            provider: self.provider.to_string(),
            step,
            feature,
        })
    }

    fn interrupted(
        &self,
        step: FirmwareInstallStep,
        source: ContextError,
        report: &FirmwareReport,
    ) -> FirmwareError {
        FirmwareError::Interrupted {
            step,
            source,
            last_state: last_state(report),
            last_status: report.final_status.clone(),
        }
    }

    fn failed(&self, step: FirmwareInstallStep, source: BmcError, report: &FirmwareReport) -> FirmwareError {
        FirmwareError::Provider {
            step,
            source,
            last_state: last_state(report),
            last_status: report.final_status.clone(),
        }
    }

    fn host_failed(&self, step: FirmwareInstallStep, source: ClientError, report: &FirmwareReport) -> FirmwareError {
        FirmwareError::HostControl {
            step,
            source: Box::new(source),
            last_state: last_state(report),
            last_status: report.final_status.clone(),
        }
    }

    /// Run one driver call under the caller's context
    async fn call<T>(
        &self,
        ctx: &CallContext,
        step: FirmwareInstallStep,
        report: &FirmwareReport,
        fut: impl Future<Output = bmcmux_bmc::Result<T>>,
    ) -> std::result::Result<T, FirmwareError> {
        match ctx.run(fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(self.failed(step, source, report)),
            Err(source) => Err(self.interrupted(step, source, report)),
        }
    }

    async fn step(
        &self,
        ctx: &CallContext,
        step: FirmwareInstallStep,
        report: &mut FirmwareReport,
    ) -> std::result::Result<(), FirmwareError> {
        let job = self.job;
        let caps = self.capabilities;

        match step {
            FirmwareInstallStep::Upload => {
                let cap = self.require(step, caps.firmware_upload(), Feature::FirmwareUpload)?;
                let id = self
                    .call(ctx, step, report, cap.firmware_upload(&job.component, job.image.clone()))
                    .await?;
                report.upload_task_id = Some(normalize_task_id(id));
            }
            FirmwareInstallStep::UploadAndInitiateInstall => {
                let cap = self.require(
                    step,
                    caps.firmware_upload_initiate(),
                    Feature::FirmwareUploadInitiateInstall,
                )?;
                let id = self
                    .call(
                        ctx,
                        step,
                        report,
                        cap.firmware_upload_and_initiate(&job.component, job.image.clone()),
                    )
                    .await?;
                report.install_task_id = Some(normalize_task_id(id));
            }
            FirmwareInstallStep::Install => {
                let cap = self.require(step, caps.firmware_install(), Feature::FirmwareInstall)?;
                let id = self
                    .call(
                        ctx,
                        step,
                        report,
                        cap.firmware_install(&job.component, job.apply_time, job.force, job.image.clone()),
                    )
                    .await?;
                report.install_task_id = Some(normalize_task_id(id));
            }
            FirmwareInstallStep::InstallFromUploaded => {
                let cap = self.require(
                    step,
                    caps.firmware_install_uploaded(),
                    Feature::FirmwareInstallUploaded,
                )?;
                let upload_id = report
                    .upload_task_id
                    .clone()
                    .unwrap_or_else(|| NO_TASK_ID.to_string());
                let id = self
                    .call(
                        ctx,
                        step,
                        report,
                        cap.firmware_install_uploaded(&job.component, &upload_id),
                    )
                    .await?;
                report.install_task_id = Some(normalize_task_id(id));
            }
            FirmwareInstallStep::UploadStatus => {
                let task_id = report
                    .upload_task_id
                    .clone()
                    .unwrap_or_else(|| NO_TASK_ID.to_string());
                self.poll(ctx, step, FirmwareTaskKind::Upload, &task_id, report)
                    .await?;
            }
            FirmwareInstallStep::InstallStatus => {
                let task_id = report
                    .install_task_id
                    .clone()
                    .or_else(|| report.upload_task_id.clone())
                    .unwrap_or_else(|| NO_TASK_ID.to_string());
                self.poll(ctx, step, FirmwareTaskKind::Install, &task_id, report)
                    .await?;
            }
            FirmwareInstallStep::PowerOffHost => {
                self.host
                    .power_set(ctx, PowerAction::Off)
                    .await
                    .map_err(|e| self.host_failed(step, e, report))?;
            }
            FirmwareInstallStep::ResetBmcPostInstall => {
                self.host
                    .bmc_reset(ctx, BmcResetType::Warm)
                    .await
                    .map_err(|e| self.host_failed(step, e, report))?;
            }
            FirmwareInstallStep::ResetBmcOnFailure => {}
        }
        Ok(())
    }

    /// Poll one task until it reaches a terminal state
    async fn poll(
        &self,
        ctx: &CallContext,
        step: FirmwareInstallStep,
        kind: FirmwareTaskKind,
        task_id: &str,
        report: &mut FirmwareReport,
    ) -> std::result::Result<(), FirmwareError> {
        let job = self.job;
        let verifier = self.require(
            step,
            self.capabilities.firmware_task_status(),
            Feature::FirmwareTaskStatus,
        )?;

        // Set while the poll follows a successful re-open
        let mut fresh_session = false;

        loop {
            report.polls += 1;
            let polled = match ctx
                .run(verifier.firmware_task_status(kind, &job.component, task_id, &job.install_version))
                .await
            {
                Ok(polled) => polled,
                Err(source) => return Err(self.interrupted(step, source, report)),
            };
            let just_reopened = std::mem::replace(&mut fresh_session, false);

            let wait = match polled {
                Ok(status) => {
                    report.final_state = Some(status.state);
                    report.final_status = status.status.clone();
                    debug!(
                        provider = %self.provider,
                        step = %step,
                        task = %task_id,
                        state = %status.state,
                        status = %status.status,
                        "Polled firmware task"
                    );

                    match status.state {
                        FirmwareTaskState::Complete => return Ok(()),
                        FirmwareTaskState::Failed => {
                            return Err(FirmwareError::StepFailed {
                                step,
                                state: status.state,
                                status: status.status,
                            })
                        }
                        FirmwareTaskState::PowerCycleHost => {
                            info!(provider = %self.provider, step = %step, "Power cycling host to finish install");
                            self.host
                                .power_set(ctx, PowerAction::Cycle)
                                .await
                                .map_err(|e| self.host_failed(step, e, report))?;
                            return Ok(());
                        }
                        FirmwareTaskState::PowerCycleBmc => {
                            info!(provider = %self.provider, step = %step, "Resetting BMC to finish install");
                            self.host
                                .bmc_reset(ctx, BmcResetType::Warm)
                                .await
                                .map_err(|e| self.host_failed(step, e, report))?;
                            return Ok(());
                        }
                        FirmwareTaskState::Unknown => {
                            warn!(
                                provider = %self.provider,
                                step = %step,
                                status = %status.status,
                                "Firmware task in unknown state, polling again"
                            );
                            self.pacing.poll_interval
                        }
                        FirmwareTaskState::Initializing
                        | FirmwareTaskState::Queued
                        | FirmwareTaskState::Running => self.pacing.poll_interval,
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        provider = %self.provider,
                        step = %step,
                        error = %e,
                        backoff = ?self.pacing.transient_backoff,
                        "BMC unreachable, backing off"
                    );
                    self.pacing.transient_backoff
                }
                Err(e) if e.is_session_expired() => {
                    if just_reopened {
                        warn!(provider = %self.provider, step = %step, "Session expired again right after re-open");
                        return Err(self.failed(step, e, report));
                    }
                    info!(provider = %self.provider, step = %step, "Session expired, re-opening");
                    match self.reopen(ctx, step, e, report).await? {
                        Reopened::Yes => {
                            fresh_session = true;
                            self.pacing.poll_interval
                        }
                        Reopened::Later => self.pacing.transient_backoff,
                    }
                }
                Err(source) => return Err(self.failed(step, source, report)),
            };

            if let Err(source) = ctx.sleep(wait).await {
                return Err(self.interrupted(step, source, report));
            }
        }
    }

    async fn reopen(
        &self,
        ctx: &CallContext,
        step: FirmwareInstallStep,
        expired: BmcError,
        report: &FirmwareReport,
    ) -> std::result::Result<Reopened, FirmwareError> {
        let Some(connection) = self.capabilities.connection() else {
            return Err(self.failed(step, expired, report));
        };

        match ctx.run(connection.open()).await {
            Ok(Ok(())) => Ok(Reopened::Yes),
            Ok(Err(e)) if e.is_transient() => {
                warn!(provider = %self.provider, step = %step, error = %e, "Re-open failed, backing off");
                Ok(Reopened::Later)
            }
            Ok(Err(source)) => Err(self.failed(step, source, report)),
            Err(source) => Err(self.interrupted(step, source, report)),
        }
    }
}

fn last_state(report: &FirmwareReport) -> FirmwareTaskState {
    report.final_state.unwrap_or(FirmwareTaskState::Unknown)
}

enum Reopened {
    Yes,
    Later,
}

impl Client {
    /// Install firmware through the first driver in this view that declares
    /// install steps
    ///
    /// Host power changes and BMC resets the install needs go to the same
    /// driver first and fall back to the rest of the view.
    pub async fn install_firmware(&self, ctx: &CallContext, job: &FirmwareJob) -> Result<FirmwareReport> {
        let mut metadata = Metadata::new();
        if let Some(source) = ctx.err() {
            self.record(metadata);
            return Err(ClientError::Context {
                source,
                failures: ProviderErrors::new(),
            });
        }

        let Some(driver) = self
            .registry()
            .iter()
            .find(|d| d.capabilities().firmware_install_steps().is_some())
        else {
            self.record(metadata);
            return Err(ClientError::NotImplemented {
                feature: Feature::FirmwareInstallSteps,
            });
        };

        metadata.record_attempt(driver.name());
        let installer = Installer {
            provider: driver.name(),
            capabilities: driver.capabilities(),
            host: self.detached(self.registry().prefer_driver(driver.name())),
            pacing: &self.config().firmware,
            job,
        };

        let result = installer.run(ctx).await;
        match &result {
            Ok(_) => metadata.record_success(driver.name()),
            Err(e) => metadata.record_failure(driver.name(), e),
        }
        self.record(metadata);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bmcmux_bmc::mock::{MockBehavior, MockBmc};
    use bmcmux_bmc::FirmwareStatus;
    use bmcmux_registry::Driver;
    use std::time::Duration;
    use tokio::time::Instant;

    use bmcmux_bmc::FirmwareInstallStep::*;

    fn status(state: FirmwareTaskState, text: &str) -> bmcmux_bmc::Result<FirmwareStatus> {
        Ok(FirmwareStatus::new(state, text))
    }

    fn client_for(bmc: &Arc<MockBmc>) -> Client {
        Client::new(vec![Driver::from_capabilities("vendor", "mock", bmc.capabilities())].into())
    }

    fn job() -> FirmwareJob {
        FirmwareJob::new("bmc", Bytes::from_static(b"image")).with_install_version("2.1.0")
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_complete() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Upload, InstallStatus])
                .with_task_statuses([
                    status(FirmwareTaskState::Running, "10%"),
                    status(FirmwareTaskState::Running, "60%"),
                    status(FirmwareTaskState::Complete, "done"),
                ]),
        );
        let client = client_for(&bmc);
        let started = Instant::now();

        let report = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap();

        assert_eq!(report.polls, 3);
        assert_eq!(report.steps_executed, vec![Upload, InstallStatus]);
        assert_eq!(report.upload_task_id.as_deref(), Some("upload-task"));
        assert_eq!(report.final_state, Some(FirmwareTaskState::Complete));
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert_eq!(bmc.call_count("firmware_task_status:install:upload-task"), 3);
        assert_eq!(client.metadata().successful_provider.as_deref(), Some("vendor"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_backs_off() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Install, InstallStatus])
                .with_task_statuses([
                    Err(BmcError::ConnectionRefused("rebooting".into())),
                    status(FirmwareTaskState::Running, "applying"),
                    status(FirmwareTaskState::Complete, "done"),
                ]),
        );
        let client = client_for(&bmc);
        let started = Instant::now();

        let report = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap();

        assert_eq!(report.polls, 3);
        assert_eq!(report.install_task_id.as_deref(), Some("install-task"));
        assert_eq!(started.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expiry_reopens() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Install, InstallStatus])
                .with_task_statuses([
                    Err(BmcError::SessionExpired("token gone".into())),
                    status(FirmwareTaskState::Complete, "done"),
                ]),
        );
        let client = client_for(&bmc);

        let report = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap();

        assert_eq!(report.polls, 2);
        assert_eq!(bmc.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_failure_backs_off_and_retries() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Install, InstallStatus])
                .with_open_failures([BmcError::ConnectionRefused("rebooting".into())])
                .with_task_statuses([
                    Err(BmcError::SessionExpired("token gone".into())),
                    Err(BmcError::SessionExpired("token gone".into())),
                    status(FirmwareTaskState::Complete, "done"),
                ]),
        );
        let client = client_for(&bmc);
        let started = Instant::now();

        let report = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap();

        assert_eq!(report.polls, 3);
        assert_eq!(bmc.open_count(), 2);
        // 10s backoff after the refused re-open, one poll interval after the good one
        assert_eq!(started.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_session_expiry_gives_up() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Install, InstallStatus])
                .with_task_statuses(
                    std::iter::repeat_with(|| Err(BmcError::SessionExpired("401".into()))).take(50),
                ),
        );
        let client = client_for(&bmc);
        let started = Instant::now();

        let err = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap_err();

        match err {
            ClientError::Firmware(FirmwareError::Provider { step, source, .. }) => {
                assert_eq!(step, InstallStatus);
                assert!(source.is_session_expired());
            }
            other => panic!("expected provider failure, got {:?}", other),
        }
        assert_eq!(bmc.open_count(), 1);
        assert_eq!(bmc.call_count("firmware_task_status"), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_after_progress_reopens_again() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Install, InstallStatus])
                .with_task_statuses([
                    Err(BmcError::SessionExpired("401".into())),
                    status(FirmwareTaskState::Running, "30%"),
                    Err(BmcError::SessionExpired("401".into())),
                    status(FirmwareTaskState::Complete, "done"),
                ]),
        );
        let client = client_for(&bmc);

        let report = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap();

        assert_eq!(report.polls, 4);
        assert_eq!(bmc.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_powercycle_host_completes_step() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Install, InstallStatus])
                .with_task_statuses([status(FirmwareTaskState::PowerCycleHost, "reboot required")]),
        );
        let client = client_for(&bmc);

        let report = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap();

        assert_eq!(report.final_state, Some(FirmwareTaskState::PowerCycleHost));
        assert_eq!(report.steps_executed, vec![Install, InstallStatus]);
        assert_eq!(bmc.call_count("power_set:cycle"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_powercycle_bmc_resets() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![UploadAndInitiateInstall, InstallStatus])
                .with_task_statuses([status(FirmwareTaskState::PowerCycleBmc, "bmc reset required")]),
        );
        let client = client_for(&bmc);

        client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap();

        assert_eq!(bmc.call_count("bmc_reset:warm"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_triggers_reset_on_failure() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![ResetBmcOnFailure, Upload, UploadStatus])
                .with_task_statuses([status(FirmwareTaskState::Failed, "bad signature")]),
        );
        let client = client_for(&bmc);

        let err = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap_err();

        match err {
            ClientError::Firmware(FirmwareError::StepFailed { step, state, status }) => {
                assert_eq!(step, UploadStatus);
                assert_eq!(state, FirmwareTaskState::Failed);
                assert_eq!(status, "bad signature");
            }
            other => panic!("expected step failure, got {:?}", other),
        }
        assert_eq!(
            bmc.calls(),
            vec![
                "firmware_install_steps:bmc",
                "firmware_upload:bmc",
                "firmware_task_status:upload:upload-task",
                "bmc_reset:warm",
            ]
        );
        assert!(client.metadata().failed_provider_detail["vendor"].contains("bad signature"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reset_without_declared_step() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Upload, UploadStatus])
                .with_task_statuses([status(FirmwareTaskState::Failed, "bad signature")]),
        );
        let client = client_for(&bmc);

        assert!(client
            .install_firmware(&CallContext::background(), &job())
            .await
            .is_err());
        assert_eq!(bmc.call_count("bmc_reset"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_upload_sequence() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![
                    PowerOffHost,
                    Upload,
                    UploadStatus,
                    InstallFromUploaded,
                    InstallStatus,
                    ResetBmcPostInstall,
                ])
                .with_task_ids("up-7", "inst-9"),
        );
        let client = client_for(&bmc);

        let report = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap();

        assert_eq!(report.steps_executed.len(), 6);
        assert_eq!(report.install_task_id.as_deref(), Some("inst-9"));
        assert_eq!(
            bmc.calls(),
            vec![
                "firmware_install_steps:bmc",
                "power_set:off",
                "firmware_upload:bmc",
                "firmware_task_status:upload:up-7",
                "firmware_install_uploaded:bmc:up-7",
                "firmware_task_status:install:inst-9",
                "bmc_reset:warm",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_polling() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Install, InstallStatus])
                .with_task_statuses(
                    std::iter::repeat_with(|| status(FirmwareTaskState::Running, "40%")).take(100),
                ),
        );
        let client = client_for(&bmc);
        let ctx = CallContext::with_timeout(Duration::from_secs(5));

        let err = client.install_firmware(&ctx, &job()).await.unwrap_err();

        match err {
            ClientError::Firmware(FirmwareError::Interrupted {
                step,
                source,
                last_state,
                last_status,
            }) => {
                assert_eq!(step, InstallStatus);
                assert_eq!(source, ContextError::DeadlineExceeded);
                assert_eq!(last_state, FirmwareTaskState::Running);
                assert_eq!(last_status, "40%");
            }
            other => panic!("expected interruption, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecoverable_poll_error() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Install, InstallStatus])
                .with_task_statuses([Err(BmcError::CommandFailed("task vanished".into()))]),
        );
        let client = client_for(&bmc);

        let err = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::Firmware(FirmwareError::Provider { step: InstallStatus, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_keeps_last_state() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Install, InstallStatus])
                .with_task_statuses([
                    status(FirmwareTaskState::Running, "70% flashing"),
                    Err(BmcError::CommandFailed("task vanished".into())),
                ]),
        );
        let client = client_for(&bmc);

        let err = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("70% flashing"), "{}", err);
        match err {
            ClientError::Firmware(FirmwareError::Provider {
                step,
                last_state,
                last_status,
                ..
            }) => {
                assert_eq!(step, InstallStatus);
                assert_eq!(last_state, FirmwareTaskState::Running);
                assert_eq!(last_status, "70% flashing");
            }
            other => panic!("expected provider failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_control_failure_keeps_last_state() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_install_steps(vec![Install, InstallStatus])
                .with_task_statuses([
                    status(FirmwareTaskState::Running, "50%"),
                    status(FirmwareTaskState::PowerCycleHost, "reboot required"),
                ]),
        );
        let client = Client::new(
            vec![Driver::from_capabilities(
                "vendor",
                "mock",
                bmc.capabilities_for(&[
                    Feature::FirmwareInstallSteps,
                    Feature::FirmwareInstall,
                    Feature::FirmwareTaskStatus,
                ]),
            )]
            .into(),
        );

        let err = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap_err();

        match err {
            ClientError::Firmware(FirmwareError::HostControl {
                step,
                source,
                last_state,
                last_status,
            }) => {
                assert_eq!(step, InstallStatus);
                assert!(source.is_not_implemented());
                assert_eq!(last_state, FirmwareTaskState::PowerCycleHost);
                assert_eq!(last_status, "reboot required");
            }
            other => panic!("expected host control failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_finished_context_attempts_nothing() {
        let bmc = Arc::new(MockBmc::new("vendor").with_install_steps(vec![Install]));
        let client = client_for(&bmc);
        let ctx = CallContext::background();
        ctx.cancel();

        let err = client.install_firmware(&ctx, &job()).await.unwrap_err();

        assert!(matches!(
            err,
            ClientError::Context {
                source: ContextError::Canceled,
                ..
            }
        ));
        assert!(bmc.calls().is_empty());
        assert!(client.metadata().providers_attempted.is_empty());
    }

    #[tokio::test]
    async fn test_install_call_failure_is_provider_error() {
        let bmc = Arc::new(
            MockBmc::new("vendor")
                .with_behavior(MockBehavior::Fail)
                .with_install_steps(vec![Install, InstallStatus]),
        );
        let client = client_for(&bmc);

        let err = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::Firmware(FirmwareError::Provider { step: Install, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_step_capability() {
        let bmc = Arc::new(MockBmc::new("vendor").with_install_steps(vec![Upload]));
        let client = Client::new(
            vec![Driver::from_capabilities(
                "vendor",
                "mock",
                bmc.capabilities_for(&[Feature::FirmwareInstallSteps]),
            )]
            .into(),
        );

        let err = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::Firmware(FirmwareError::MissingCapability {
                step: Upload,
                feature: Feature::FirmwareUpload,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_no_steps_declared() {
        let bmc = Arc::new(MockBmc::new("vendor"));
        let client = client_for(&bmc);

        let err = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Firmware(FirmwareError::NoSteps { .. })));
    }

    #[tokio::test]
    async fn test_no_driver_declares_steps() {
        let bmc = Arc::new(MockBmc::new("vendor"));
        let client = Client::new(
            vec![Driver::from_capabilities(
                "vendor",
                "mock",
                bmc.capabilities_for(&[Feature::PowerSet]),
            )]
            .into(),
        );

        let err = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap_err();

        assert!(err.is_not_implemented());
        assert!(bmc.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_picks_first_driver_with_steps() {
        let plain = Arc::new(MockBmc::new("plain"));
        let vendor = Arc::new(MockBmc::new("vendor").with_install_steps(vec![Install]));
        let client = Client::new(
            vec![
                Driver::from_capabilities("plain", "ipmi", plain.capabilities_for(&[Feature::PowerSet])),
                Driver::from_capabilities("vendor", "mock", vendor.capabilities()),
            ]
            .into(),
        );

        let report = client
            .install_firmware(&CallContext::background(), &job())
            .await
            .unwrap();

        assert_eq!(report.provider, "vendor");
        assert_eq!(vendor.call_count("firmware_install:"), 1);
        assert_eq!(client.metadata().providers_attempted, vec!["vendor"]);
    }
}
