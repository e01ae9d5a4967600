//! End-to-end behavior of the client over mock drivers

use bmcmux_bmc::mock::{MockBehavior, MockBmc};
use bmcmux_bmc::{
    BmcError, Feature, FirmwareInstallStep, FirmwareStatus, FirmwareTaskState, PowerAction,
};
use bmcmux_client::{allocate_timeout, CallContext, Client, ClientError, FirmwareJob};
use bmcmux_registry::{Driver, Registry};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn mock(name: &str, protocol: &str, behavior: MockBehavior) -> (Arc<MockBmc>, Driver) {
    let bmc = Arc::new(MockBmc::new(name).with_behavior(behavior));
    let driver = Driver::from_capabilities(name, protocol, bmc.capabilities());
    (bmc, driver)
}

#[tokio::test]
async fn test_power_set_falls_through_failing_drivers() {
    let (_, d1) = mock("d1", "web", MockBehavior::Fail);
    let (_, d2) = mock("d2", "ipmi", MockBehavior::Refuse);
    let (ok, d3) = mock("d3", "web", MockBehavior::Succeed);
    let client = Client::new(vec![d1, d2, d3].into());

    client
        .power_set(&CallContext::background(), PowerAction::Cycle)
        .await
        .unwrap();

    let metadata = client.metadata();
    assert_eq!(metadata.providers_attempted, vec!["d1", "d2", "d3"]);
    assert_eq!(metadata.successful_provider.as_deref(), Some("d3"));
    assert_eq!(ok.call_count("power_set:cycle"), 1);
}

#[tokio::test]
async fn test_first_success_never_calls_second() {
    let (first, d1) = mock("d1", "web", MockBehavior::Succeed);
    let (second, d2) = mock("d2", "web", MockBehavior::Succeed);
    let client = Client::new(vec![d1, d2].into());
    let ctx = CallContext::background();

    for _ in 0..3 {
        client.power_set(&ctx, PowerAction::On).await.unwrap();
    }

    assert_eq!(first.call_count("power_set"), 3);
    assert!(second.calls().is_empty());
}

#[tokio::test]
async fn test_all_failures_are_reported() {
    let (_, d1) = mock("d1", "web", MockBehavior::Fail);
    let (_, d2) = mock("d2", "ipmi", MockBehavior::Reject);
    let (_, d3) = mock("d3", "rpc", MockBehavior::Refuse);
    let client = Client::new(vec![d1, d2, d3].into());

    let err = client
        .bmc_reset(&CallContext::background(), bmcmux_bmc::BmcResetType::Cold)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Exhausted { .. }));
    let text = err.to_string();
    for name in ["d1", "d2", "d3"] {
        assert!(text.contains(name), "{} missing from {}", name, text);
    }
    let metadata = client.metadata();
    assert_eq!(metadata.providers_attempted, vec!["d1", "d2", "d3"]);
    assert_eq!(metadata.failed_provider_detail.len(), 3);
}

#[tokio::test]
async fn test_not_implemented_differs_from_exhausted() {
    let bmc = Arc::new(MockBmc::new("a").with_behavior(MockBehavior::Fail));
    let client = Client::new(
        vec![Driver::from_capabilities(
            "a",
            "web",
            bmc.capabilities_for(&[Feature::PowerSet]),
        )]
        .into(),
    );
    let ctx = CallContext::background();

    let missing = client.sensors(&ctx).await.unwrap_err();
    let failed = client.power_set(&ctx, PowerAction::Off).await.unwrap_err();

    assert!(missing.is_not_implemented());
    assert!(!failed.is_not_implemented());
    assert_eq!(failed.failures().map(|f| f.len()), Some(1));
}

#[test]
fn test_prefer_protocol_scenario() {
    let (_, a) = mock("A", "web", MockBehavior::Succeed);
    let (_, b) = mock("B", "ipmi", MockBehavior::Succeed);
    let (_, c) = mock("C", "web", MockBehavior::Succeed);
    let registry: Registry = vec![a, b, c].into();

    assert_eq!(registry.prefer_protocol(&["web"]).names(), vec!["A", "C", "B"]);
}

#[tokio::test]
async fn test_preferred_protocol_is_tried_first() {
    let (web, a) = mock("A", "web", MockBehavior::Succeed);
    let (ipmi, b) = mock("B", "ipmi", MockBehavior::Succeed);
    let client = Client::new(vec![a, b].into());

    client
        .prefer_protocol(&["ipmi"])
        .power_set(&CallContext::background(), PowerAction::On)
        .await
        .unwrap();

    assert_eq!(ipmi.call_count("power_set"), 1);
    assert!(web.calls().is_empty());
    assert_eq!(client.metadata().successful_provider.as_deref(), Some("B"));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_split_across_four_drivers() {
    let ctx = CallContext::with_timeout(Duration::from_secs(5));
    assert_eq!(allocate_timeout(&ctx, 4, None), Duration::from_millis(1250));

    let drivers: Vec<Driver> = (1..=4)
        .map(|i| mock(&format!("d{}", i), "web", MockBehavior::Hang).1)
        .collect();
    let client = Client::new(drivers.into());
    let started = tokio::time::Instant::now();

    let err = client.power_set(&ctx, PowerAction::On).await.unwrap_err();

    // The last attempt's share ends exactly on the caller's deadline
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert!(matches!(err, ClientError::Context { .. }));
    assert_eq!(err.failures().unwrap().providers(), vec!["d1", "d2", "d3"]);
    let metadata = client.metadata();
    assert_eq!(metadata.providers_attempted, vec!["d1", "d2", "d3", "d4"]);
    assert_eq!(metadata.failed_provider_detail.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_firmware_polls_three_times() {
    let bmc = Arc::new(
        MockBmc::new("vendor")
            .with_install_steps(vec![
                FirmwareInstallStep::Upload,
                FirmwareInstallStep::InstallStatus,
            ])
            .with_task_statuses([
                Ok(FirmwareStatus::new(FirmwareTaskState::Running, "")),
                Ok(FirmwareStatus::new(FirmwareTaskState::Running, "")),
                Ok(FirmwareStatus::new(FirmwareTaskState::Complete, "")),
            ]),
    );
    let client = Client::new(vec![Driver::from_capabilities("vendor", "web", bmc.capabilities())].into());

    let report = client
        .install_firmware(
            &CallContext::background(),
            &FirmwareJob::new("bios", b"image".to_vec()),
        )
        .await
        .unwrap();

    assert_eq!(report.polls, 3);
    assert_eq!(bmc.call_count("firmware_task_status"), 3);
    assert_eq!(
        report.steps_executed.last(),
        Some(&FirmwareInstallStep::InstallStatus)
    );
}

#[tokio::test(start_paused = true)]
async fn test_firmware_rides_out_bmc_reboot() {
    let bmc = Arc::new(
        MockBmc::new("vendor")
            .with_install_steps(vec![
                FirmwareInstallStep::Upload,
                FirmwareInstallStep::InstallStatus,
            ])
            .with_task_statuses([
                Err(BmcError::ConnectionRefused("connection refused".into())),
                Ok(FirmwareStatus::new(FirmwareTaskState::Running, "")),
                Ok(FirmwareStatus::new(FirmwareTaskState::Complete, "")),
            ]),
    );
    let client = Client::new(vec![Driver::from_capabilities("vendor", "web", bmc.capabilities())].into());

    let report = client
        .install_firmware(
            &CallContext::background(),
            &FirmwareJob::new("bios", b"image".to_vec()),
        )
        .await
        .unwrap();

    assert_eq!(report.final_state, Some(FirmwareTaskState::Complete));
    assert!(client.metadata().failed_provider_detail.is_empty());
}

#[tokio::test]
async fn test_session_lifecycle_around_calls() {
    let (a_bmc, a) = mock("a", "web", MockBehavior::Succeed);
    let b_bmc = Arc::new(
        MockBmc::new("b").with_open_failures([BmcError::AuthenticationFailed("denied".into())]),
    );
    let b = Driver::from_capabilities("b", "ipmi", b_bmc.capabilities());
    let mut client = Client::new(vec![b, a].into());
    let ctx = CallContext::background();

    client.open(&ctx).await.unwrap();
    assert_eq!(client.registry().names(), vec!["a"]);

    client.power_state(&ctx).await.unwrap();
    client.close(&ctx).await.unwrap();

    assert_eq!(a_bmc.calls(), vec!["open", "power_state", "close"]);
    assert_eq!(b_bmc.close_count(), 0);
    assert_eq!(client.metadata().successful_close_conns, vec!["a"]);
}

proptest! {
    #[test]
    fn test_allocation_is_even_share(secs in 1u64..600, drivers in 1usize..16) {
        let ctx = CallContext::with_timeout(Duration::from_secs(secs));
        let allocated = allocate_timeout(&ctx, drivers, None);
        let expected = Duration::from_secs(secs) / drivers as u32;

        prop_assert!(allocated <= expected);
        prop_assert!(expected - allocated <= Duration::from_millis(10));
    }
}
