use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use tesmart::{
    ClientErrorKind, CoordinatorEvent, CoordinatorPhase, DeviceClient, FakeSwitch, Fault,
    FaultKind, FaultStage, PowerStatus, RefreshOutcome, StateCoordinator,
};

fn coordinator_for(switch: &FakeSwitch, update_interval: Duration) -> StateCoordinator {
    let client = DeviceClient::builder()
        .name("Rack")
        .host("fake.switch")
        .connector(switch.connector())
        .build();
    StateCoordinator::builder()
        .client(Arc::new(client))
        .update_interval(update_interval)
        .build()
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_share_one_refresh() {
    let switch = FakeSwitch::builder()
        .latency(Duration::from_millis(200))
        .build();
    let coordinator = coordinator_for(&switch, Duration::from_secs(60));

    let (first, second, third) = tokio::join!(
        coordinator.request_refresh(),
        coordinator.request_refresh(),
        coordinator.request_refresh(),
    );

    assert!(first.is_updated());
    assert!(second.is_updated());
    assert!(third.is_updated());
    assert_eq!(1, switch.counters().updates());
    assert_eq!(CoordinatorPhase::Idle, coordinator.phase());
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_the_last_snapshot() {
    let switch = FakeSwitch::builder().selected_source(2).build();
    let coordinator = coordinator_for(&switch, Duration::from_secs(60));
    let mut events = coordinator.events();

    let snapshot = coordinator
        .first_refresh()
        .await
        .expect("first refresh should succeed");
    assert_eq!("2", snapshot.selected_source());
    assert_matches!(events.recv().await, Ok(CoordinatorEvent::Updated { .. }));

    switch.fail_next(Fault::new(FaultStage::Update, FaultKind::Timeout));
    let outcome = coordinator.request_refresh().await;

    assert_matches!(outcome, RefreshOutcome::Failed(ref error) if error.kind() == ClientErrorKind::Communication);
    assert_eq!(Some(snapshot), coordinator.snapshot());
    assert_eq!(CoordinatorPhase::Stale, coordinator.phase());
    assert_eq!(1, coordinator.consecutive_failures());
    assert_matches!(
        events.recv().await,
        Ok(CoordinatorEvent::UpdateFailed {
            consecutive_failures: 1,
            ..
        })
    );

    let outcome = coordinator.request_refresh().await;
    assert!(outcome.is_updated());
    assert_eq!(CoordinatorPhase::Idle, coordinator.phase());
    assert_eq!(0, coordinator.consecutive_failures());
}

#[tokio::test(start_paused = true)]
async fn consecutive_failures_accumulate_until_success() {
    let switch = FakeSwitch::builder()
        .faults(vec![
            Fault::new(FaultStage::Connect, FaultKind::Refused),
            Fault::new(FaultStage::Connect, FaultKind::Timeout),
        ])
        .build();
    let coordinator = coordinator_for(&switch, Duration::from_secs(60));

    let error = coordinator
        .first_refresh()
        .await
        .expect_err("refused connect should fail the refresh");
    assert_eq!(ClientErrorKind::Communication, error.kind());
    assert_eq!(None, coordinator.snapshot());

    assert!(!coordinator.request_refresh().await.is_updated());
    assert_eq!(2, coordinator.consecutive_failures());

    let snapshot = coordinator
        .request_refresh()
        .await
        .into_result()
        .expect("device is back");
    assert_eq!(PowerStatus::On, snapshot.status());
    assert_eq!(["1", "2", "3", "4"].as_slice(), snapshot.source_list());
    assert_eq!(0, coordinator.consecutive_failures());
    assert_eq!(3, switch.counters().connects());
}

#[tokio::test(start_paused = true)]
async fn watchers_are_notified_only_on_change() {
    let switch = FakeSwitch::builder().build();
    let coordinator = coordinator_for(&switch, Duration::from_secs(60));
    let mut snapshots = coordinator.subscribe();

    coordinator
        .first_refresh()
        .await
        .expect("first refresh should succeed");
    assert!(snapshots.has_changed().expect("coordinator is alive"));
    snapshots.mark_unchanged();

    coordinator
        .first_refresh()
        .await
        .expect("second refresh should succeed");
    assert!(!snapshots.has_changed().expect("coordinator is alive"));

    switch.set_selected_source(4);
    coordinator
        .first_refresh()
        .await
        .expect("third refresh should succeed");
    assert!(snapshots.has_changed().expect("coordinator is alive"));
    let selected = snapshots
        .borrow_and_update()
        .as_ref()
        .map(|snapshot| snapshot.selected_source().to_string());
    assert_eq!(Some("4".to_string()), selected);
}

#[tokio::test(start_paused = true)]
async fn ticker_refreshes_every_interval_until_shutdown() {
    let switch = FakeSwitch::builder().build();
    let coordinator = coordinator_for(&switch, Duration::from_secs(10));

    coordinator.start();
    coordinator.start();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(0, switch.counters().updates());

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(2, switch.counters().updates());
    assert!(coordinator.snapshot().is_some());

    coordinator.shutdown().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(2, switch.counters().updates());

    coordinator.start();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(2, switch.counters().updates());
}

#[tokio::test(start_paused = true)]
async fn abandoned_refresh_releases_the_slot() {
    let switch = FakeSwitch::builder()
        .latency(Duration::from_secs(1))
        .build();
    let coordinator = coordinator_for(&switch, Duration::from_secs(60));

    let task = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.request_refresh().await }
    });
    tokio::task::yield_now().await;
    assert_eq!(CoordinatorPhase::Refreshing, coordinator.phase());

    task.abort();
    let error = task.await.expect_err("aborted task should not complete");
    assert!(error.is_cancelled());
    assert_eq!(CoordinatorPhase::Idle, coordinator.phase());
    assert!(!coordinator.client().is_connected());

    let outcome = coordinator.request_refresh().await;
    assert!(outcome.is_updated());
    assert_eq!(2, switch.counters().connects());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_publishes_what_it_read_despite_a_failing_command() {
    let switch = FakeSwitch::builder().build();
    let coordinator = coordinator_for(&switch, Duration::from_secs(60));
    let client = Arc::clone(coordinator.client());

    for _ in 0..50 {
        switch.fail_next(Fault::new(FaultStage::Command, FaultKind::Closed));
        let command = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.set_buzzer_muting(true).await }
        });

        if let RefreshOutcome::Updated(snapshot) = coordinator.request_refresh().await {
            assert_eq!(PowerStatus::On, snapshot.status());
            let stored = coordinator.snapshot().expect("a snapshot was stored");
            assert_eq!(PowerStatus::On, stored.status());
        }
        command
            .await
            .expect("command task should not panic")
            .expect_err("scripted close should fail the command");
    }
}
