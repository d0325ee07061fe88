use std::time::Duration;
use studydb::Task;
use studydb::config::AdmissionConfig;

fn fast_config() -> AdmissionConfig {
    AdmissionConfig {
        poll_interval_ms: 10,
        ..AdmissionConfig::default()
    }
}

#[tokio::test]
async fn load_ceiling_holds_third_task_until_completion() {
    let admission = studydb::admission::spawn(fast_config())
        .await
        .expect("spawn admission");

    let a = Task::new(0.5);
    let b = Task::new(0.5);
    let c = Task::new(0.3);

    assert!(admission.can_start(a).await.expect("can_start a"));
    assert!(admission.can_start(b).await.expect("can_start b"));
    assert!(!admission.can_start(c).await.expect("can_start c"));
    assert!(
        admission.can_start(a).await.expect("poll a again"),
        "a running task keeps its grant"
    );

    let snapshot = admission.snapshot().await.expect("snapshot");
    assert_eq!((snapshot.running, snapshot.waiting), (2, 1));
    assert!((snapshot.current_load - 1.0).abs() < 1e-9);
    assert!(
        !admission
            .is_resource_available(0.3)
            .await
            .expect("is_resource_available")
    );

    admission.complete(a);
    assert!(admission.can_start(c).await.expect("can_start c after a"));

    admission.complete(b);
    admission.complete(c);
    let snapshot = admission.snapshot().await.expect("snapshot");
    assert_eq!((snapshot.running, snapshot.waiting), (0, 0));
    assert!(snapshot.current_load.abs() < f64::EPSILON);
}

#[tokio::test]
async fn zero_load_task_is_never_tracked() {
    let admission = studydb::admission::spawn(fast_config())
        .await
        .expect("spawn admission");

    let full = Task::new(1.0);
    assert!(admission.can_start(full).await.expect("can_start full"));

    let free = Task::new(0.0);
    assert!(admission.can_start(free).await.expect("can_start free"));
    let snapshot = admission.snapshot().await.expect("snapshot");
    assert_eq!((snapshot.running, snapshot.waiting), (1, 0));

    admission.complete(free);
    admission.complete(full);
}

#[tokio::test]
async fn bumped_waiter_is_admitted_first() {
    let admission = studydb::admission::spawn(fast_config())
        .await
        .expect("spawn admission");

    let running = Task::new(1.0);
    let first = Task::new(0.6);
    let urgent = Task::new(0.6);
    assert!(admission.can_start(running).await.expect("can_start running"));
    assert!(!admission.can_start(first).await.expect("queue first"));
    assert!(!admission.can_start(urgent).await.expect("queue urgent"));

    admission.bump(urgent);
    admission.complete(running);
    assert!(
        !admission.can_start(first).await.expect("first after bump"),
        "the bumped waiter now blocks the one it overtook"
    );
    assert!(admission.can_start(urgent).await.expect("urgent after bump"));

    admission.complete(urgent);
    admission.complete(first);
}

#[tokio::test]
async fn permit_waits_for_room_and_completes_on_drop() {
    let admission = studydb::admission::spawn(fast_config())
        .await
        .expect("spawn admission");

    let first = admission
        .wait_for_start(Task::new(1.0))
        .await
        .expect("first permit");

    let waiter = {
        let admission = admission.clone();
        tokio::spawn(async move { admission.wait_for_start(Task::new(0.5)).await })
    };

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(!waiter.is_finished(), "second task must wait for room");
    let snapshot = admission.snapshot().await.expect("snapshot");
    assert_eq!((snapshot.running, snapshot.waiting), (1, 1));

    drop(first);
    let second = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("second task admitted in time")
        .expect("waiter task joined")
        .expect("second permit");
    assert!((second.task().load() - 0.5).abs() < f64::EPSILON);

    drop(second);
    let snapshot = admission.snapshot().await.expect("snapshot");
    assert_eq!((snapshot.running, snapshot.waiting), (0, 0));
    assert!(snapshot.current_load.abs() < f64::EPSILON);
}
