mod common;

use common::{Harness, Reading, fast_tracker, id, outcome_of};
use hostdeck_cloud::{InstanceCommand, InstanceStatus, ReconcileScope, TrackOutcome, TrackerConfig};
use std::time::Duration;

use InstanceStatus::{Booting, Pending, Running};

#[tokio::test]
async fn test_scenario_b_confirms_after_two_stable_readings() {
    let h = Harness::new(&["x"], fast_tracker()).await;
    let x = h.agent("x");
    x.script(
        "c",
        vec![
            Reading::Status(Pending),
            Reading::Status(Pending),
            Reading::Status(Running),
            Reading::Status(Running),
        ],
    );
    let mut events = h.engine.subscribe();

    let report = h
        .engine
        .reconcile(
            ReconcileScope::Account(h.account_id("x")),
            vec![x.instance("c", Pending)],
        )
        .unwrap();
    assert_eq!(report.unsettled, vec![id("c")]);

    let event = outcome_of(&mut events, "c").await;
    assert_eq!(event.outcome, TrackOutcome::Confirmed(Running));
    assert_eq!(event.polls, 4);
    assert_eq!(x.polls("c"), 4);
    assert_eq!(h.engine.instance(&id("c")).unwrap().status, Running);
    assert!(!h.engine.tracker().is_tracking(&id("c")));
}

#[tokio::test]
async fn test_not_found_deletes_exactly_once() {
    let h = Harness::new(&["x"], fast_tracker()).await;
    let x = h.agent("x");
    x.script("d", vec![Reading::Status(Booting), Reading::NotFound]);
    let mut events = h.engine.subscribe();

    h.engine
        .reconcile(
            ReconcileScope::Account(h.account_id("x")),
            vec![x.instance("d", Booting)],
        )
        .unwrap();

    let event = outcome_of(&mut events, "d").await;
    assert_eq!(event.outcome, TrackOutcome::NotFound);
    assert_eq!(event.polls, 2);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(x.polls("d"), 2);
    assert_eq!(h.resources.torn_down(), vec![id("d")]);
    assert!(h.engine.instance(&id("d")).is_none());
}

#[tokio::test]
async fn test_single_stable_reading_is_not_confirmed() {
    let config = TrackerConfig {
        timeout_ticks: 1,
        ..fast_tracker()
    };
    let h = Harness::new(&["x"], config).await;
    let x = h.agent("x");
    x.script("e", vec![Reading::Status(Running)]);

    h.engine
        .reconcile(
            ReconcileScope::Account(h.account_id("x")),
            vec![x.instance("e", Running)],
        )
        .unwrap();
    assert!(!h.engine.tracker().is_tracking(&id("e")));

    let handle = h.engine.track(&id("e")).unwrap();
    let outcome = handle.await.unwrap();
    assert_eq!(
        outcome,
        TrackOutcome::TimedOut {
            last: Some(Running)
        }
    );
}

#[tokio::test]
async fn test_flapping_resets_confirmation() {
    let h = Harness::new(&["x"], fast_tracker()).await;
    let x = h.agent("x");
    x.script(
        "f",
        vec![
            Reading::Status(Running),
            Reading::Status(Booting),
            Reading::Status(Running),
            Reading::Status(Running),
        ],
    );
    let mut events = h.engine.subscribe();

    h.engine
        .reconcile(
            ReconcileScope::Account(h.account_id("x")),
            vec![x.instance("f", Booting)],
        )
        .unwrap();

    let event = outcome_of(&mut events, "f").await;
    assert_eq!(event.outcome, TrackOutcome::Confirmed(Running));
    assert_eq!(event.polls, 4);
}

#[tokio::test]
async fn test_one_tracker_per_instance() {
    let h = Harness::new(&["x"], fast_tracker()).await;
    let x = h.agent("x");
    x.script("g", vec![Reading::Status(Booting)]);
    let scope = ReconcileScope::Account(h.account_id("x"));

    h.engine
        .reconcile(scope.clone(), vec![x.instance("g", Booting)])
        .unwrap();
    assert!(h.engine.tracker().is_tracking(&id("g")));

    assert!(h.engine.track(&id("g")).is_none());
    h.engine
        .reconcile(scope.clone(), vec![x.instance("g", Booting)])
        .unwrap();
    h.engine
        .execute(&id("g"), InstanceCommand::Restart)
        .await
        .unwrap();

    assert_eq!(h.engine.tracker().active_count(), 1);
}

#[tokio::test]
async fn test_transient_failures_keep_polling() {
    let h = Harness::new(&["x"], fast_tracker()).await;
    let x = h.agent("x");
    x.script(
        "h",
        vec![
            Reading::Unavailable,
            Reading::Unavailable,
            Reading::Status(Running),
            Reading::Status(Running),
        ],
    );
    let mut events = h.engine.subscribe();

    h.engine
        .reconcile(
            ReconcileScope::Account(h.account_id("x")),
            vec![x.instance("h", Pending)],
        )
        .unwrap();

    let event = outcome_of(&mut events, "h").await;
    assert_eq!(event.outcome, TrackOutcome::Confirmed(Running));
    assert_eq!(event.polls, 4);
}

#[tokio::test]
async fn test_timeout_keeps_last_known_state() {
    let config = TrackerConfig {
        timeout_ticks: 3,
        ..fast_tracker()
    };
    let h = Harness::new(&["x"], config).await;
    let x = h.agent("x");
    x.script("i", vec![Reading::Status(Booting)]);
    let mut events = h.engine.subscribe();

    h.engine
        .reconcile(
            ReconcileScope::Account(h.account_id("x")),
            vec![x.instance("i", Booting)],
        )
        .unwrap();

    let event = outcome_of(&mut events, "i").await;
    assert_eq!(event.outcome, TrackOutcome::TimedOut { last: Some(Booting) });
    assert_eq!(event.polls, 3);
    assert_eq!(h.engine.instance(&id("i")).unwrap().status, Booting);
    assert!(h.resources.torn_down().is_empty());
}

#[tokio::test]
async fn test_tracker_stops_when_instance_is_deleted_elsewhere() {
    let h = Harness::new(&["x"], fast_tracker()).await;
    let x = h.agent("x");
    x.script("j", vec![Reading::Status(Booting)]);
    let scope = ReconcileScope::Account(h.account_id("x"));
    let mut events = h.engine.subscribe();

    h.engine
        .reconcile(scope.clone(), vec![x.instance("j", Booting)])
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.engine.reconcile(scope, Vec::new()).unwrap();

    let event = outcome_of(&mut events, "j").await;
    assert_eq!(event.outcome, TrackOutcome::Cancelled);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(h.engine.instance(&id("j")).is_none());
}

#[tokio::test]
async fn test_destroy_and_wait() {
    let h = Harness::new(&["x"], fast_tracker()).await;
    let x = h.agent("x");
    x.set_listing(vec![x.instance("k", Running)]);
    x.script("k", vec![Reading::Status(Running), Reading::NotFound]);
    h.engine.refresh_all().await.unwrap();
    assert!(!h.engine.tracker().is_tracking(&id("k")));

    let outcome = h
        .engine
        .execute_and_wait(&id("k"), InstanceCommand::Destroy)
        .await
        .unwrap();

    assert_eq!(outcome, TrackOutcome::NotFound);
    assert_eq!(x.commands(), vec![(InstanceCommand::Destroy, id("k"))]);
    assert!(h.engine.instance(&id("k")).is_none());
}
