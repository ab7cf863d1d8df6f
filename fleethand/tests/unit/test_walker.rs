//! Fleet walker tests

use std::sync::atomic::Ordering;
use std::sync::Arc;

use fleethand::errors::FleetError;
use fleethand::provision::stage::{CERT_FLAG, RETIRED_FLAG};
use fleethand::roster::Roster;
use fleethand::storage::settings::Settings;
use fleethand::storage::store::ServerStore;
use fleethand::walker::jobs::RetireJob;
use fleethand::walker::{FleetWalker, WalkRange};

use crate::mock::{ConnectFailure, CountingJob, MockConnector, Script};

const THREE_SERVERS: &str = "s0--h0--root--p0\ns1--h1--root--p1\ns2--h2--root--p2";

fn settings() -> Arc<Settings> {
    Arc::new(Settings::default())
}

#[tokio::test]
async fn walk_continues_past_a_failing_server() {
    let roster = Roster::parse(THREE_SERVERS).unwrap();
    let store = ServerStore::open_in_memory().unwrap();
    let connector = MockConnector::new(Script::default())
        .fail_host("h2", ConnectFailure::Generic);
    let walker = FleetWalker::new(&roster, &store, &connector, settings());
    let job = CountingJob::default();

    let summary = walker.walk(WalkRange::From(0), &job).await.unwrap();

    assert_eq!(summary.visited, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(job.calls.load(Ordering::SeqCst), 2);
    // the failing server still got an identity row
    assert!(store.session("s2").exists().unwrap());
}

#[tokio::test]
async fn reset_aborts_only_when_asked() {
    let roster = Roster::parse(THREE_SERVERS).unwrap();
    let store = ServerStore::open_in_memory().unwrap();

    // background flow: reset is logged and the walk proceeds
    let connector =
        MockConnector::new(Script::default()).fail_host("h1", ConnectFailure::Reset);
    let walker = FleetWalker::new(&roster, &store, &connector, settings());
    let job = CountingJob::default();
    let summary = walker.walk(WalkRange::From(0), &job).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(job.calls.load(Ordering::SeqCst), 2);

    // foreground flow: the same reset terminates the walk
    let connector =
        MockConnector::new(Script::default()).fail_host("h1", ConnectFailure::Reset);
    let walker = FleetWalker::new(&roster, &store, &connector, settings())
        .with_on_reset_exit(true);
    let job = CountingJob::default();
    let err = walker.walk(WalkRange::From(0), &job).await.unwrap_err();
    assert!(matches!(err, FleetError::ConnectionReset(_)));
    assert_eq!(job.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn range_is_validated_before_any_connection() {
    let roster = Roster::parse(THREE_SERVERS).unwrap();
    let store = ServerStore::open_in_memory().unwrap();
    let connector = MockConnector::new(Script::default());
    let walker = FleetWalker::new(&roster, &store, &connector, settings());
    let job = CountingJob::default();

    for range in [
        WalkRange::From(3),
        WalkRange::Single(7),
        WalkRange::Span(2, 2),
        WalkRange::Span(2, 1),
        WalkRange::Span(0, 4),
    ] {
        let err = walker.walk(range, &job).await.unwrap_err();
        assert!(matches!(err, FleetError::RangeValidation(_)), "{range:?}");
    }
    assert!(connector.connect_log.lock().unwrap().is_empty());
    assert_eq!(job.calls.load(Ordering::SeqCst), 0);

    let summary = walker.walk(WalkRange::Span(1, 3), &job).await.unwrap();
    assert_eq!(summary.visited, 2);
    let summary = walker.walk(WalkRange::Single(0), &job).await.unwrap();
    assert_eq!(summary.visited, 1);
}

#[tokio::test]
async fn auth_switches_to_key_after_cert_flag() {
    let roster = Roster::parse("s0--h0--root--p0").unwrap();
    let store = ServerStore::open_in_memory().unwrap();
    let connector = MockConnector::new(Script::default());
    let walker = FleetWalker::new(&roster, &store, &connector, settings());
    let job = CountingJob::default();

    walker.walk(WalkRange::From(0), &job).await.unwrap();
    store.session("s0").set_flag(CERT_FLAG).unwrap();
    walker.walk(WalkRange::From(0), &job).await.unwrap();

    let log = connector.connect_log.lock().unwrap();
    assert_eq!(*log, ["password root@h0:22", "key root@h0:22"]);
}

#[tokio::test]
async fn offline_walk_runs_the_job_without_connecting() {
    let roster = Roster::parse(THREE_SERVERS).unwrap();
    let store = ServerStore::open_in_memory().unwrap();
    let connector = MockConnector::new(Script::default());
    let walker = FleetWalker::new(&roster, &store, &connector, settings());

    let summary = walker
        .walk_offline(WalkRange::From(0), &RetireJob)
        .await
        .unwrap();

    assert_eq!(summary.visited, 3);
    assert_eq!(summary.failed, 0);
    assert!(connector.connect_log.lock().unwrap().is_empty());
    for id in ["s0", "s1", "s2"] {
        assert!(store.session(id).get_flag(RETIRED_FLAG).unwrap());
    }
}

#[tokio::test]
async fn tunnel_directive_is_excluded_from_the_walk() {
    let roster = Roster::parse("#GROUP----wg\ns0--h0--root--p0").unwrap();
    let store = ServerStore::open_in_memory().unwrap();
    let connector = MockConnector::new(Script::default());
    let walker = FleetWalker::new(&roster, &store, &connector, settings());
    let job = CountingJob::default();

    // only the real server is in range; note the gate itself would shell
    // out to wg-quick, which fails silently in this environment
    let summary = walker.walk(WalkRange::From(0), &job).await.unwrap();
    assert_eq!(summary.visited, 1);
    assert_eq!(
        store.session("s0").get_kv_str("tunnel_profile").unwrap(),
        "GROUP"
    );
}
