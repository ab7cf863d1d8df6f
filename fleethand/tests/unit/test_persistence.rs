//! On-disk persistence tests

use fleethand::provision::stage::DOCKER_FLAG;
use fleethand::roster::Roster;
use fleethand::storage::store::ServerStore;

#[tokio::test]
async fn roster_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("servers.txt");
    tokio::fs::write(&path, "A----1.2.3.4----root----hunter2\nB--h--u--p--2222\n")
        .await
        .unwrap();

    let roster = Roster::load(&path).await.unwrap();
    assert_eq!(roster.count(), 2);
    assert_eq!(roster.read_at(0).unwrap().host, "1.2.3.4");
    assert_eq!(roster.read_at(1).unwrap().port, 2222);
}

#[test]
fn flags_survive_a_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("fleet.db");

    {
        let store = ServerStore::open(&db).unwrap();
        let roster = Roster::parse("s0--h0--root--p0").unwrap();
        let state = store.session("s0");
        state.upsert_identity(roster.read_at(0).unwrap()).unwrap();
        state.set_flag(DOCKER_FLAG).unwrap();
    }

    let store = ServerStore::open(&db).unwrap();
    let state = store.session("s0");
    assert!(state.exists().unwrap());
    assert!(state.get_flag(DOCKER_FLAG).unwrap());
    assert_eq!(store.count().unwrap(), 1);
}
