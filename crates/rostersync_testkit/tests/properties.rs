//! End-to-end properties of the sync protocol.

use proptest::prelude::*;
use rostersync_engine::{RefreshOutcome, SyncEngine, SyncError};
use rostersync_protocol::{
    EditableField, GlobalVersion, RecordPatch, WriteRequest, WriteResponse,
};
use rostersync_storage::MemoryCache;
use rostersync_testkit::prelude::*;
use std::sync::Arc;

#[test]
fn version_advances_by_one_per_accepted_write() {
    let cluster = TestCluster::new(1);
    cluster.load_all();
    let client = cluster.client(0);

    for (i, id) in ["stu-001", "stu-005", "stu-001"].into_iter().enumerate() {
        let patch = RecordPatch {
            attendance: Some(50 + i as u8),
            ..RecordPatch::default()
        };
        client.write(id, patch).unwrap();
        assert_eq!(cluster.server_version(), GlobalVersion(2 + i as u64));
    }
}

#[test]
fn stale_write_changes_nothing_on_server() {
    let server = test_server(4);
    let before = server.fetch_all().unwrap();

    let response = server
        .write(WriteRequest::new(
            "stu-002",
            RecordPatch {
                attendance: Some(1),
                ..RecordPatch::default()
            },
            GlobalVersion(3),
        ))
        .unwrap();

    assert_eq!(
        response,
        WriteResponse::StaleVersion {
            server_version: GlobalVersion(4)
        }
    );
    assert_eq!(server.fetch_all().unwrap(), before);
}

#[test]
fn warm_cache_refresh_at_same_version_is_a_no_op() {
    let server = test_server(3);
    let client = scenarios::cached_client(&server, "warm", 3);
    client.load().unwrap();
    let before = client.snapshot();

    assert_eq!(
        client.refresh().unwrap(),
        RefreshOutcome::Superseded {
            global_version: GlobalVersion(3)
        }
    );
    assert_eq!(client.snapshot(), before);
}

#[test]
fn behind_client_writes_twice_and_resyncs_once() {
    let server = test_server(1);
    let rival = test_client(&server, "rival");
    rival.load().unwrap();
    rival
        .write(
            "stu-010",
            RecordPatch {
                attendance: Some(1),
                ..RecordPatch::default()
            },
        )
        .unwrap();

    // Never loaded, so it writes at v1 against a server at v2.
    let behind = SyncEngine::new(
        test_config("behind"),
        FlakyTransport::new(loopback_transport(&server)),
        Arc::new(MemoryCache::new()),
    );
    let record = behind
        .write(
            "stu-003",
            RecordPatch {
                name: Some("Kabir S.".into()),
                ..RecordPatch::default()
            },
        )
        .unwrap();

    assert_eq!(record.name, "Kabir S.");
    assert_eq!(behind.transport().writes(), 2);
    assert_eq!(behind.transport().fetches(), 1);
    assert_eq!(behind.global_version(), GlobalVersion(3));
}

#[test]
fn attendance_150_is_rejected_before_the_network() {
    let server = test_server(1);
    let client = test_client(&server, "a");
    client.load().unwrap();

    let err = client
        .update_field("stu-001", EditableField::Attendance, "150")
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation { field: Some(EditableField::Attendance), .. }));
    assert_eq!(server.global_version(), GlobalVersion(1));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn any_valid_patch_sequence_keeps_versions_dense(
        patches in prop::collection::vec(arb_patch(), 1..8),
    ) {
        let cluster = TestCluster::new(2);
        cluster.load_all();
        let mut sessions = cluster.connect_all();

        for (i, patch) in patches.iter().enumerate() {
            let client = cluster.client(i % 2);
            let record = client.write("stu-006", patch.clone()).unwrap();
            prop_assert_eq!(record.id.as_str(), "stu-006");
        }

        prop_assert_eq!(cluster.server_version(), GlobalVersion(1 + patches.len() as u64));
        cluster.drain_all(&mut sessions);
        prop_assert!(cluster.converged());
    }
}
