//! End-to-end lifecycle scenarios against the in-memory control plane and
//! recording warehouse connector.

use skyload_config::{ClusterId, RoleName, Settings};
use skyload_control::mock::{mock_descriptor, MOCK_GROUP_ID};
use skyload_control::{ClusterStatus, ControlError, MockControlPlane, ScriptedDescribe};
use skyload_core::{
    CancelToken, CoreError, ErrorKind, IdentityBroker, IngressOutcome, NetworkAccessManager,
    Orchestrator, RecordingSleeper,
};
use skyload_warehouse::{MockConnector, StageSelection};
use std::time::Duration;

fn write_settings(dir: &std::path::Path, polling: &str) -> std::path::PathBuf {
    let path = dir.join("skyload.toml");
    std::fs::write(
        &path,
        format!(
            r#"[aws]
endpoint = "http://127.0.0.1:1"

[cluster]
cluster_type = "multi-node"
node_type = "dc2.large"
num_nodes = 4
identifier = "dwhCluster"
db_name = "dwh"
db_user = "dwhuser"
db_password = "Passw0rd"

[iam]
role_name = "dwhRole"

{polling}
"#
        ),
    )
    .unwrap();
    path
}

fn settings(polling: &str) -> Settings {
    let dir = tempfile::tempdir().unwrap();
    let path = write_settings(dir.path(), polling);
    Settings::load(&path).unwrap()
}

#[test]
fn scenario_a_create_fresh_cluster() {
    let settings = settings("");
    let cp = MockControlPlane::new().with_describe_script([
        ScriptedDescribe::Status("creating"),
        ScriptedDescribe::Status("creating"),
        ScriptedDescribe::Status("creating"),
        ScriptedDescribe::Status("available"),
    ]);
    let connector = MockConnector::new();
    let sleeper = RecordingSleeper::new();
    let orch = Orchestrator::new(&settings, &cp, &connector, &sleeper, CancelToken::new());

    let report = orch.create().unwrap();

    assert_eq!(cp.calls().create_role, 1);
    assert_eq!(cp.calls().create_cluster, 1);
    assert_eq!(cp.calls().describe, 4);
    assert!(report.cluster.endpoint.is_some());
    assert_eq!(report.cluster.status(), ClusterStatus::Available);
    assert_eq!(
        report.ingress,
        IngressOutcome::Opened {
            group_id: MOCK_GROUP_ID.to_owned(),
            port: 5439
        }
    );
    assert_eq!(cp.ingress_rules().len(), 1);
    assert!(report.probe.passed);
    assert_eq!(connector.connects()[0].username, "dwhuser");

    let stored = cp.cluster("dwhCluster").unwrap();
    assert_eq!(stored.iam_roles, vec![report.role.arn.clone()]);
    assert_eq!(stored.number_of_nodes, 4);
}

#[test]
fn scenario_b_existing_identifier_aborts_without_polling() {
    let settings = settings("");
    let cp = MockControlPlane::new().with_cluster(mock_descriptor("dwhCluster", "available"));
    let connector = MockConnector::new();
    let sleeper = RecordingSleeper::new();
    let orch = Orchestrator::new(&settings, &cp, &connector, &sleeper, CancelToken::new());

    let err = orch.create().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Fatal);
    assert!(err.to_string().contains("ClusterAlreadyExists"), "{err}");
    assert_eq!(cp.calls().describe, 0);
    assert!(sleeper.sleeps().is_empty());
    assert!(connector.connects().is_empty());
}

#[test]
fn scenario_c_delete_confirms_on_fourth_query() {
    let settings = settings("");
    let cp = MockControlPlane::new()
        .with_cluster(mock_descriptor("dwhCluster", "available"))
        .with_describe_script([
            ScriptedDescribe::Status("deleting"),
            ScriptedDescribe::Status("deleting"),
            ScriptedDescribe::Status("deleting"),
            ScriptedDescribe::Gone,
        ]);
    let connector = MockConnector::new();
    let sleeper = RecordingSleeper::new();
    let orch = Orchestrator::new(&settings, &cp, &connector, &sleeper, CancelToken::new());

    let report = orch.delete(None).unwrap();

    assert_eq!(report.status, ClusterStatus::Deleted);
    assert_eq!(cp.calls().describe, 4);
    assert_eq!(report.checks, 4);
    assert_eq!(report.elapsed_secs, 3 * 20);
    assert_eq!(sleeper.total(), Duration::from_secs(60));
    assert!(cp.cluster("dwhCluster").is_none());
}

#[test]
fn scenario_d_never_available_times_out() {
    let settings = settings(
        "[polling]\ncreate_interval_secs = 10\ncreate_timeout_secs = 60\n",
    );
    let cp = MockControlPlane::new();
    let connector = MockConnector::new();
    let sleeper = RecordingSleeper::new();
    let orch = Orchestrator::new(&settings, &cp, &connector, &sleeper, CancelToken::new());

    let err = orch.create().unwrap_err();

    match err {
        CoreError::Timeout {
            ref identifier,
            elapsed,
            ref last_status,
        } => {
            assert_eq!(identifier, "dwhCluster");
            assert_eq!(elapsed, Duration::from_secs(60));
            assert_eq!(last_status, "creating");
        }
        ref other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(cp.calls().describe, 6);
    assert!(cp.cluster("dwhCluster").unwrap().endpoint.is_none());
    assert_eq!(cp.ingress_rules().len(), 0);
}

#[test]
fn ensure_role_twice_creates_once() {
    let cp = MockControlPlane::new();
    let broker = IdentityBroker::new(&cp);
    let first = broker.ensure_role(&RoleName::new("dwhRole")).unwrap();
    let second = broker.ensure_role(&RoleName::new("dwhRole")).unwrap();
    assert_eq!(first, second);
    assert_eq!(cp.calls().create_role, 1);
    assert_eq!(cp.calls().attach_policy, 1);
}

#[test]
fn open_ingress_twice_succeeds_both_times() {
    let cp = MockControlPlane::new();
    let manager = NetworkAccessManager::new(&cp);
    let d = mock_descriptor("dwhCluster", "available");
    assert!(matches!(
        manager.open_ingress(&d, 5439).unwrap(),
        IngressOutcome::Opened { .. }
    ));
    assert!(matches!(
        manager.open_ingress(&d, 5439).unwrap(),
        IngressOutcome::AlreadyOpen { .. }
    ));
}

#[test]
fn deleted_only_after_not_found() {
    let settings = settings("[polling]\ndelete_interval_secs = 5\ndelete_timeout_secs = 20\n");
    let cp = MockControlPlane::new()
        .with_cluster(mock_descriptor("dwhCluster", "available"))
        .with_describe_script([
            ScriptedDescribe::Error(ControlError::Transient("HTTP 502".to_owned())),
            ScriptedDescribe::Status("available"),
            ScriptedDescribe::Error(ControlError::rejected("AccessDenied", "flaky")),
            ScriptedDescribe::Status("deleting"),
        ]);
    let connector = MockConnector::new();
    let sleeper = RecordingSleeper::new();
    let orch = Orchestrator::new(&settings, &cp, &connector, &sleeper, CancelToken::new());

    let err = orch.delete(None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(cp.calls().describe, 4);
}

#[test]
fn cancellation_stops_availability_wait() {
    let settings = settings("");
    let cancel = CancelToken::new();
    let cp = MockControlPlane::new();
    let connector = MockConnector::new();
    let sleeper = RecordingSleeper::new().cancelling_after(3, &cancel);
    let orch = Orchestrator::new(&settings, &cp, &connector, &sleeper, cancel);

    let err = orch.create().unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(cp.calls().describe, 3);
}

#[test]
fn create_then_load_then_delete() {
    let settings = settings("");
    let cp = MockControlPlane::new().with_describe_script([
        ScriptedDescribe::Status("available"),
        ScriptedDescribe::Status("available"),
        ScriptedDescribe::Gone,
    ]);
    let connector = MockConnector::new().with_rows(10);
    let sleeper = RecordingSleeper::new();
    let orch = Orchestrator::new(&settings, &cp, &connector, &sleeper, CancelToken::new());

    orch.create().unwrap();
    let report = orch.run_pipeline(StageSelection::All).unwrap();
    assert_eq!(report.stages.len(), 4);
    assert!(connector
        .statements()
        .iter()
        .any(|sql| sql.contains("IAM_ROLE 'arn:aws:iam::000000000000:role/dwhRole'")));

    let deleted = orch.delete(None).unwrap();
    assert_eq!(deleted.identifier, ClusterId::new("dwhCluster"));
}
