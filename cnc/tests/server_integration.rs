//! Integration tests for the control server.
//!
//! These tests verify the control plane on top of mock components:
//! - Runset construction from the unused pool, all or nothing
//! - Returning runsets, including cycling components that will not reset
//! - Breaking running runsets and closing the server
//! - The JSON request/response surface

use cnc::component::{ComponentName, Connector};
use cnc::log::MemoryLogger;
use cnc::run_config::{ClusterConfig, RunConfig, RunConfigError, StaticRunConfigs};
use cnc::runset::{RunOptions, RunSetError, RunSetSettings, RunSetState};
use cnc::server::{CnCError, CnCServer, ControlRequest};
use cnc::tasks::TaskSettings;
use cnc::testing::{MockComponent, RecordingProcessManager, StopBehavior};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

struct Cluster {
    mocks: Vec<Arc<MockComponent>>,
    process_manager: Arc<RecordingProcessManager>,
    logger: Arc<MemoryLogger>,
    server: CnCServer,
}

fn mocks() -> Vec<Arc<MockComponent>> {
    let specs: [(&str, u32, Vec<Connector>); 5] = [
        (
            "stringHub",
            1001,
            vec![Connector::output("stringHit"), Connector::input("rdoutReq")],
        ),
        (
            "inIceTrigger",
            0,
            vec![Connector::input("stringHit"), Connector::output("trigger")],
        ),
        (
            "globalTrigger",
            0,
            vec![Connector::input("trigger"), Connector::output("glblTrig")],
        ),
        (
            "eventBuilder",
            0,
            vec![Connector::input("glblTrig"), Connector::output("rdoutReq")],
        ),
        ("extraComp", 0, vec![]),
    ];
    specs
        .into_iter()
        .map(|(name, num, conns)| Arc::new(MockComponent::new(name, num).with_connectors(conns)))
        .collect()
}

fn run_config(mocks: &[Arc<MockComponent>]) -> RunConfig {
    RunConfig::new("sim5", mocks.iter().map(|m| m.name().clone()).collect())
}

fn cluster() -> Cluster {
    let mocks = mocks();
    let configs = StaticRunConfigs::new().with_config(run_config(&mocks));
    let process_manager = Arc::new(RecordingProcessManager::new());
    for mock in &mocks {
        process_manager.manage(Arc::clone(mock));
    }
    let logger = Arc::new(MemoryLogger::new());
    let settings = RunSetSettings::default()
        .with_rpc_timeout(Duration::from_secs(2))
        .with_start_timeout(Duration::from_secs(2))
        .with_stop_timeout(Duration::from_millis(300))
        .with_reset_timeout(Duration::from_millis(500))
        .with_poll_interval(Duration::from_millis(10))
        .with_tasks(TaskSettings::default().with_radar_doms(Vec::new()));
    let server = CnCServer::new(Arc::new(configs), process_manager.clone(), settings)
        .with_cluster(ClusterConfig::new("sim-localhost"))
        .with_logger(logger.clone())
        .with_dashlog(Arc::new(MemoryLogger::new()));
    for mock in &mocks {
        server.add_component(mock.proxy());
    }
    Cluster {
        mocks,
        process_manager,
        logger,
        server,
    }
}

impl Cluster {
    fn mock(&self, name: &str) -> &Arc<MockComponent> {
        self.mocks
            .iter()
            .find(|m| m.name().name() == name)
            .unwrap()
    }
}

async fn request(server: &CnCServer, text: Value) -> Value {
    let reply = server.handle_json(&text.to_string()).await;
    serde_json::from_str(&reply).unwrap()
}

// =============================================================================
// Runset construction
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_make_start_stop_return() {
    let c = cluster();
    assert_eq!(c.server.num_unused(), 5);

    let runset = c.server.make_runset("sim5").await.unwrap();
    let id = runset.id();
    assert_eq!(c.server.num_unused(), 0);
    assert_eq!(c.server.num_sets(), 1);
    assert_eq!(c.server.runset_state(id).unwrap(), RunSetState::Ready);

    c.server.start_run(id, 321, RunOptions::new()).await.unwrap();
    assert_eq!(c.server.runset_state(id).unwrap(), RunSetState::Running);

    let had_error = c.server.stop_run(id).await.unwrap();
    assert!(!had_error);
    assert_eq!(c.server.runset_state(id).unwrap(), RunSetState::Ready);

    c.server.return_runset(id).await.unwrap();
    assert_eq!(c.server.num_sets(), 0);
    assert_eq!(c.server.num_unused(), 5);
    assert!(c.process_manager.cycled().is_empty());
    for mock in &c.mocks {
        assert_eq!(mock.state(), "idle");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_component_leaves_pool_untouched() {
    let mocks = mocks();
    let configs = StaticRunConfigs::new().with_config(run_config(&mocks));
    let server = CnCServer::new(
        Arc::new(configs),
        Arc::new(RecordingProcessManager::new()),
        RunSetSettings::default(),
    )
    .with_logger(Arc::new(MemoryLogger::new()));
    for mock in mocks.iter().take(4) {
        server.add_component(mock.proxy());
    }

    let err = server.make_runset("sim5").await.unwrap_err();
    match err {
        CnCError::MissingComponent(missing) => assert_eq!(missing, vec!["extraComp"]),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(server.num_unused(), 4);
    assert_eq!(server.num_sets(), 0);
    for mock in mocks.iter().take(4) {
        assert_eq!(mock.calls("connect"), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_host_pinning() {
    let mocks = mocks();
    let configs = StaticRunConfigs::new().with_config(run_config(&mocks));
    let server = CnCServer::new(
        Arc::new(configs),
        Arc::new(RecordingProcessManager::new()),
        RunSetSettings::default(),
    )
    .with_cluster(
        ClusterConfig::new("spts").with_host(ComponentName::new("eventBuilder", 0), "evbuilder"),
    )
    .with_logger(Arc::new(MemoryLogger::new()));
    for mock in &mocks {
        server.add_component(mock.proxy());
    }

    let err = server.make_runset("sim5").await.unwrap_err();
    match err {
        CnCError::MissingComponent(missing) => {
            assert_eq!(missing, vec!["eventBuilder@evbuilder"])
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(server.num_unused(), 5);
}

#[tokio::test]
async fn test_unknown_run_config() {
    let c = cluster();
    let err = c.server.make_runset("nonexistent").await.unwrap_err();
    assert!(matches!(
        err,
        CnCError::RunConfig(RunConfigError::NotFound(_))
    ));
    assert_eq!(c.server.num_unused(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_configure_returns_components() {
    let c = cluster();
    c.mock("eventBuilder").fail_method("configure");

    let err = c.server.make_runset("sim5").await.unwrap_err();
    assert!(matches!(
        err,
        CnCError::RunSet(RunSetError::ConfigurationFailed(_))
    ));
    assert_eq!(c.server.num_sets(), 0);
    assert_eq!(c.server.num_unused(), 5);
    assert_eq!(c.process_manager.cycled(), vec!["eventBuilder"]);
}

#[tokio::test]
async fn test_add_component_replaces_stale_proxy() {
    let c = cluster();
    c.server.add_component(c.mock("extraComp").proxy());

    assert_eq!(c.server.num_unused(), 5);
    assert!(c.logger.contains_fragment("Replacing stale"));
}

// =============================================================================
// Returning runsets
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_return_rejects_running_runset() {
    let c = cluster();
    let id = c.server.make_runset("sim5").await.unwrap().id();
    c.server.start_run(id, 10, RunOptions::new()).await.unwrap();

    let err = c.server.return_runset(id).await.unwrap_err();
    assert!(matches!(
        err,
        CnCError::RunSet(RunSetError::InvalidState {
            state: RunSetState::Running,
            ..
        })
    ));

    c.server.break_runset(id).await.unwrap();
    assert_eq!(c.server.num_sets(), 0);
    assert_eq!(c.server.num_unused(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreset_component_is_cycled() {
    let c = cluster();
    let id = c.server.make_runset("sim5").await.unwrap().id();
    c.mock("extraComp").fail_method("reset");

    c.server.return_runset(id).await.unwrap();
    assert_eq!(c.process_manager.cycled(), vec!["extraComp"]);
    assert_eq!(c.mock("extraComp").state(), "idle");
    assert_eq!(c.server.num_unused(), 5);
    assert!(c.logger.contains("Cycling components extraComp"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stuck_component_is_cycled_on_return() {
    let c = cluster();
    let id = c.server.make_runset("sim5").await.unwrap().id();
    c.server.start_run(id, 11, RunOptions::new()).await.unwrap();
    c.mock("globalTrigger").set_stop_behavior(StopBehavior::Stuck);

    let err = c.server.stop_run(id).await.unwrap_err();
    assert!(matches!(
        err,
        CnCError::RunSet(RunSetError::StopTimeout(_))
    ));
    assert_eq!(c.server.runset_state(id).unwrap(), RunSetState::Error);

    c.server.return_runset(id).await.unwrap();
    assert_eq!(c.process_manager.cycled(), vec!["globalTrigger"]);
    assert_eq!(c.mock("globalTrigger").state(), "idle");
    assert_eq!(c.server.num_unused(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_cycle_fails_return() {
    let c = cluster();
    let id = c.server.make_runset("sim5").await.unwrap().id();
    c.mock("extraComp").fail_method("reset");
    c.process_manager.set_fail(true);

    let err = c.server.return_runset(id).await.unwrap_err();
    match err {
        CnCError::RunSet(RunSetError::ResetFailed(names)) => {
            assert_eq!(names, vec!["extraComp"])
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(c.server.num_sets(), 0);
    assert_eq!(c.server.num_unused(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_terminates_unused_components() {
    let c = cluster();
    let id = c.server.make_runset("sim5").await.unwrap().id();
    c.server.start_run(id, 20, RunOptions::new()).await.unwrap();

    c.server.close().await.unwrap();
    assert_eq!(c.server.num_sets(), 0);
    for mock in &c.mocks {
        assert_eq!(mock.state(), "destroyed");
    }
    assert!(c.process_manager.killed().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_close_kills_components_that_refuse() {
    let c = cluster();
    c.mock("eventBuilder").set_state("running");

    c.server.close().await.unwrap();
    assert_eq!(c.process_manager.killed(), vec!["eventBuilder"]);
    assert_eq!(c.mock("extraComp").state(), "destroyed");
}

// =============================================================================
// Control surface
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_json_control_session() {
    let c = cluster();
    let s = &c.server;

    let reply = request(s, json!({"method": "make_runset", "params": {"config": "sim5"}})).await;
    assert_eq!(reply["status"], "ok");
    let id = reply["result"].as_u64().unwrap();

    let reply = request(s, json!({"method": "runset_list_ids"})).await;
    assert_eq!(reply["result"], json!([id]));

    let reply = request(s, json!({"method": "runset_state", "params": {"id": id}})).await;
    assert_eq!(reply["result"], "ready");

    let reply = request(s, json!({"method": "runset_list", "params": {"id": id}})).await;
    let rows = reply["result"].as_array().unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().any(|r| r["compName"] == "stringHub" && r["compNum"] == 1001));
    assert!(rows.iter().all(|r| r["state"] == "ready"));

    let reply = request(s, json!({"method": "component_list_dicts"})).await;
    assert_eq!(reply["result"], json!([]));

    let reply = request(
        s,
        json!({"method": "runset_start_run", "params": {"id": id, "run_num": 321}}),
    )
    .await;
    assert_eq!(reply["status"], "ok");

    let reply = request(s, json!({"method": "runset_stop_run", "params": {"id": id}})).await;
    assert_eq!(reply["result"], false);

    let reply = request(s, json!({"method": "runset_break", "params": {"id": id}})).await;
    assert_eq!(reply["status"], "ok");

    let reply = request(s, json!({"method": "num_sets"})).await;
    assert_eq!(reply["result"], 0);

    let reply = request(s, json!({"method": "component_list_dicts"})).await;
    assert_eq!(reply["result"].as_array().unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_json_make_runset_fixes_first_run() {
    let c = cluster();
    let s = &c.server;

    let reply = request(
        s,
        json!({"method": "make_runset", "params": {"config": "sim5", "run_num": 5}}),
    )
    .await;
    let id = reply["result"].as_u64().unwrap();
    assert_eq!(s.runset(id as u32).unwrap().planned_run(), Some(5));

    let reply = request(
        s,
        json!({"method": "runset_start_run", "params": {"id": id, "run_num": 6}}),
    )
    .await;
    assert_eq!(
        reply,
        json!({"status": "fault", "message": "Runset was built for run 5, not run 6"})
    );
    assert_eq!(c.mock("eventBuilder").calls("startRun"), 0);

    let reply = request(
        s,
        json!({"method": "runset_start_run", "params": {"id": id, "run_num": 5}}),
    )
    .await;
    assert_eq!(reply["status"], "ok");
    assert_eq!(s.runset(id as u32).unwrap().planned_run(), None);

    let reply = request(s, json!({"method": "runset_break", "params": {"id": id}})).await;
    assert_eq!(reply["status"], "ok");
}

#[tokio::test]
async fn test_json_faults() {
    let c = cluster();

    let reply = request(&c.server, json!({"method": "runset_state", "params": {"id": 42}})).await;
    assert_eq!(reply, json!({"status": "fault", "message": "Unknown runset #42"}));

    let reply = request(&c.server, json!({"method": "launch_rockets"})).await;
    assert_eq!(reply["status"], "fault");
    assert!(reply["message"].as_str().unwrap().starts_with("Bad request"));

    let reply = c.server.handle_json("not json").await;
    assert!(reply.contains("\"fault\""));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_with_bad_options_is_rejected() {
    let c = cluster();
    let id = c.server.make_runset("sim5").await.unwrap().id();

    let response = c
        .server
        .handle(serde_json::from_value::<ControlRequest>(json!({
            "method": "runset_start_run",
            "params": {"id": id, "run_num": 5, "options": {"log_host": "loghost"}}
        }))
        .unwrap())
        .await;
    assert!(response.is_fault());
    assert_eq!(c.server.runset_state(id).unwrap(), RunSetState::Ready);
    assert_eq!(c.mock("eventBuilder").calls("startRun"), 0);
}
