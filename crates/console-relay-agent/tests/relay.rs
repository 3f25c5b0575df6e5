//! Agent and panel talking over an in-process bridge.

use std::{sync::Arc, time::Duration};

use console_relay_agent::Agent;
use console_relay_core::{AgentConfig, Arg, Console};
use console_relay_panel::{PanelController, PanelState};
use console_relay_storage::storage::{FileStorage, MemoryStorage};
use console_relay_transport::{Bridge, BridgeHost};
use tokio::sync::watch;

async fn wait(rx: &mut watch::Receiver<PanelState>, f: impl FnMut(&PanelState) -> bool) -> PanelState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(f))
        .await
        .expect("panel state did not settle")
        .expect("panel dropped")
        .clone()
}

fn relay_agent(console: &Arc<Console>) -> Agent {
    let config = AgentConfig::relay()
        .with_destination("./logs/app.log")
        .with_auto_enable(true);
    Agent::new(config, Arc::clone(console)).unwrap()
}

#[tokio::test]
async fn test_late_panel_sees_current_status() {
    let console = Arc::new(Console::silent());
    let agent = relay_agent(&console);
    agent.activate();
    // Announcement went nowhere; the panel must ask.
    console.log(&[Arg::from("before panel")]);

    let panel = PanelController::new("./logs/fallback.log");
    let (agent_end, panel_end) = Bridge::pair();
    agent.attach(agent_end);
    panel.connect(panel_end).unwrap();

    let state = wait(&mut panel.subscribe(), |s| s.enabled.is_some()).await;
    assert!(state.connected);
    assert_eq!(state.enabled, Some(true));
    assert_eq!(state.destination.as_deref(), Some("./logs/app.log"));
}

#[tokio::test]
async fn test_toggle_round_trip_through_panel() {
    let console = Arc::new(Console::silent());
    let agent = relay_agent(&console);
    agent.activate();

    let panel = PanelController::new("./logs/fallback.log");
    let (agent_end, panel_end) = Bridge::pair();
    agent.attach(agent_end);
    panel.connect(panel_end).unwrap();
    let mut rx = panel.subscribe();
    wait(&mut rx, |s| s.enabled == Some(true)).await;

    panel.request_toggle().unwrap();
    wait(&mut rx, |s| s.enabled == Some(false)).await;
    assert!(!agent.session().is_enabled());

    panel.request_toggle().unwrap();
    wait(&mut rx, |s| s.enabled == Some(true)).await;
    assert!(agent.session().is_enabled());
}

#[tokio::test]
async fn test_relayed_records_persist_on_panel_side() {
    let console = Arc::new(Console::silent());
    let agent = relay_agent(&console);

    let storage = Arc::new(MemoryStorage::new());
    let panel = PanelController::with_storage("./logs/fallback.log", storage.clone());
    let (agent_end, panel_end) = Bridge::pair();
    agent.attach(agent_end);
    panel.connect(panel_end).unwrap();
    agent.activate();

    console.log(&[Arg::from("first"), Arg::from(1.0)]);
    console.error(&[Arg::from("second")]);

    let state = wait(&mut panel.subscribe(), |s| s.persisted == 2).await;
    assert_eq!(state.last_error, None);
    assert!(panel.shutdown(Duration::from_secs(5)).await.is_clean());

    let contents = storage.contents("./logs/app.log").unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("[LOG] first 1"));
    assert!(lines[1].ends_with("[ERROR] second"));
    assert_eq!(storage.contents("./logs/fallback.log"), None);
}

#[tokio::test]
async fn test_disabled_agent_relays_nothing() {
    let console = Arc::new(Console::silent());
    let agent = Agent::new(
        AgentConfig::relay().with_destination("./logs/app.log"),
        Arc::clone(&console),
    )
    .unwrap();

    let storage = Arc::new(MemoryStorage::new());
    let panel = PanelController::with_storage("./logs/fallback.log", storage.clone());
    let (agent_end, panel_end) = Bridge::pair();
    agent.attach(agent_end);
    panel.connect(panel_end).unwrap();
    agent.activate();
    let mut rx = panel.subscribe();
    wait(&mut rx, |s| s.enabled == Some(false)).await;

    console.warn(&[Arg::from("ignored")]);
    panel.request_toggle().unwrap();
    wait(&mut rx, |s| s.enabled == Some(true)).await;
    console.warn(&[Arg::from("kept")]);

    wait(&mut rx, |s| s.persisted == 1).await;
    panel.shutdown(Duration::from_secs(5)).await;
    let contents = storage.contents("./logs/app.log").unwrap();
    assert!(contents.contains("kept"));
    assert!(!contents.contains("ignored"));
}

#[tokio::test]
async fn test_panel_disconnect_releases_agent_subscriptions() {
    let console = Arc::new(Console::silent());
    let agent = relay_agent(&console);
    agent.activate();

    let panel = PanelController::new("./logs/fallback.log");
    let (agent_end, panel_end) = Bridge::pair();
    let id = agent.attach(agent_end);
    panel.connect(panel_end).unwrap();
    wait(&mut panel.subscribe(), |s| s.enabled.is_some()).await;
    assert!(agent.is_connected());

    panel.disconnect();
    while agent.is_connected() {
        tokio::task::yield_now().await;
    }
    agent.detach(id);

    // Relaying with no panel attached is silent.
    console.log(&[Arg::from("into the void")]);
    assert!(agent.session().is_enabled());
    assert!(!panel.state().connected);
}

#[tokio::test]
async fn test_agent_deactivate_disconnects_panel() {
    let console = Arc::new(Console::silent());
    let agent = relay_agent(&console);
    agent.activate();

    let panel = PanelController::new("./logs/fallback.log");
    let (agent_end, panel_end) = Bridge::pair();
    agent.attach(agent_end);
    panel.connect(panel_end).unwrap();
    wait(&mut panel.subscribe(), |s| s.enabled.is_some()).await;

    let report = agent.deactivate().await;
    assert!(report.was_active);
    while panel.is_connected() {
        tokio::task::yield_now().await;
    }
    assert!(panel.request_toggle().is_err());
}

#[tokio::test]
async fn test_local_file_topology_writes_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("console.log");
    let destination = path.to_str().unwrap().to_string();

    let console = Arc::new(Console::silent());
    let config = AgentConfig::local(destination.clone()).with_auto_enable(true);
    let agent = Agent::with_storage(config, Arc::clone(&console), Arc::new(FileStorage::new())).unwrap();

    let panel = PanelController::new("./unused.log");
    let (agent_end, panel_end) = Bridge::pair();
    agent.attach(agent_end);
    panel.connect(panel_end).unwrap();
    agent.activate();
    let state = wait(&mut panel.subscribe(), |s| s.enabled.is_some()).await;
    assert_eq!(state.destination.as_deref(), Some(destination.as_str()));

    for i in 0..10 {
        console.info(&[Arg::from("line"), Arg::from(i64::from(i))]);
    }
    let report = agent.deactivate().await;
    assert_eq!(report.unflushed, 0);

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 10);
    for (i, line) in lines.iter().enumerate() {
        assert!(line.ends_with(&format!("[INFO] line {i}")), "{line}");
    }
    // Nothing was relayed: local topology keeps records on disk.
    assert_eq!(panel.state().persisted, 0);
}
