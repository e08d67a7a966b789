//! Full session against a mock lab server: register, run one program,
//! report its exit value, then get aborted by the server.

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::routing::post;
use lablink_agent::device::DeviceProbe;
use lablink_agent::{Config, Connector, LoopExit};
use lablink_core::domain::session::SessionState;
use lablink_core::hal::{SimulatedHal, Sound};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const PROGRAM: &str = "#!/usr/bin/env lua\r\nbrick.draw_text('hello')\r\nresult = 7\r\n";

#[derive(Clone, Default)]
struct Lab {
    requests: Arc<Mutex<Vec<Value>>>,
}

async fn pushcmd(State(lab): State<Lab>, body: axum::Json<Value>) -> String {
    let mut requests = lab.requests.lock().unwrap();
    requests.push(body.0);
    let cmd = match requests.len() {
        1 => "repeat",
        2 => "download",
        3 => "repeat",
        _ => "abort",
    };
    format!(r#"{{"cmd": "{}"}}"#, cmd)
}

async fn download() -> ([(header::HeaderName, &'static str); 1], &'static str) {
    (
        [(header::CONTENT_DISPOSITION, "attachment; filename=\"hello.lua\"")],
        PROGRAM,
    )
}

async fn serve(lab: Lab) -> String {
    let router = Router::new()
        .route("/pushcmd", post(pushcmd))
        .route("/download", post(download))
        .with_state(lab);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_session_runs_program_and_reports_exit_value() {
    let dir = tempfile::tempdir().unwrap();
    let lab = Lab::default();
    let address = serve(lab.clone()).await;

    let mut config = Config::new(address.clone());
    config.program_dir = dir.path().join("programs");
    config.install_dir = dir.path().join("install");

    let hal = Arc::new(SimulatedHal::new());
    let connector =
        Connector::new(config, hal.clone()).with_probe(DeviceProbe::with_root(dir.path()));
    let mut rx = connector.subscribe();

    let token = connector.connect(&address).unwrap();
    let exit = tokio::time::timeout(Duration::from_secs(10), connector.wait())
        .await
        .unwrap();
    assert!(matches!(exit, Some(LoopExit::ServerAbort)));

    let mut states = Vec::new();
    while let Ok(event) = rx.try_recv() {
        states.push(event.state);
    }
    assert_eq!(
        states,
        vec![
            SessionState::Connected,
            SessionState::Registered,
            SessionState::Executing,
            SessionState::Registered,
            SessionState::Disconnected,
        ]
    );
    assert_eq!(connector.status(), SessionState::Disconnected);

    let requests = lab.requests.lock().unwrap();
    assert_eq!(requests.len(), 4);
    assert_eq!(requests[0]["cmd"], "register");
    assert_eq!(requests[0]["token"], token.as_str());
    assert_eq!(requests[2]["cmd"], "push");
    assert_eq!(requests[2]["nepoexitvalue"], 7);
    assert_eq!(requests[3]["nepoexitvalue"], 0);

    // stored normalized, without the interpreter line
    let stored = std::fs::read_to_string(dir.path().join("programs/hello.lua")).unwrap();
    assert_eq!(stored, "brick.draw_text('hello')\nresult = 7\n");

    assert_eq!(hal.played(), vec![Sound::Ascending, Sound::Descending]);
}
