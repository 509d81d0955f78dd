//! End-to-end tests against a live server on an ephemeral port.

use std::sync::Arc;

use playpen_common::{EngineConfig, ExecutionConfig, PipelineConfig};
use playpen_core::{WasmEngine, WasmSandboxFactory, WatToolchain};
use playpen_host::{MemoryStorage, create_instance_runner};
use playpen_pipeline::{Playground, Preview};
use playpen_server::{AppState, PlaypenServer};

fn app_state() -> AppState {
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    let runner = Arc::new(create_instance_runner(&engine).unwrap());

    let playground = Arc::new(
        Playground::new(
            Arc::new(WatToolchain::new(engine)),
            Arc::new(MemoryStorage::new()),
            None,
            PipelineConfig::default(),
        )
        .unwrap(),
    );
    let preview = Preview::new(
        Arc::new(WasmSandboxFactory::new(runner, ExecutionConfig::default())),
        playground.error_sink(),
    );
    AppState::new(playground, preview)
}

#[tokio::test]
async fn test_health_over_tcp() {
    let server = PlaypenServer::start_test(app_state()).await.unwrap();

    let body = reqwest::get(format!("{}/health", server.url()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "OK");

    server.shutdown().await;
}

#[tokio::test]
async fn test_edit_build_and_share_over_tcp() {
    let server = PlaypenServer::start_test(app_state()).await.unwrap();
    let client = reqwest::Client::new();

    client
        .put(format!("{}/pen/name", server.url()))
        .body("Over the wire")
        .send()
        .await
        .unwrap();
    let rebuild: serde_json::Value = client
        .post(format!("{}/pen/rebuild", server.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(rebuild["error_count"], 0);
    assert!(
        rebuild["hostname"]
            .as_str()
            .unwrap()
            .starts_with("over-the-wire-1-")
    );

    let share: serde_json::Value = client
        .get(format!("{}/share", server.url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let url = url::Url::parse(share["url"].as_str().unwrap()).unwrap();
    let pen = playpen_host::pen_codec::from_url(&url).unwrap();
    assert_eq!(pen.name, "Over the wire");
    assert_eq!(pen, server.state().playground().pen());

    server.shutdown().await;
}
