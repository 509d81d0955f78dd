//! Integration tests for the HTTP bundle store.
//!
//! A minimal one-shot HTTP responder stands in for the remote runtime so the
//! full multipart upload path is exercised.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use playpen_common::{EngineConfig, Hostname, UploadError};
use playpen_core::toolchain::ENTRY_FILE;
use playpen_core::{Bundle, Toolchain, VirtualEnv, WasmEngine, WatToolchain};
use playpen_host::{BundleStore, HttpBundleStore};

async fn build_bundle() -> Bundle {
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    let toolchain = WatToolchain::new(engine);

    let mut env = VirtualEnv::new();
    env.write(ENTRY_FILE, r#"(module (func (export "_start")))"#);
    let output = toolchain.compile(&env).await;

    toolchain
        .link(output, &Hostname::derive("Upload", 1, "test"))
        .await
        .unwrap()
}

/// Accept one request, capture it, and answer with `status` and `body`.
async fn serve_once(status: &'static str, body: &'static str) -> (Url, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&request);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();

        String::from_utf8_lossy(&request).into_owned()
    });

    (Url::parse(&format!("http://{addr}")).unwrap(), handle)
}

#[tokio::test]
async fn test_upload_sends_multipart_with_token() {
    let bundle = build_bundle().await;
    let (origin, server) = serve_once(
        "200 OK",
        r#"{"id":"upload-1-test","content_hash":"abc","message":"Module uploaded successfully"}"#,
    )
    .await;

    let store = HttpBundleStore::new(Some("secret".into()), Duration::from_secs(5)).unwrap();
    let ack = store.upload(&origin, &bundle).await.unwrap();

    assert_eq!(ack.id, "upload-1-test");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /admin/modules "));
    assert!(request.to_ascii_lowercase().contains("x-admin-token: secret"));
    assert!(request.contains("name=\"id\""));
    assert!(request.contains("upload-1-test"));
    assert!(request.contains("filename=\"upload-1-test.wasm\""));
}

#[tokio::test]
async fn test_upload_rejected_status() {
    let bundle = build_bundle().await;
    let (origin, server) = serve_once("401 Unauthorized", r#"{"error":"nope"}"#).await;

    let store = HttpBundleStore::new(None, Duration::from_secs(5)).unwrap();
    let err = store.upload(&origin, &bundle).await.unwrap_err();

    assert!(matches!(err, UploadError::Rejected { status: 401 }));
    let request = server.await.unwrap();
    assert!(!request.to_ascii_lowercase().contains("x-admin-token"));
}

#[tokio::test]
async fn test_upload_unreachable_origin() {
    let bundle = build_bundle().await;

    // Bind and drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let store = HttpBundleStore::new(None, Duration::from_secs(5)).unwrap();
    let origin = Url::parse(&format!("http://{addr}")).unwrap();
    let err = store.upload(&origin, &bundle).await.unwrap_err();

    assert!(matches!(err, UploadError::Request { .. }));
}
