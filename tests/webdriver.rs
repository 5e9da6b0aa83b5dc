//! WebDriver client against a stub driver
//!
//! The stub is a small axum app answering the classic endpoints the harness
//! uses, recording every request it sees.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use layaudio::harness::console::{ConsoleMessage, CONSOLE_DRAIN_SCRIPT};
use layaudio::harness::page::INNER_TEXT_SCRIPT;
use layaudio::harness::session::{WebDriverPage, SCRIPT_CLICK};
use layaudio::harness::BrowserPage;
use layaudio::webdriver::{ElementRef, WebDriverClient, ELEMENT_KEY};
use layaudio::{Engine, Error};
use serde_json::{json, Value};
use tokio::net::TcpListener;

type Log = Arc<Mutex<Vec<String>>>;

fn record(log: &Log, entry: String) {
    log.lock().unwrap().push(entry);
}

fn no_such_element(selector: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "value": {
            "error": "no such element",
            "message": format!("Unable to locate element: {}", selector),
            "stacktrace": ""
        }})),
    )
}

fn stub(log: Log) -> Router {
    Router::new()
        .route(
            "/status",
            get(|| async { Json(json!({ "value": { "ready": true, "message": "stub ready" } })) }),
        )
        .route(
            "/session",
            post(|State(log): State<Log>, Json(body): Json<Value>| async move {
                record(&log, format!("new session {}", body["capabilities"]["alwaysMatch"]["browserName"]));
                Json(json!({ "value": {
                    "sessionId": "s-1",
                    "capabilities": { "browserName": "stub", "browserVersion": "1.0" }
                }}))
            }),
        )
        .route(
            "/session/{id}",
            delete(|State(log): State<Log>, Path(id): Path<String>| async move {
                record(&log, format!("delete {}", id));
                Json(json!({ "value": null }))
            }),
        )
        .route(
            "/session/{id}/timeouts",
            post(|State(log): State<Log>, Json(body): Json<Value>| async move {
                record(&log, format!("timeouts {} {}", body["pageLoad"], body["script"]));
                Json(json!({ "value": null }))
            }),
        )
        .route(
            "/session/{id}/url",
            post(|State(log): State<Log>, Json(body): Json<Value>| async move {
                record(&log, format!("url {}", body["url"].as_str().unwrap_or_default()));
                Json(json!({ "value": null }))
            }),
        )
        .route(
            "/session/{id}/element",
            post(|Json(body): Json<Value>| async move {
                let selector = body["value"].as_str().unwrap_or_default().to_string();
                assert_eq!(body["using"], "css selector");
                if ["#vendorStatus", "#startBtn", "#songInput"].contains(&selector.as_str()) {
                    (StatusCode::OK, Json(json!({ "value": { ELEMENT_KEY: format!("el{}", selector) } })))
                } else {
                    no_such_element(&selector)
                }
            }),
        )
        .route(
            "/session/{id}/element/{element}/click",
            post(|State(log): State<Log>, Path((_, element)): Path<(String, String)>| async move {
                record(&log, format!("click {}", element));
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "value": {
                        "error": "element not interactable",
                        "message": format!("{} is hidden", element)
                    }})),
                )
            }),
        )
        .route(
            "/session/{id}/element/{element}/value",
            post(|State(log): State<Log>, Path((_, element)): Path<(String, String)>, Json(body): Json<Value>| async move {
                record(&log, format!("value {} {}", element, body["text"].as_str().unwrap_or_default()));
                Json(json!({ "value": null }))
            }),
        )
        .route(
            "/session/{id}/execute/sync",
            post(|State(log): State<Log>, Json(body): Json<Value>| async move {
                let script = body["script"].as_str().unwrap_or_default();
                let value = if script == SCRIPT_CLICK {
                    record(&log, format!("script click {}", body["args"][0][ELEMENT_KEY].as_str().unwrap_or_default()));
                    Value::Null
                } else if script == INNER_TEXT_SCRIPT {
                    match body["args"][0].as_str() {
                        Some("#vendorStatus") => json!("Audio engine: native"),
                        Some("#count") => json!(42),
                        _ => Value::Null,
                    }
                } else if script == CONSOLE_DRAIN_SCRIPT {
                    json!([{ "level": "warn", "text": "decoder fallback" }, { "text": "ready" }])
                } else {
                    json!({ "script": body["script"], "args": body["args"] })
                };
                Json(json!({ "value": value }))
            }),
        )
        .route(
            "/session/{id}/execute/async",
            post(|Json(body): Json<Value>| async move {
                if body["script"] == "hang" {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Json(json!({ "value": { "data": "UklGRg==" } }))
            }),
        )
        .with_state(log)
}

async fn start_stub() -> (String, Log) {
    let log = Log::default();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = stub(log.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), log)
}

async fn connected_client() -> (WebDriverClient, Log) {
    let (base_url, log) = start_stub().await;
    let mut client = WebDriverClient::new(base_url).unwrap();
    client
        .new_session(json!({ "browserName": "firefox" }), Duration::from_secs(5))
        .await
        .unwrap();
    (client, log)
}

#[tokio::test]
async fn test_status_and_session_lifecycle() {
    let (base_url, log) = start_stub().await;
    let mut client = WebDriverClient::new(base_url).unwrap();

    assert!(client.is_ready().await.unwrap());
    assert!(client.session_id().is_none());

    client
        .new_session(json!({ "browserName": "firefox" }), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(client.session_id(), Some("s-1"));
    assert_eq!(client.capabilities["browserVersion"], "1.0");

    client
        .set_timeouts(Duration::from_secs(60), Duration::from_secs(180))
        .await
        .unwrap();
    client
        .navigate("http://localhost:8000/index.html", Duration::from_secs(5))
        .await
        .unwrap();
    client.delete_session().await.unwrap();
    assert!(client.session_id().is_none());
    // Second delete is a no-op
    client.delete_session().await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "new session \"firefox\"".to_string(),
            "timeouts 60000 180000".to_string(),
            "url http://localhost:8000/index.html".to_string(),
            "delete s-1".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_find_element_maps_no_such_element_to_none() {
    let (client, _log) = connected_client().await;

    let found = client.find_element("#vendorStatus").await.unwrap();
    assert_eq!(found, Some(ElementRef("el#vendorStatus".to_string())));

    assert_eq!(client.find_element("#missing").await.unwrap(), None);
    assert!(matches!(
        client.require_element("#missing").await,
        Err(Error::ElementNotFound(selector)) if selector == "#missing"
    ));
}

#[tokio::test]
async fn test_wire_errors_carry_code_and_message() {
    let (client, _log) = connected_client().await;
    let button = client.require_element("#startBtn").await.unwrap();

    match client.click(&button).await {
        Err(Error::WebDriver {
            command,
            error,
            message,
        }) => {
            assert_eq!(command, "element click");
            assert_eq!(error, "element not interactable");
            assert_eq!(message, "el#startBtn is hidden");
        }
        other => panic!("expected wire error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_send_keys_passes_file_path() {
    let (client, log) = connected_client().await;
    let input = ElementRef("el#songInput".to_string());

    client.send_keys(&input, "/tmp/test_local.wav").await.unwrap();

    assert!(log
        .lock()
        .unwrap()
        .contains(&"value el#songInput /tmp/test_local.wav".to_string()));
}

#[tokio::test]
async fn test_execute_sends_script_and_args() {
    let (client, _log) = connected_client().await;
    let element = ElementRef("el-1".to_string());

    let value = client
        .execute("return arguments[0];", vec![json!("#x"), element.to_value()])
        .await
        .unwrap();

    assert_eq!(value["script"], "return arguments[0];");
    assert_eq!(value["args"][0], "#x");
    assert_eq!(value["args"][1][ELEMENT_KEY], "el-1");
}

#[tokio::test]
async fn test_execute_async_is_bounded() {
    let (client, _log) = connected_client().await;

    let value = client
        .execute_async("done()", Vec::new(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(value["data"], "UklGRg==");

    let err = client
        .execute_async("hang", Vec::new(), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");
}

#[tokio::test]
async fn test_commands_without_session_fail() {
    let (base_url, _log) = start_stub().await;
    let client = WebDriverClient::new(base_url).unwrap();

    assert!(matches!(
        client.navigate("http://localhost:8000/", Duration::from_secs(1)).await,
        Err(Error::Protocol(_))
    ));
}

#[tokio::test]
async fn test_page_click_falls_back_to_script_click() {
    let (client, log) = connected_client().await;
    let mut page = WebDriverPage::attach(Engine::Firefox, client);

    page.click("#startBtn").await.unwrap();

    let log = log.lock().unwrap();
    let clicks: Vec<&String> = log.iter().filter(|e| e.contains("click")).collect();
    assert_eq!(clicks, ["click el#startBtn", "script click el#startBtn"]);
}

#[tokio::test]
async fn test_page_inner_text() {
    let (client, _log) = connected_client().await;
    let mut page = WebDriverPage::attach(Engine::Chromium, client);

    assert_eq!(
        page.inner_text("#vendorStatus").await.unwrap(),
        "Audio engine: native"
    );
    assert!(matches!(
        page.inner_text("#missing").await,
        Err(Error::ElementNotFound(selector)) if selector == "#missing"
    ));
    assert!(matches!(page.inner_text("#count").await, Err(Error::Script(_))));
}

#[tokio::test]
async fn test_page_upload_sends_canonical_path() {
    let (client, log) = connected_client().await;
    let mut page = WebDriverPage::attach(Engine::Webkit, client);
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("song.wav"), b"RIFF").unwrap();

    page.set_input_file("#songInput", &dir.path().join(".").join("song.wav"))
        .await
        .unwrap();

    let canonical = dir.path().join("song.wav").canonicalize().unwrap();
    assert!(log
        .lock()
        .unwrap()
        .contains(&format!("value el#songInput {}", canonical.display())));

    assert!(matches!(
        page.set_input_file("#songInput", &dir.path().join("absent.wav")).await,
        Err(Error::FileRead { .. })
    ));
}

#[tokio::test]
async fn test_page_drains_console_shim() {
    let (client, _log) = connected_client().await;
    let mut page = WebDriverPage::attach(Engine::Webkit, client);

    assert_eq!(
        page.drain_console().await.unwrap(),
        vec![
            ConsoleMessage::new("warn", "decoder fallback"),
            ConsoleMessage::new("log", "ready"),
        ]
    );
}

#[tokio::test]
async fn test_page_close_deletes_session() {
    let (client, log) = connected_client().await;
    let mut page = WebDriverPage::attach(Engine::Firefox, client);

    page.close().await.unwrap();
    page.close().await.unwrap();

    let deletes = log
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.starts_with("delete"))
        .count();
    assert_eq!(deletes, 1);
    assert!(matches!(
        page.goto("http://localhost:8000/", Duration::from_secs(1)).await,
        Err(Error::Protocol(_))
    ));
}
