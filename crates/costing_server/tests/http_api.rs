use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use costing_core::db::open_db;
use costing_core::SchemaProfile;
use costing_server::config::ServerConfig;
use costing_server::http::{router, AppState};
use costing_server::relay::FALLBACK_MESSAGE;
use futures_util::stream::{self, StreamExt};
use rusqlite::params;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct TestServer {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = self.handle.await;
    }
}

async fn serve(app: Router) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local_addr should succeed");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
    });

    TestServer {
        base_url: format!("http://{}", addr),
        shutdown: Some(shutdown_tx),
        handle,
    }
}

fn seed_store(path: &Path) {
    let conn = open_db(path).unwrap();
    conn.execute_batch(
        "INSERT INTO sys_dept (dept_id, dept_name) VALUES (1, '车身部'), (2, '动力部');",
    )
    .unwrap();
    for (id, name, tag, status) in [
        (100, "A车型测算", "0", "20"),
        (77, "无人项目", "0", "20"),
        (200, "历史项目", "1", "40"),
    ] {
        conn.execute(
            "INSERT INTO lis_project (id, measures_project, measure_tag, measure_status, brand, sml)
             VALUES (?1, ?2, ?3, ?4, '10', '1');",
            params![id, name, tag, status],
        )
        .unwrap();
    }
    for (id, project_id, person, person_id, dept) in [
        (1, "100", "张三", "P1", "1"),
        (2, "100", "张三", "P1", "2"),
        (3, "200", "李四", "P2", "1"),
    ] {
        conn.execute(
            "INSERT INTO lis_measure_person
                (id, project_id, person, measure_person_id, person_department)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![id, project_id, person, person_id, dept],
        )
        .unwrap();
    }
    conn.execute_batch(
        "INSERT INTO lis_project_order (id, project_id, order_name, power_conf, market)
         VALUES (1, '100', 'O-1', 'PC-A', '国内'), (2, '100', 'O-1', 'PC-B', '国内');
         INSERT INTO lis_sheet_control (id, dept_id, sheet_name)
         VALUES (1, '1', '成本汇总'), (2, '01', '材料清单');",
    )
    .unwrap();
}

fn app_state(db_path: &Path, llm_base_url: &str) -> AppState {
    app_state_with_timeout(db_path, llm_base_url, 5)
}

fn app_state_with_timeout(db_path: &Path, llm_base_url: &str, timeout_secs: u64) -> AppState {
    let kv = HashMap::from([
        (
            "COSTING_DB_PATH".to_string(),
            db_path.to_str().unwrap().to_string(),
        ),
        ("COSTING_LLM_BASE_URL".to_string(), llm_base_url.to_string()),
        (
            "COSTING_LLM_TIMEOUT_SECS".to_string(),
            timeout_secs.to_string(),
        ),
        (
            "COSTING_SYSTEM_PROMPT".to_string(),
            "你是测算助手".to_string(),
        ),
    ]);
    let config = ServerConfig::from_kv(&kv).unwrap();
    AppState::new(&config, SchemaProfile::default()).unwrap()
}

async fn spawn_app(db_path: &Path, llm_base_url: &str) -> TestServer {
    serve(router(app_state(db_path, llm_base_url))).await
}

async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/v1", addr)
}

async fn get_json(url: &str) -> (u16, serde_json::Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn task_routes_are_served_under_prefix_and_root() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("costing.db");
    seed_store(&db_path);
    let server = spawn_app(&db_path, &unreachable_base_url().await).await;

    for prefix in ["/api/v1/bfa", ""] {
        let (status, body) = get_json(&format!("{}{}/tasks", server.base_url, prefix)).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "success");
        let tasks = body["data"].as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["id"], 100);
        assert_eq!(tasks[0]["department"], "车身部");
        assert_eq!(tasks[0]["brand"], "自主品牌");
    }

    let (_, filtered) = get_json(&format!("{}/tasks?person_id=P2", server.base_url)).await;
    assert!(filtered["data"].as_array().unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn task_detail_maps_errors_to_status_codes() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("costing.db");
    seed_store(&db_path);
    let server = spawn_app(&db_path, &unreachable_base_url().await).await;
    let base = format!("{}/api/v1/bfa", server.base_url);

    let (status, body) = get_json(&format!("{base}/tasks/0100")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["projectId"], 100);
    assert_eq!(body["data"]["orderInfo"], "O-1");
    assert_eq!(body["data"]["powerConfig"], "PC-A,PC-B");
    assert_eq!(
        body["data"]["visibleSheets"],
        serde_json::json!(["成本汇总", "材料清单"])
    );

    let (status, body) = get_json(&format!("{base}/tasks/77")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["calculator"], "");

    let (status, body) = get_json(&format!("{base}/tasks/4040")).await;
    assert_eq!(status, 404);
    assert_eq!(body["status"], "error");

    let (status, _) = get_json(&format!("{base}/tasks/100?person_id=P2&department_id=1")).await;
    assert_eq!(status, 404);

    let (status, body) = get_json(&format!("{base}/tasks/100?person_id=P1")).await;
    assert_eq!(status, 400);
    assert_eq!(body["status"], "error");

    server.stop().await;
}

#[tokio::test]
async fn reference_history_person_and_sheet_routes() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("costing.db");
    seed_store(&db_path);
    let server = spawn_app(&db_path, &unreachable_base_url().await).await;
    let base = &server.base_url;

    let (status, body) =
        get_json(&format!("{base}/tasks/100/reference-projects?department_id=1")).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["id"], 200);

    let (status, body) = get_json(&format!("{base}/tasks/200/reference-projects?department_id=1")).await;
    assert_eq!(status, 200);
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, _) = get_json(&format!("{base}/tasks/100/reference-projects")).await;
    assert_eq!(status, 400);

    let (_, body) = get_json(&format!("{base}/history")).await;
    assert_eq!(body["data"][0]["status"], "已完成");

    let (_, body) = get_json(&format!("{base}/persons")).await;
    assert_eq!(body["data"][0]["department"], "车身部,动力部");

    let (_, body) = get_json(&format!("{base}/departments/1/sheets")).await;
    assert_eq!(body["data"], serde_json::json!(["成本汇总", "材料清单"]));

    let (status, body) = get_json(&format!("{base}/health")).await;
    assert_eq!(status, 200);
    assert!(!body["data"]["version"].as_str().unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn store_failure_is_redacted() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("costing.db");
    seed_store(&db_path);
    let server = spawn_app(&db_path, &unreachable_base_url().await).await;

    std::fs::remove_file(&db_path).unwrap();
    let (status, body) = get_json(&format!("{}/tasks", server.base_url)).await;
    assert_eq!(status, 500);
    assert_eq!(body["message"], "internal server error");

    server.stop().await;
}

#[tokio::test]
async fn chat_without_message_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("costing.db");
    seed_store(&db_path);
    let server = spawn_app(&db_path, &unreachable_base_url().await).await;
    let client = reqwest::Client::new();

    for payload in [serde_json::json!({}), serde_json::json!({ "message": 42 })] {
        let response = client
            .post(format!("{}/chat", server.base_url))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "error");
    }

    server.stop().await;
}

#[tokio::test]
async fn chat_with_unreachable_upstream_streams_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("costing.db");
    seed_store(&db_path);
    let server = spawn_app(&db_path, &unreachable_base_url().await).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/bfa/chat", server.base_url))
        .json(&serde_json::json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(response.text().await.unwrap(), FALLBACK_MESSAGE);

    server.stop().await;
}

type Captured = Arc<Mutex<Option<serde_json::Value>>>;

async fn mock_completions(
    State(captured): State<Captured>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    *captured.lock().unwrap() = Some(body);
    let events = [
        r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"测算"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"完成"}}]}"#,
        "data: [DONE]",
    ];
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        events.map(|event| format!("{event}\n\n")).concat(),
    )
}

#[tokio::test]
async fn chat_relays_upstream_deltas() {
    let captured: Captured = Arc::new(Mutex::new(None));
    let upstream = serve(
        Router::new()
            .route("/v1/chat/completions", post(mock_completions))
            .with_state(Arc::clone(&captured)),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("costing.db");
    seed_store(&db_path);
    let server = spawn_app(&db_path, &format!("{}/v1", upstream.base_url)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/chat", server.base_url))
        .json(&serde_json::json!({ "message": "帮我估算" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "测算完成");

    let request = captured.lock().unwrap().clone().unwrap();
    assert_eq!(request["stream"], true);
    assert_eq!(request["temperature"], 0.0);
    assert_eq!(request["messages"][0]["role"], "system");
    assert_eq!(request["messages"][0]["content"], "你是测算助手");
    assert_eq!(request["messages"][1]["content"], "帮我估算");

    server.stop().await;
    upstream.stop().await;
}

#[tokio::test]
async fn chat_with_failing_upstream_status_streams_fallback() {
    async fn unavailable() -> impl IntoResponse {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    }
    let upstream = serve(Router::new().route("/v1/chat/completions", post(unavailable))).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("costing.db");
    seed_store(&db_path);
    let server = spawn_app(&db_path, &format!("{}/v1", upstream.base_url)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/chat", server.base_url))
        .json(&serde_json::json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), FALLBACK_MESSAGE);

    server.stop().await;
    upstream.stop().await;
}

fn sse_delta(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "delta": { "content": text } }] })
    )
}

fn event_stream(body: Body) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/event-stream")], body)
}

async fn spawn_streaming_chat<H, T>(handler: H) -> (TestServer, TestServer, tempfile::TempDir)
where
    H: axum::handler::Handler<T, ()>,
    T: 'static,
{
    spawn_streaming_chat_with_timeout(handler, 5).await
}

async fn spawn_streaming_chat_with_timeout<H, T>(
    handler: H,
    timeout_secs: u64,
) -> (TestServer, TestServer, tempfile::TempDir)
where
    H: axum::handler::Handler<T, ()>,
    T: 'static,
{
    let upstream = serve(Router::new().route("/v1/chat/completions", post(handler))).await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("costing.db");
    seed_store(&db_path);
    let base_url = format!("{}/v1", upstream.base_url);
    let server = serve(router(app_state_with_timeout(&db_path, &base_url, timeout_secs))).await;
    (server, upstream, dir)
}

async fn post_chat(server: &TestServer, message: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/chat", server.base_url))
        .json(&serde_json::json!({ "message": message }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn slow_generation_longer_than_timeout_is_not_cut_off() {
    async fn slow_completions() -> impl IntoResponse {
        let deltas = stream::unfold(0u32, |n| async move {
            if n > 4 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(400)).await;
            let event = if n < 4 {
                sse_delta(&format!("t{n}"))
            } else {
                "data: [DONE]\n\n".to_string()
            };
            Some((Ok::<_, Infallible>(event), n + 1))
        });
        event_stream(Body::from_stream(deltas))
    }

    let (server, upstream, _dir) = spawn_streaming_chat_with_timeout(slow_completions, 1).await;

    let response = post_chat(&server, "慢慢来").await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "t0t1t2t3");

    server.stop().await;
    upstream.stop().await;
}

#[tokio::test]
async fn first_delta_reaches_client_before_upstream_finishes() {
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let release_rx = Arc::new(Mutex::new(Some(release_rx)));
    let gated_completions = move || {
        let release_rx = release_rx.lock().unwrap().take();
        async move {
            let first = stream::iter([Ok::<_, Infallible>(sse_delta("先到"))]);
            let rest = stream::once(async move {
                if let Some(release_rx) = release_rx {
                    let _ = release_rx.await;
                }
                Ok::<_, Infallible>(format!("{}data: [DONE]\n\n", sse_delta("后到")))
            });
            event_stream(Body::from_stream(first.chain(rest)))
        }
    };

    let (server, upstream, _dir) = spawn_streaming_chat(gated_completions).await;

    let mut response = post_chat(&server, "hi").await;
    let first = tokio::time::timeout(Duration::from_secs(5), response.chunk())
        .await
        .expect("first chunk should arrive while upstream is still open")
        .unwrap()
        .unwrap();
    assert_eq!(String::from_utf8_lossy(&first), "先到");

    release_tx.send(()).unwrap();
    let mut rest = Vec::new();
    while let Some(chunk) = response.chunk().await.unwrap() {
        rest.extend_from_slice(&chunk);
    }
    assert_eq!(String::from_utf8_lossy(&rest), "后到");

    server.stop().await;
    upstream.stop().await;
}

struct DropSignal(Option<oneshot::Sender<()>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(signal) = self.0.take() {
            let _ = signal.send(());
        }
    }
}

#[tokio::test]
async fn client_disconnect_drops_upstream_stream() {
    let (dropped_tx, dropped_rx) = oneshot::channel::<()>();
    let dropped_tx = Arc::new(Mutex::new(Some(dropped_tx)));
    let endless_completions = move || {
        let signal = DropSignal(dropped_tx.lock().unwrap().take());
        async move {
            let deltas = stream::unfold((0u64, signal), |(n, signal)| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Some((Ok::<_, Infallible>(sse_delta(&format!("t{n}"))), (n + 1, signal)))
            });
            event_stream(Body::from_stream(deltas))
        }
    };

    let (server, upstream, _dir) = spawn_streaming_chat(endless_completions).await;

    let mut response = post_chat(&server, "hi").await;
    let first = response.chunk().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).starts_with("t0"));
    drop(response);

    tokio::time::timeout(Duration::from_secs(5), dropped_rx)
        .await
        .expect("upstream body should be dropped after the client disconnects")
        .unwrap();

    server.stop().await;
    upstream.stop().await;
}
