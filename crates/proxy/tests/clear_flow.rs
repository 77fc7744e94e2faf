//! End-to-end request handling against a local fake upstream: passthrough,
//! retry replay, the CLEAR reset, the planning clear and a memory outage.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};

use dg_domain::config::Config;
use dg_domain::error::{Error, Result};
use dg_domain::task::{TaskRecord, TriggerReason};
use dg_memory::{MemoryDto, MemoryProvider, MemoryQuery};
use dg_proxy::runtime::handle_messages;
use dg_proxy::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fakes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Default)]
struct Upstream {
    /// Raw bodies received, in order.
    bodies: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Scripted replies; an `end_turn` text reply once exhausted.
    replies: Arc<Mutex<VecDeque<Value>>>,
}

impl Upstream {
    fn body(&self, i: usize) -> Value {
        serde_json::from_slice(&self.bodies.lock()[i]).unwrap()
    }

    fn raw(&self, i: usize) -> Vec<u8> {
        self.bodies.lock()[i].clone()
    }

    fn calls(&self) -> usize {
        self.bodies.lock().len()
    }
}

async fn messages(State(up): State<Upstream>, body: Bytes) -> impl IntoResponse {
    up.bodies.lock().push(body.to_vec());
    let reply = up.replies.lock().pop_front().unwrap_or_else(|| {
        json!({
            "id": "m", "type": "message", "role": "assistant", "model": "t",
            "content": [{"type": "text", "text": "ok"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 2}
        })
    });
    axum::Json(reply)
}

async fn spawn_upstream() -> (String, Upstream) {
    let state = Upstream::default();
    let app = Router::new()
        .route("/v1/messages", post(messages))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

#[derive(Default)]
struct FakeMemory {
    fetches: AtomicUsize,
    synced: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl MemoryProvider for FakeMemory {
    async fn fetch_team_memories(&self, _query: MemoryQuery) -> Result<Vec<MemoryDto>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![MemoryDto {
            id: Some("mem-1".into()),
            goal: "Fix login redirect".into(),
            summary: Some("Redirect now keeps the return URL.".into()),
            files_touched: vec!["src/login.rs".into()],
            decisions: vec![],
            constraints: vec![],
            score: Some(0.9),
            created_at: None,
        }])
    }

    async fn sync_task(&self, task: &TaskRecord) -> Result<()> {
        self.synced.lock().push(task.id.clone());
        Ok(())
    }

    async fn health(&self) -> Result<Value> {
        Ok(json!({ "status": "ok" }))
    }
}

/// Memory that is down: every lookup hangs for a while, then fails.
#[derive(Default)]
struct DownMemory {
    fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl MemoryProvider for DownMemory {
    async fn fetch_team_memories(&self, _query: MemoryQuery) -> Result<Vec<MemoryDto>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(400)).await;
        Err(Error::Memory("connection refused".into()))
    }

    async fn sync_task(&self, _task: &TaskRecord) -> Result<()> {
        Err(Error::Memory("connection refused".into()))
    }

    async fn health(&self) -> Result<Value> {
        Err(Error::Memory("connection refused".into()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn config(base_url: &str, state_path: &std::path::Path) -> Config {
    let mut cfg = Config::default();
    cfg.server.state_path = state_path.to_path_buf();
    cfg.upstream.base_url = base_url.to_owned();
    cfg.injection.clear_threshold_tokens = 1_000;
    cfg.injection.summary_precompute_ratio = 0.5;
    cfg.extended_cache.enabled = true;
    cfg
}

fn headers(session: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert("x-session-id", HeaderValue::from_str(session).unwrap());
    h.insert("x-project-path", HeaderValue::from_static("/repo"));
    h.insert("content-type", HeaderValue::from_static("application/json"));
    h
}

fn edit_reply(id: &str, input_tokens: u64) -> Value {
    json!({
        "id": format!("m-{id}"), "type": "message", "role": "assistant", "model": "t",
        "content": [
            {"type": "text", "text": "I'll use a cursor because offsets drift between pages."},
            {"type": "tool_use", "id": id, "name": "Edit",
             "input": {"file_path": "/repo/src/page.rs", "old_string": "a", "new_string": "b"}}
        ],
        "stop_reason": "tool_use",
        "usage": {"input_tokens": input_tokens, "output_tokens": 10}
    })
}

fn read_reply(id: &str) -> Value {
    json!({
        "id": format!("m-{id}"), "type": "message", "role": "assistant", "model": "t",
        "content": [
            {"type": "text", "text": "Reading the pagination code to plan the change."},
            {"type": "tool_use", "id": id, "name": "Read", "input": {"file_path": "/repo/src/page.rs"}}
        ],
        "stop_reason": "tool_use",
        "usage": {"input_tokens": 80, "output_tokens": 10}
    })
}

fn tool_use(id: &str) -> Value {
    json!({"role": "assistant", "content": [
        {"type": "tool_use", "id": id, "name": "Edit",
         "input": {"file_path": "/repo/src/page.rs", "old_string": "a", "new_string": "b"}}
    ]})
}

fn tool_result(id: &str) -> Value {
    json!({"role": "user", "content": [{"type": "tool_result", "tool_use_id": id, "content": "ok"}]})
}

fn request(messages: &[Value]) -> Bytes {
    Bytes::from(
        serde_json::to_vec(&json!({"model": "m", "max_tokens": 512, "messages": messages})).unwrap(),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn untouched_request_is_forwarded_byte_for_byte() {
    let (url, up) = spawn_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&url, dir.path());
    cfg.injection.static_enabled = false;
    cfg.injection.dynamic_enabled = false;
    let app = AppState::with_collaborators(Arc::new(cfg), None, None).unwrap();

    let raw = Bytes::from_static(
        b"{\"model\":\"m\",  \"max_tokens\":16,\"messages\":[{\"role\":\"user\",\"content\":\"Rename Foo to Bar\"}]}",
    );
    let reply = handle_messages(&app, &headers("s-pass"), raw.clone()).await.unwrap();

    assert_eq!(reply.status, 200);
    assert_eq!(up.raw(0), raw.to_vec());
    let session = app.sessions.get("s-pass").unwrap();
    assert_eq!(session.goal, "Rename Foo to Bar");
    assert_eq!(session.project, "/repo");
    assert!(app.extended_cache.get("/repo").is_some());
}

#[tokio::test]
async fn retry_replays_previous_outbound_bytes() {
    let (url, up) = spawn_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let app = AppState::with_collaborators(
        Arc::new(config(&url, dir.path())),
        None,
        Some(Arc::new(FakeMemory::default())),
    )
    .unwrap();
    up.replies.lock().push_back(edit_reply("tu1", 100));

    let raw = request(&[json!({"role": "user", "content": "Fix the pagination bug in src/page.rs"})]);
    handle_messages(&app, &headers("s-retry"), raw.clone()).await.unwrap();
    handle_messages(&app, &headers("s-retry"), raw).await.unwrap();

    assert_eq!(up.calls(), 2);
    assert_eq!(up.raw(0), up.raw(1));
    // The first outbound carried the team memory block.
    assert!(up.body(0)["system"]
        .as_str()
        .unwrap()
        .contains("driftguard-team-memory"));
}

#[tokio::test]
async fn clear_resets_history_and_keeps_the_prefix_stable() {
    let (url, up) = spawn_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(FakeMemory::default());
    let app = AppState::with_collaborators(
        Arc::new(config(&url, dir.path())),
        None,
        Some(memory.clone()),
    )
    .unwrap();
    let h = headers("s-clear");
    {
        let mut replies = up.replies.lock();
        replies.push_back(edit_reply("tu1", 1_200));
        replies.push_back(edit_reply("tu2", 1_200));
        replies.push_back(edit_reply("tu3", 50));
        replies.push_back(edit_reply("tu4", 60));
    }

    let first = json!({"role": "user", "content": "Fix the pagination bug in src/page.rs. Do not change the public API."});
    let mut history = vec![first];

    // 1. First turn: crosses the precompute mark, summary parked.
    handle_messages(&app, &h, request(&history)).await.unwrap();
    let s = app.sessions.get("s-clear").unwrap();
    let original_task = s.task_id.clone();
    assert_eq!(s.token_count, 1_210);
    assert!(matches!(
        s.pending,
        Some(dg_sessions::PendingAction::ClearSummary { .. })
    ));

    // 2. Continuation: over the threshold, but never cleared mid-loop.
    history.push(tool_use("tu1"));
    history.push(tool_result("tu1"));
    handle_messages(&app, &h, request(&history)).await.unwrap();
    assert_eq!(up.body(1)["messages"].as_array().unwrap().len(), 3);

    // 3. The user speaks again: CLEAR.
    history.push(tool_use("tu2"));
    history.push(json!({"role": "user", "content": [
        {"type": "tool_result", "tool_use_id": "tu2", "content": "ok"},
        {"type": "text", "text": "Also add a regression test for page 0."}
    ]}));
    let fetches_before = memory.fetches.load(Ordering::SeqCst);
    handle_messages(&app, &h, request(&history)).await.unwrap();

    let cleared = up.body(2);
    let msgs = cleared["messages"].as_array().unwrap();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].to_string().contains("regression test for page 0"));
    let system = cleared["system"].as_str().unwrap();
    assert!(system.contains("<driftguard-summary>"));
    assert!(system.contains("Goal: Fix the pagination bug"));
    assert!(system.contains("/repo/src/page.rs"));
    // Static channel was invalidated and rebuilt.
    assert!(memory.fetches.load(Ordering::SeqCst) > fetches_before);

    let s = app.sessions.get("s-clear").unwrap();
    assert_ne!(s.task_id, original_task);
    assert_eq!(s.token_count, 60);
    assert!(s.pending.is_none());
    assert!(s.clear_point.is_some());

    let records = app.tasks.list();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, original_task);
    assert!(matches!(records[0].trigger, TriggerReason::Threshold));
    assert!(records[0].files_touched.contains(&"/repo/src/page.rs".to_string()));

    // 4. The agent keeps sending its full history; the proxy keeps sending
    //    the cleared view with an identical prefix.
    history.push(tool_use("tu3"));
    history.push(tool_result("tu3"));
    handle_messages(&app, &h, request(&history)).await.unwrap();

    let after = up.body(3);
    let msgs = after["messages"].as_array().unwrap();
    assert_eq!(msgs.len(), 3);
    assert_eq!(msgs[0], cleared["messages"][0]);
    assert_eq!(after["system"], cleared["system"]);
}

#[tokio::test]
async fn read_only_task_carries_its_plan_into_a_cleared_next_turn() {
    let (url, up) = spawn_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(FakeMemory::default());
    let app = AppState::with_collaborators(
        Arc::new(config(&url, dir.path())),
        None,
        Some(memory.clone()),
    )
    .unwrap();
    let h = headers("s-plan");
    up.replies.lock().push_back(read_reply("tr1"));

    // 1. The agent reads, then ends its turn with a plan.
    let mut history = vec![json!({"role": "user", "content": "Plan how to switch src/page.rs to cursor pagination"})];
    handle_messages(&app, &h, request(&history)).await.unwrap();
    let task = app.sessions.get("s-plan").unwrap().task_id;

    history.push(json!({"role": "assistant", "content": [
        {"type": "tool_use", "id": "tr1", "name": "Read", "input": {"file_path": "/repo/src/page.rs"}}
    ]}));
    history.push(tool_result("tr1"));
    handle_messages(&app, &h, request(&history)).await.unwrap();

    // Synced, and the sync's invalidation has landed.
    for _ in 0..100 {
        let synced = app.tasks.get(&task).is_some_and(|r| r.synced_at.is_some());
        if synced && app.static_cache.get("/repo").is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(*memory.synced.lock(), vec![task.clone()]);
    let record = app.tasks.get(&task).unwrap();
    assert!(record.planning_only);
    let s = app.sessions.get("s-plan").unwrap();
    assert_ne!(s.task_id, task);
    assert!(matches!(
        s.pending,
        Some(dg_sessions::PendingAction::PlanningClear { .. })
    ));

    // 2. The user says go: history is cleared, the plan rides in the system
    //    prompt and the static channel is fetched fresh exactly once.
    history.push(json!({"role": "assistant", "content": "Plan: replace offsets with an opaque cursor."}));
    history.push(json!({"role": "user", "content": "Looks good, implement it."}));
    let fetches_before = memory.fetches.load(Ordering::SeqCst);
    handle_messages(&app, &h, request(&history)).await.unwrap();

    let sent = up.body(2);
    let msgs = sent["messages"].as_array().unwrap();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0]["content"], "Looks good, implement it.");
    let system = sent["system"].as_str().unwrap();
    let plan = dg_contextpack::injection::format_planning_summary(
        &dg_proxy::runtime::summary::planning_summary(&record),
    );
    assert!(system.contains(&plan));
    assert!(system.contains("Goal: Plan how to switch src/page.rs to cursor pagination"));
    assert!(system.contains("driftguard-team-memory"));
    assert_eq!(memory.fetches.load(Ordering::SeqCst), fetches_before + 1);

    let s = app.sessions.get("s-plan").unwrap();
    assert!(s.pending.is_none());
    assert_eq!(s.clear_point.as_ref().map(|c| c.dropped), Some(4));
}

#[tokio::test]
async fn memory_outage_costs_one_lookup_not_one_per_turn() {
    let (url, up) = spawn_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let memory = Arc::new(DownMemory::default());
    let app = AppState::with_collaborators(
        Arc::new(config(&url, dir.path())),
        None,
        Some(memory.clone()),
    )
    .unwrap();

    let mut history = vec![json!({"role": "user", "content": "Fix the pagination bug in src/page.rs"})];
    handle_messages(&app, &headers("s-down"), request(&history)).await.unwrap();

    for turn in ["and the tests?", "thanks"] {
        history.push(json!({"role": "assistant", "content": "Done."}));
        history.push(json!({"role": "user", "content": turn}));
        let started = Instant::now();
        let reply = handle_messages(&app, &headers("s-down"), request(&history)).await.unwrap();
        assert_eq!(reply.status, 200);
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    assert_eq!(memory.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(up.calls(), 3);
    assert!(up.body(2).get("system").is_none());
}
