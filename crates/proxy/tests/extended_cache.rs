//! Extended Cache Keeper against a local fake upstream.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

use dg_domain::config::{ExtendedCacheConfig, UpstreamConfig};
use dg_proxy::cache::ExtendedCache;
use dg_upstream::Forwarder;

const BODY: &[u8] = br#"{"model":"m", "system":"keep \"messages\": [] as is","messages":[{"role":"user","content":"hi ]"}],"max_tokens":8}"#;

#[derive(Clone)]
struct Upstream {
    bodies: Arc<Mutex<Vec<Vec<u8>>>>,
    status: Arc<AtomicU16>,
}

async fn messages(State(up): State<Upstream>, body: Bytes) -> impl IntoResponse {
    up.bodies.lock().push(body.to_vec());
    let status = StatusCode::from_u16(up.status.load(Ordering::SeqCst)).unwrap();
    (
        status,
        axum::Json(serde_json::json!({
            "id": "m", "type": "message", "role": "assistant", "model": "t",
            "content": [{"type": "text", "text": "."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        })),
    )
}

async fn spawn_upstream(status: u16) -> (Forwarder, Upstream) {
    let up = Upstream {
        bodies: Arc::default(),
        status: Arc::new(AtomicU16::new(status)),
    };
    let app = Router::new()
        .route("/v1/messages", post(messages))
        .with_state(up.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let forwarder = Forwarder::new(&UpstreamConfig {
        base_url: format!("http://{addr}"),
        ..Default::default()
    })
    .unwrap();
    (forwarder, up)
}

fn headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert("x-api-key", HeaderValue::from_static("sk-test"));
    h
}

fn keeper() -> ExtendedCache {
    ExtendedCache::new(ExtendedCacheConfig {
        keep_alive_after_secs: 240,
        max_idle_secs: 900,
        max_keep_alives: 2,
        ..Default::default()
    })
}

#[tokio::test]
async fn idle_past_max_is_evicted_without_keep_alive() {
    let (forwarder, up) = spawn_upstream(200).await;
    let cache = keeper();
    let now = Utc::now();
    cache.record("/repo", headers(), Bytes::from_static(BODY), now - Duration::seconds(1_000));

    let report = cache.tick(&forwarder, now).await;

    assert_eq!(report.sent, 0);
    assert_eq!(report.evicted, vec!["/repo".to_string()]);
    assert!(cache.is_empty());
    assert!(up.bodies.lock().is_empty());
}

#[tokio::test]
async fn keep_alive_is_a_byte_exact_splice_and_counts_only_on_200() {
    let (forwarder, up) = spawn_upstream(200).await;
    let cache = keeper();
    let start = Utc::now();
    cache.record("/repo", headers(), Bytes::from_static(BODY), start);

    // Not due yet.
    let report = cache.tick(&forwarder, start + Duration::seconds(60)).await;
    assert_eq!(report.sent, 0);

    // Due: one keep-alive, spliced before the closing bracket.
    let t1 = start + Duration::seconds(250);
    let report = cache.tick(&forwarder, t1).await;
    assert_eq!((report.sent, report.succeeded), (1, 1));
    let sent = up.bodies.lock()[0].clone();
    let close = BODY.iter().rposition(|&b| b == b']').unwrap();
    assert_eq!(&sent[..close], &BODY[..close]);
    assert_eq!(&sent[sent.len() - (BODY.len() - close)..], &BODY[close..]);
    let v: serde_json::Value = serde_json::from_slice(&sent).unwrap();
    assert_eq!(v["messages"].as_array().unwrap().len(), 2);
    assert_eq!(v["system"], "keep \"messages\": [] as is");

    let entry = cache.get("/repo").unwrap();
    assert_eq!(entry.keep_alives_sent, 1);
    assert_eq!(entry.last_activity, t1);
    assert_eq!(entry.body, Bytes::from_static(BODY));

    // Second attempt, then the cap.
    let t2 = t1 + Duration::seconds(250);
    assert_eq!(cache.tick(&forwarder, t2).await.succeeded, 1);
    let report = cache.tick(&forwarder, t2 + Duration::seconds(250)).await;
    assert_eq!(report.sent, 0);
    assert_eq!(report.evicted, vec!["/repo".to_string()]);
    assert_eq!(up.bodies.lock().len(), 2);
}

#[tokio::test]
async fn non_200_evicts_without_counting() {
    let (forwarder, up) = spawn_upstream(529).await;
    let cache = keeper();
    let start = Utc::now();
    cache.record("/repo", headers(), Bytes::from_static(BODY), start);

    let report = cache.tick(&forwarder, start + Duration::seconds(250)).await;

    assert_eq!((report.sent, report.succeeded), (1, 0));
    assert_eq!(report.evicted, vec!["/repo".to_string()]);
    assert!(cache.get("/repo").is_none());
    assert_eq!(up.bodies.lock().len(), 1);
}

#[tokio::test]
async fn unreachable_upstream_evicts() {
    let forwarder = Forwarder::new(&UpstreamConfig {
        base_url: "http://127.0.0.1:1".into(),
        connect_timeout_ms: 500,
        ..Default::default()
    })
    .unwrap();
    let cache = keeper();
    let start = Utc::now();
    cache.record("/repo", headers(), Bytes::from_static(BODY), start);

    let report = cache.tick(&forwarder, start + Duration::seconds(250)).await;

    assert_eq!(report.sent, 1);
    assert_eq!(report.evicted, vec!["/repo".to_string()]);
}

#[tokio::test]
async fn a_real_request_during_the_tick_wins() {
    let (forwarder, _up) = spawn_upstream(529).await;
    let cache = Arc::new(keeper());
    let start = Utc::now();
    cache.record("/repo", headers(), Bytes::from_static(BODY), start);
    let later = start + Duration::seconds(250);

    // A real request lands after planning but before the results are
    // applied: the rejected keep-alive must not evict the fresh entry.
    let tick = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.tick(&forwarder, later).await })
    };
    cache.record("/repo", headers(), Bytes::from_static(BODY), later);
    tick.await.unwrap();

    // Either the tick planned before the record (stale generation) or after
    // (not due yet); in both cases the fresh entry survives.
    let entry = cache.get("/repo").unwrap();
    assert_eq!(entry.last_activity, later);
    assert_eq!(entry.keep_alives_sent, 0);
}
