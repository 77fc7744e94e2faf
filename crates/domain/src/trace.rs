use serde::Serialize;

/// Structured trace events emitted across all driftguard crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    UpstreamRequest {
        path: String,
        status: u16,
        streamed: bool,
        duration_ms: u64,
        body_bytes: usize,
    },
    StreamReconstructed {
        blocks: usize,
        skipped_lines: usize,
        stop_reason: Option<String>,
    },
    DriftScored {
        session_id: String,
        score: u8,
        effective_score: i32,
        escalation_count: u32,
    },
    CorrectionIssued {
        session_id: String,
        level: String,
        escalation_count: u32,
    },
    ClearPerformed {
        session_id: String,
        project: String,
        reason: String,
        summary_chars: usize,
    },
    StaticContextBuilt {
        project: String,
        memories: usize,
        chars: usize,
    },
    KeepAliveSent {
        project: String,
        attempt: u32,
        status: u16,
    },
    KeepAliveEvicted {
        project: String,
        reason: String,
    },
    TaskFinalized {
        session_id: String,
        task_id: String,
        trigger: String,
        steps: usize,
    },
    MemorySync {
        task_id: String,
        ok: bool,
        duration_ms: u64,
    },
    SessionSwept {
        session_id: String,
        idle_minutes: i64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "dg_event");
    }
}
