//! Dashboard HTTP API
//!
//! Read-only JSON endpoints over engine snapshots.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use crate::engine::{EngineSnapshot, SharedEngine};

/// Rules listed in the ranking
const TOP_PERFORMERS: usize = 5;
/// Signals a rule needs before it can be ranked
const TOP_MIN_SENT: u64 = 3;

/// Create the API router with all endpoints
pub fn create_router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/signals", get(get_signals))
        .route("/api/stats", get(get_stats))
        .route("/api/rules/:name", get(get_rule))
        .route("/api/health", get(get_health))
        .with_state(engine)
        // CORS for frontend
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// GET /api/snapshot - Complete engine state
async fn get_snapshot(State(engine): State<SharedEngine>) -> Json<ApiResponse<EngineSnapshot>> {
    Json(ApiResponse::success(engine.snapshot()))
}

/// GET /api/signals - Waiting and finalized signals
async fn get_signals(State(engine): State<SharedEngine>) -> Json<ApiResponse<SignalsResponse>> {
    let snapshot = engine.snapshot();
    Json(ApiResponse::success(SignalsResponse {
        active: snapshot.active_signals,
        finalized: snapshot.finalized_signals,
    }))
}

/// GET /api/stats - Per-rule hit rates
async fn get_stats(State(engine): State<SharedEngine>) -> Json<ApiResponse<StatsResponse>> {
    let snapshot = engine.snapshot();
    let rules: Vec<RuleStatsResponse> = snapshot.stats.values().map(Into::into).collect();
    let top_performers = engine
        .top_performers(TOP_PERFORMERS, TOP_MIN_SENT)
        .iter()
        .map(Into::into)
        .collect();

    Json(ApiResponse::success(StatsResponse {
        total_sent: rules.iter().map(|r| r.sent).sum(),
        total_hits: rules.iter().map(|r| r.hits).sum(),
        rules,
        top_performers,
    }))
}

/// GET /api/rules/:name - One rule's hit rate
async fn get_rule(
    State(engine): State<SharedEngine>,
    Path(name): Path<String>,
) -> Json<ApiResponse<RuleStatsResponse>> {
    match engine.rule_stats(&name) {
        Some(stats) => Json(ApiResponse::success((&stats).into())),
        None => Json(ApiResponse::error(format!("unknown rule: {}", name))),
    }
}

/// GET /api/health - Engine liveness and counters
async fn get_health(State(engine): State<SharedEngine>) -> Json<ApiResponse<HealthResponse>> {
    let snapshot = engine.snapshot();
    let status = if snapshot.recent_events.is_empty() {
        "waiting_for_events"
    } else {
        "ok"
    };
    Json(ApiResponse::success(HealthResponse {
        status: status.to_string(),
        active_signals: snapshot.active_signals.len(),
        pending_groups: snapshot.pending_groups.len(),
        last_event_at: snapshot.recent_events.first().map(|e| e.timestamp),
        diagnostics: snapshot.diagnostics,
        updated_at: snapshot.taken_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::{Engine, EngineConfig};
    use crate::types::{Category, Event, Timestamp};
    use chrono::{FixedOffset, TimeZone};
    use std::sync::Arc;

    fn ts(h: u32, m: u32, s: u32) -> Timestamp {
        FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 10, h, m, s)
            .unwrap()
    }

    fn engine() -> SharedEngine {
        let clock = Arc::new(ManualClock::new(ts(14, 10, 1)));
        SharedEngine::new(Engine::new(EngineConfig::default(), clock).unwrap())
    }

    #[tokio::test]
    async fn test_health_before_any_event() {
        let Json(response) = get_health(State(engine())).await;
        assert!(response.success);
        let health = response.data.unwrap();
        assert_eq!(health.status, "waiting_for_events");
        assert!(health.last_event_at.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_reflects_ingested_events() {
        let engine = engine();
        engine.ingest_event(Event::new(Category::White, 0, ts(14, 10, 0)));

        let Json(response) = get_snapshot(State(engine.clone())).await;
        let snapshot = response.data.unwrap();
        assert_eq!(snapshot.recent_events.len(), 1);

        let Json(health) = get_health(State(engine)).await;
        assert_eq!(health.data.unwrap().last_event_at, Some(ts(14, 10, 0)));
    }

    #[tokio::test]
    async fn test_stats_empty_before_signals() {
        let Json(response) = get_stats(State(engine())).await;
        let stats = response.data.unwrap();
        assert!(stats.rules.is_empty());
        assert_eq!(stats.total_sent, 0);
    }

    #[tokio::test]
    async fn test_rule_stats_known_and_unknown() {
        let Json(known) = get_rule(State(engine()), Path("drought-50".to_string())).await;
        assert!(known.success);
        let stats = known.data.unwrap();
        assert_eq!(stats.name, "drought-50");
        assert_eq!(stats.sent, 0);

        let Json(unknown) = get_rule(State(engine()), Path("no-such-rule".to_string())).await;
        assert!(!unknown.success);
        assert!(unknown.data.is_none());
        assert_eq!(unknown.error.as_deref(), Some("unknown rule: no-such-rule"));
    }
}
