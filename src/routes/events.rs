use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::db::models::Event;
use crate::error::{AppError, AppResult};
use crate::AppState;

pub const EVENTS_CACHE_CONTROL: &str = "public, s-maxage=300, stale-while-revalidate=600";

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(list_events)
                .post(reject_write)
                .put(reject_write)
                .patch(reject_write)
                .delete(reject_write),
        )
        .route("/cache", get(cache_help).delete(clear_cache))
}

/// An event as served to clients: status re-derived against the request
/// time, plus a preformatted display date.
#[derive(Debug, Serialize)]
pub struct EventView {
    #[serde(flatten)]
    pub event: Event,
    pub date: String,
}

impl EventView {
    pub fn at(event: &Event, now: DateTime<Utc>) -> Self {
        let mut event = event.clone();
        event.status = event.status_at(now);
        let date = event.start_date.format("%Y-%m-%d %H:%M UTC").to_string();
        Self { event, date }
    }
}

#[derive(Debug, Serialize)]
struct EventsResponse {
    events: Vec<EventView>,
    meta: EventsMeta,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventsMeta {
    total: usize,
    cached: bool,
    /// Milliseconds since the served entry was captured.
    cache_age: i64,
}

async fn list_events(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let cached = state
        .events
        .get_events()
        .await
        .map_err(AppError::EventsUnavailable)?;

    let now = state.clock.now();
    let events: Vec<EventView> = cached
        .events
        .iter()
        .map(|event| EventView::at(event, now))
        .collect();

    let response = EventsResponse {
        meta: EventsMeta {
            total: events.len(),
            cached: cached.cached,
            cache_age: cached.age.num_milliseconds(),
        },
        events,
    };
    let cache_status = if cached.cached { "HIT" } else { "MISS" };

    Ok((
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, EVENTS_CACHE_CONTROL),
            (HeaderName::from_static("x-cache-status"), cache_status),
        ],
        Json(response),
    ))
}

/// Events only enter the store through the synchronizer.
async fn reject_write(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}

async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    state.events.invalidate().await;

    Json(json!({
        "message": "Events cache cleared",
        "timestamp": state.clock.now().to_rfc3339(),
    }))
}

async fn cache_help(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Events cache management endpoint",
        "actions": {
            "DELETE /api/events/cache": "Clear the events cache",
            "GET /api/events": "List events (reports cache status)",
        },
        "timestamp": state.clock.now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{EventStatus, SyncSource, SyncStats};
    use crate::db::repository::{LumaEventRepository, SyncStatsRepository};
    use crate::db::store::testing::FlakyStore;
    use crate::db::store::{KvStore, MemoryStore, StoreError};
    use crate::routes::test_support::{body_json, test_state};
    use crate::services::clock::ManualClock;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use chrono::TimeZone;
    use tower::ServiceExt;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 8, 0, 0).unwrap()
    }

    fn event(link: &str, start: DateTime<Utc>) -> Event {
        Event {
            id: link.to_string(),
            title: link.to_string(),
            description: String::new(),
            start_date: start,
            end_date: None,
            location: "Seoul".to_string(),
            registration_link: format!("https://lu.ma/{}", link),
            image_url: None,
            status: EventStatus::Upcoming,
            tags: vec!["kaia".to_string()],
        }
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .nest("/api/events", router())
            .with_state(state)
    }

    fn get_events() -> Request<Body> {
        Request::builder()
            .uri("/api/events")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn lists_events_with_cache_headers() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        for e in [
            event("past", t0() - chrono::Duration::days(1)),
            event("next", t0() + chrono::Duration::days(1)),
        ] {
            LumaEventRepository::insert(store.as_ref(), &e, std::time::Duration::from_secs(60))
                .await
                .unwrap();
        }
        let state = test_state(store, clock.clone());

        let response = app(state.clone()).oneshot(get_events()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            EVENTS_CACHE_CONTROL
        );
        assert_eq!(response.headers()["x-cache-status"], "MISS");

        let body = body_json(response).await;
        assert_eq!(body["meta"]["total"], 2);
        assert_eq!(body["meta"]["cached"], false);
        assert_eq!(body["events"][0]["registrationLink"], "https://lu.ma/next");
        assert_eq!(body["events"][0]["date"], "2025-05-11 08:00 UTC");
        // stored as upcoming, served as past
        assert_eq!(body["events"][1]["status"], "past");

        clock.advance(chrono::Duration::seconds(30));
        let response = app(state).oneshot(get_events()).await.unwrap();
        assert_eq!(response.headers()["x-cache-status"], "HIT");
        let body = body_json(response).await;
        assert_eq!(body["meta"]["cached"], true);
        assert_eq!(body["meta"]["cacheAge"], 30_000);
    }

    #[tokio::test]
    async fn store_failure_is_a_structured_500() {
        let store = Arc::new(FlakyStore::new(MemoryStore::new()));
        store.fail_reads(10, StoreError::OperationFailed("boom".to_string()));
        let state = test_state(store, Arc::new(ManualClock::new(t0())));

        let response = app(state).oneshot(get_events()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "STORE_ERROR");
    }

    #[tokio::test]
    async fn post_is_rejected() {
        let state = test_state(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(t0())),
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/events")
            .body(Body::from("{}"))
            .unwrap();

        let response = app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            body_json(response).await["error"]["code"],
            "METHOD_NOT_ALLOWED"
        );
    }

    #[tokio::test]
    async fn every_write_method_gets_a_structured_405() {
        let state = test_state(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(t0())),
        );

        for method in [Method::PUT, Method::PATCH, Method::DELETE] {
            let request = Request::builder()
                .method(method.clone())
                .uri("/api/events")
                .body(Body::from("{}"))
                .unwrap();

            let response = app(state.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            let body = body_json(response).await;
            assert_eq!(body["error"]["code"], "METHOD_NOT_ALLOWED");
            assert_eq!(
                body["error"]["message"],
                format!("Method {} not allowed", method)
            );
        }
    }

    #[tokio::test]
    async fn delete_cache_forces_a_miss() {
        let store = Arc::new(MemoryStore::new());
        let state = test_state(store.clone(), Arc::new(ManualClock::new(t0())));
        let stats = SyncStats {
            last_sync: t0(),
            total_events: 0,
            new_events_added: 0,
            sync_source: SyncSource::LumaPage,
        };
        SyncStatsRepository::put(store.as_ref() as &dyn KvStore, &stats)
            .await
            .unwrap();

        app(state.clone()).oneshot(get_events()).await.unwrap();
        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/api/events/cache")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Events cache cleared");

        let response = app(state).oneshot(get_events()).await.unwrap();
        assert_eq!(response.headers()["x-cache-status"], "MISS");
    }

    #[tokio::test]
    async fn cache_help_lists_actions() {
        let state = test_state(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(t0())),
        );
        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/api/events/cache")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert!(body["actions"]["DELETE /api/events/cache"].is_string());
        assert!(body["timestamp"].is_string());
    }
}
