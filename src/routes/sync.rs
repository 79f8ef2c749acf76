use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;

use crate::db::repository::{LumaEventRepository, SyncStatsRepository};
use crate::error::AppResult;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_status).post(sync_now))
}

/// Run a sync immediately and drop the served cache so the next read sees it.
async fn sync_now(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    tracing::info!("Manual event sync triggered");
    let report = state.sync_manager().sync().await?;
    state.events.invalidate().await;

    Ok(Json(json!({
        "success": true,
        "added": report.added,
        "total": report.total,
        "source": report.source,
    })))
}

/// Last sync time, number of persisted events and when the scheduled
/// worker will run next.
async fn get_status(State(state): State<Arc<AppState>>) -> AppResult<Json<serde_json::Value>> {
    let store = state.store.as_ref();
    let last_sync = SyncStatsRepository::last_sync_at(store).await?;
    let event_count = LumaEventRepository::list_keys(store).await?.len();
    let next_sync =
        last_sync.and_then(|at| at.checked_add_signed(state.config.sync.interval));

    Ok(Json(json!({
        "lastSync": last_sync.map(|dt| dt.to_rfc3339()),
        "eventCount": event_count,
        "nextScheduledSync": next_sync.map(|dt| dt.to_rfc3339()),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MemoryStore;
    use crate::routes::test_support::{body_json, test_state};
    use crate::services::clock::ManualClock;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use tower::ServiceExt;

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .nest("/api/sync-events", router())
            .with_state(state)
    }

    fn request(method: Method) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/api/sync-events")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn status_before_any_sync_is_empty() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let state = test_state(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(now)));

        let response = app(state).oneshot(request(Method::GET)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert!(body["lastSync"].is_null());
        assert_eq!(body["eventCount"], 0);
        assert!(body["nextScheduledSync"].is_null());
    }

    #[tokio::test]
    async fn manual_sync_persists_and_reports() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let state = test_state(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(now)));

        let response = app(state.clone())
            .oneshot(request(Method::POST))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["added"], 2);
        assert_eq!(body["source"], "luma_page");

        let body = body_json(app(state).oneshot(request(Method::GET)).await.unwrap()).await;
        assert_eq!(body["eventCount"], 2);
        assert_eq!(body["lastSync"], now.to_rfc3339());
        assert_eq!(
            body["nextScheduledSync"],
            (now + chrono::Duration::hours(6)).to_rfc3339()
        );
    }
}
