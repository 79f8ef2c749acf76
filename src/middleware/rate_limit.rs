//! Per-IP rate limiting for the manual sync trigger.
//!
//! Only `POST` is limited; the status `GET` on the same path passes through.
//! Rejections use the `{ error: { code, message } }` shape of `AppError`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use axum::{body::Body, Router};
use http::{header, HeaderValue, Method, StatusCode};
use serde_json::json;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};

use crate::config::RateLimitConfig;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

fn json_response(status: StatusCode, body: serde_json::Value) -> http::Response<Body> {
    let mut resp = http::Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

pub fn rate_limit_response(error: GovernorError) -> http::Response<Body> {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            let mut resp = json_response(
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": {
                        "code": "RATE_LIMITED",
                        "message": "Rate limit exceeded",
                        "details": { "retry_after_seconds": wait_time }
                    }
                }),
            );

            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(wait_time));
            resp
        }
        GovernorError::UnableToExtractKey => json_response(
            StatusCode::BAD_REQUEST,
            json!({
                "error": {
                    "code": "BAD_REQUEST",
                    "message": "Unable to determine client IP for rate limiting"
                }
            }),
        ),
        GovernorError::Other { code, msg, headers } => {
            let mut resp = json_response(
                code,
                json!({
                    "error": {
                        "code": "RATE_LIMIT_ERROR",
                        "message": msg.unwrap_or_else(|| "Rate limiting error".to_string())
                    }
                }),
            );
            if let Some(hmap) = headers {
                for (name, value) in hmap.iter() {
                    resp.headers_mut().append(name.clone(), value.clone());
                }
            }
            resp
        }
    }
}

/// Wrap `router` with the sync trigger limiter and start the thread that
/// prunes limiter state. The thread exits once `shutdown` is set.
pub fn limit_sync_trigger<S>(
    router: Router<S>,
    config: &RateLimitConfig,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<(Router<S>, JoinHandle<()>)>
where
    S: Clone + Send + Sync + 'static,
{
    let mut builder = GovernorConfigBuilder::default().key_extractor(SmartIpKeyExtractor);
    builder.per_second(config.sync_per_second.into());
    builder.burst_size(config.sync_burst);
    builder.methods(vec![Method::POST]);
    builder.error_handler(rate_limit_response);

    let governor_conf = Arc::new(
        builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build sync governor config"))?,
    );

    let cleaner = {
        let limiter = governor_conf.limiter().clone();
        std::thread::spawn(move || {
            let tick = Duration::from_secs(1);
            loop {
                for _ in 0..CLEANUP_INTERVAL.as_secs() {
                    if shutdown.load(Ordering::SeqCst) {
                        tracing::info!("Sync rate limiter cleanup thread exiting");
                        return;
                    }
                    std::thread::sleep(tick);
                }
                tracing::debug!("sync rate limiter size: {}", limiter.len());
                limiter.retain_recent();
            }
        })
    };

    let router = router.layer(GovernorLayer {
        config: governor_conf,
    });
    Ok((router, cleaner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::MemoryStore;
    use crate::routes::test_support::{body_json, test_state};
    use crate::services::clock::ManualClock;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use tower::ServiceExt;

    fn request(method: Method) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri("/api/sync-events")
            .header("x-forwarded-for", "203.0.113.7")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn only_the_trigger_is_limited() {
        let state = test_state(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
            )),
        );
        let limits = RateLimitConfig {
            sync_per_second: 60,
            sync_burst: 2,
        };
        let shutdown = Arc::new(AtomicBool::new(false));
        let (limited, cleaner) = limit_sync_trigger(
            crate::routes::sync::router(),
            &limits,
            shutdown.clone(),
        )
        .unwrap();
        let app = Router::new()
            .nest("/api/sync-events", limited)
            .with_state(state);

        for _ in 0..5 {
            let response = app.clone().oneshot(request(Method::GET)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        for _ in 0..2 {
            let response = app.clone().oneshot(request(Method::POST)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(request(Method::POST)).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(body_json(response).await["error"]["code"], "RATE_LIMITED");

        let response = app.oneshot(request(Method::GET)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        shutdown.store(true, Ordering::SeqCst);
        cleaner.join().unwrap();
    }

    #[tokio::test]
    async fn other_governor_errors_are_json() {
        let response = rate_limit_response(GovernorError::Other {
            code: StatusCode::SERVICE_UNAVAILABLE,
            msg: None,
            headers: None,
        });

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "RATE_LIMIT_ERROR");
        assert_eq!(body["error"]["message"], "Rate limiting error");
    }
}
