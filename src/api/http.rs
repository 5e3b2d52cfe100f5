// api/http.rs - read-only HTTP observability over the Facade
//
// No mutating routes: `GET /health`, `GET /jobs`, `GET /jobs/:id` only, all
// backed by `Facade::snapshot`/`Facade::status`.

use std::sync::Arc;

use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::facade::Facade;

#[derive(Clone)]
pub struct ServerState {
    facade: Arc<Facade>,
}

impl ServerState {
    pub fn new(facade: Arc<Facade>) -> Self {
        Self { facade }
    }
}

#[derive(Debug)]
struct NotFound {
    job_id: String,
}

impl warp::reject::Reject for NotFound {}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, std::convert::Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found".to_string())
    } else if let Some(not_found) = err.find::<NotFound>() {
        (
            StatusCode::NOT_FOUND,
            format!("job {} not found", not_found.job_id),
        )
    } else {
        log::error!("unhandled rejection in orchestrator http api: {err:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    };

    let json = warp::reply::json(&serde_json::json!({
        "error": message,
        "status_code": code.as_u16(),
    }));
    Ok(warp::reply::with_status(json, code))
}

fn with_cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["Accept", "Content-Type"])
        .allow_methods(vec!["GET"])
        .max_age(3600)
}

fn with_state(
    state: ServerState,
) -> impl Filter<Extract = (ServerState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn handle_health() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&serde_json::json!({
        "status": "healthy",
        "service": "batch-render-orchestrator",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn handle_jobs(state: ServerState) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.facade.snapshot().await))
}

async fn handle_job(job_id: String, state: ServerState) -> Result<impl Reply, Rejection> {
    match state.facade.status(&job_id).await {
        Some(view) => Ok(warp::reply::json(&view)),
        None => Err(warp::reject::custom(NotFound { job_id })),
    }
}

/// Compose the read-only route tree. `serve` is left to the caller so tests
/// can exercise routes in-process via `warp::test` without binding a port.
pub fn routes(
    state: ServerState,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let health = warp::path("health").and(warp::get()).and_then(handle_health);

    let jobs = warp::path("jobs")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_jobs);

    let job = warp::path!("jobs" / String)
        .and(warp::get())
        .and(with_state(state))
        .and_then(handle_job);

    health
        .or(jobs)
        .or(job)
        .recover(handle_rejection)
        .with(with_cors())
}

/// Bind and serve the read-only route tree on `port`. Blocks forever;
/// intended to be spawned as a background task by the CLI binary.
pub async fn start_server(state: ServerState, port: u16) {
    log::info!("starting orchestrator observability API on port {port}");
    warp::serve(routes(state)).run(([0, 0, 0, 0], port)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::scene_host::StubSceneHost;

    #[tokio::test]
    async fn health_route_returns_ok() {
        let dir = std::env::temp_dir().join(format!("http_api_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let facade = Arc::new(Facade::new(
            SchedulerConfig::default(),
            Arc::new(StubSceneHost),
            None,
            dir.join("fallback"),
        ));
        let state = ServerState::new(facade.clone());

        let resp = warp::test::request().path("/health").reply(&routes(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);

        facade.shutdown().await;
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unknown_job_returns_404() {
        let dir = std::env::temp_dir().join(format!("http_api_test2_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let facade = Arc::new(Facade::new(
            SchedulerConfig::default(),
            Arc::new(StubSceneHost),
            None,
            dir.join("fallback"),
        ));
        let state = ServerState::new(facade.clone());

        let resp = warp::test::request()
            .path("/jobs/does-not-exist")
            .reply(&routes(state))
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        facade.shutdown().await;
        let _ = std::fs::remove_dir_all(dir);
    }
}
