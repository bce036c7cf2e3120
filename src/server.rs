use crate::models::{ProgressEvent, ResearchRequest};
use crate::pipeline::Pipeline;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
}

/// Payload of every server-sent event.
#[derive(Debug, Serialize)]
struct ProgressEnvelope<'a> {
    run_id: &'a str,
    at: DateTime<Utc>,
    text: String,
    event: &'a ProgressEvent,
}

pub fn router(pipeline: Pipeline) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/research", post(research))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { pipeline })
}

async fn health() -> &'static str {
    "OK"
}

#[instrument(skip(state, req))]
async fn research(
    State(state): State<AppState>,
    Json(req): Json<ResearchRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, String)> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }

    let run_id = Uuid::new_v4().to_string();
    info!("Research run {} requested: {}", run_id, query);

    let events = state
        .pipeline
        .run(query)
        .map(move |event| to_sse(&run_id, &event));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse(run_id: &str, event: &ProgressEvent) -> Result<Event, axum::Error> {
    Event::default()
        .event(event.name())
        .json_data(ProgressEnvelope {
            run_id,
            at: Utc::now(),
            text: event.to_string(),
            event,
        })
}
