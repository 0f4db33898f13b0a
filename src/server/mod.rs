// SPDX-License-Identifier: MIT

//! HTTP surface: flow CRUD, manual runs and webhook triggers

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Settings;
use crate::error::FlowError;
use crate::flow::graph::{FlowRecord, Graph, GraphStore, InMemoryGraphStore};
use crate::flow::{Engine, FileFlowStore, FlowStore, RunEvent, RunReport, TriggerSource};

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    flows: Arc<dyn FlowStore>,
    engine: Arc<Engine>,
    run_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    wait_for_webhook_runs: bool,
}

impl AppState {
    pub fn new(flows: Arc<dyn FlowStore>, engine: Arc<Engine>, settings: &Settings) -> Self {
        Self {
            flows,
            engine,
            run_locks: Arc::new(Mutex::new(HashMap::new())),
            wait_for_webhook_runs: settings.server.wait_for_webhook_runs,
        }
    }

    /// Lock serializing runs of one flow
    async fn run_lock(&self, flow_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().await;
        Arc::clone(locks.entry(flow_id.to_string()).or_default())
    }

    async fn drop_run_lock(&self, flow_id: &str) {
        self.run_locks.lock().await.remove(flow_id);
    }

    async fn record(&self, id: &str) -> Result<FlowRecord, ApiError> {
        self.flows
            .get(id)
            .await?
            .ok_or_else(|| ApiError(FlowError::FlowNotFound(id.to_string())))
    }

    /// Run a saved flow to completion, one run per flow at a time
    async fn run_record(
        &self,
        record: &FlowRecord,
        trigger: &TriggerSource,
        payload: Value,
        events: Option<mpsc::Sender<RunEvent>>,
    ) -> crate::error::Result<(RunReport, Graph)> {
        let lock = self.run_lock(&record.id).await;
        let _guard = lock.lock().await;

        let store = InMemoryGraphStore::new(record.graph());
        let report = match events {
            Some(tx) => {
                self.engine
                    .run_with_events(&store, trigger, payload, tx)
                    .await?
            }
            None => self.engine.run(&store, trigger, payload).await?,
        };
        Ok((report, store.snapshot().await))
    }
}

/// `FlowError` rendered as `{error}` with a matching status code
pub struct ApiError(FlowError);

impl From<FlowError> for ApiError {
    fn from(e: FlowError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            FlowError::FlowNotFound(_) | FlowError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            FlowError::Store(_) | FlowError::Json(_) => StatusCode::BAD_REQUEST,
            FlowError::NoEntryPoint => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/flows", get(list_flows).post(save_flow))
        .route("/api/flows/{id}", get(get_flow).delete(delete_flow))
        .route("/api/flows/{id}/run", post(run_flow))
        .route("/api/flows/{id}/run/stream", post(stream_run))
        .route("/webhook/{name}", post(webhook))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(settings: Settings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let flows = Arc::new(FileFlowStore::new(&settings.storage.flows_dir)?);
    let engine = Arc::new(Engine::from_settings(&settings)?);
    let app = router(AppState::new(flows, engine, &settings));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Request bodies that fail to parse become null
fn parse_payload(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body).unwrap_or_else(|e| {
        log::debug!("Ignoring unparsable request body: {}", e);
        Value::Null
    })
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct SaveFlowRequest {
    // Missing names reach the store's validation like empty ones
    #[serde(default)]
    name: String,
    #[serde(default)]
    nodes: Vec<crate::flow::Node>,
    #[serde(default)]
    edges: Vec<crate::flow::Edge>,
}

async fn save_flow(
    State(state): State<AppState>,
    Json(request): Json<SaveFlowRequest>,
) -> Result<(StatusCode, Json<FlowRecord>), ApiError> {
    let graph = Graph::new(request.nodes, request.edges);
    let record = state.flows.save(&request.name, graph).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_flows(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let flows = state.flows.list().await?;
    Ok(Json(json!(flows)))
}

async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FlowRecord>, ApiError> {
    Ok(Json(state.record(&id).await?))
}

async fn delete_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.flows.delete(&id).await? {
        state.drop_run_lock(&id).await;
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(FlowError::FlowNotFound(id).into())
    }
}

async fn run_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let record = state.record(&id).await?;
    let payload = parse_payload(&body);

    let (report, graph) = state
        .run_record(&record, &TriggerSource::Manual, payload, None)
        .await?;

    Ok(Json(json!({
        "runId": report.run_id,
        "visited": report.visited,
        "truncated": report.truncated,
        "nodes": graph.nodes,
    })))
}

async fn stream_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let record = state.record(&id).await?;
    let payload = parse_payload(&body);
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        log::info!("Starting streamed run of flow {}", record.id);
        if let Err(e) = state
            .run_record(&record, &TriggerSource::Manual, payload, Some(tx))
            .await
        {
            log::warn!("Streamed run of flow {} failed: {}", record.id, e);
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default().json_data(&event).unwrap_or_else(|e| {
            Event::default()
                .event("error")
                .data(format!("unserializable event: {}", e))
        }))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(1))))
}

async fn webhook(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let payload = parse_payload(&body);

    let Some(record) = state.flows.find_by_webhook(&name).await? else {
        log::warn!("Webhook '{}' matched no flow", name);
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Flow not found" })),
        )
            .into_response());
    };
    let flow_id = record.id.clone();
    log::info!("Webhook '{}' triggering flow {}", name, flow_id);

    let trigger = TriggerSource::webhook(name);
    if state.wait_for_webhook_runs {
        if let Err(e) = state.run_record(&record, &trigger, payload, None).await {
            log::error!("Webhook run of flow {} failed: {}", flow_id, e);
        }
    } else {
        tokio::spawn(async move {
            if let Err(e) = state.run_record(&record, &trigger, payload, None).await {
                log::error!("Webhook run of flow {} failed: {}", record.id, e);
            }
        });
    }

    Ok(Json(json!({ "ok": true, "flowId": flow_id })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{InMemoryFlowStore, Node};

    #[tokio::test]
    async fn test_delete_drops_run_lock() {
        let settings = Settings::default();
        let engine = Arc::new(Engine::from_settings(&settings).unwrap());
        let flows: Arc<dyn FlowStore> = Arc::new(InMemoryFlowStore::new());
        let state = AppState::new(flows, engine, &settings);
        let record = state
            .flows
            .save("Lonely", Graph::new(vec![Node::new("s", "start")], vec![]))
            .await
            .unwrap();

        state
            .run_record(&record, &TriggerSource::Manual, Value::Null, None)
            .await
            .unwrap();
        assert!(state.run_locks.lock().await.contains_key(&record.id));

        let status = delete_flow(State(state.clone()), Path(record.id.clone()))
            .await
            .ok();
        assert_eq!(status, Some(StatusCode::NO_CONTENT));
        assert!(state.run_locks.lock().await.is_empty());
    }
}
