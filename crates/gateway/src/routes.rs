//! REST handlers over the sandbox engine.

use std::{collections::BTreeMap, sync::Arc};

use {
    axum::{
        Json,
        extract::{Path, Query, State, rejection::JsonRejection},
    },
    sandboxed_engine::{CommandResult, Sandbox, SandboxEngine, SandboxOption},
    serde::Deserialize,
    serde_json::{Map, Value, json},
    tracing::info,
};

use crate::{error::ApiError, state::GatewayState};

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    /// Generated when absent.
    pub name: Option<String>,
    pub language: String,
    pub namespace: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    /// Extra string-keyed options, e.g. `ready_timeout_secs`.
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl CreateRequest {
    fn sandbox_options(&self) -> Result<Vec<SandboxOption>, ApiError> {
        let mut options = Vec::new();
        if let Some(ref ns) = self.namespace {
            options.push(SandboxOption::Namespace(ns.clone()));
        }
        if let Some(ref labels) = self.labels {
            options.push(SandboxOption::Labels(labels.clone()));
        }
        for (key, value) in &self.options {
            options.push(SandboxOption::parse(key, value)?);
        }
        Ok(options)
    }
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub sandbox_id: String,
    pub code: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptRequest {
    pub sandbox_id: String,
    pub script: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DestroyRequest {
    pub sandbox_id: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub language: String,
    pub code: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn command_response(sandbox_id: Option<&str>, result: &CommandResult) -> Value {
    json!({
        "success": result.success(),
        "sandbox_id": sandbox_id,
        "output": [result.stdout],
        "stdout": result.stdout,
        "stderr": result.stderr,
        "exit_code": result.exit_code,
        "duration_ms": result.duration_ms,
        "timestamp": now(),
    })
}

/// The registered sandbox, or one attached from an existing pod so that
/// sandboxes outlive a server restart.
async fn lookup(
    engine: &SandboxEngine,
    name: &str,
    namespace: Option<&str>,
) -> Result<Sandbox, ApiError> {
    Ok(engine.attach(name, namespace).await?)
}

pub async fn health(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": state.version,
        "backend": state.engine.backend_name(),
        "sandboxes": state.engine.registry().len().await,
        "uptime_secs": state.uptime_secs(),
        "timestamp": now(),
    }))
}

pub async fn index(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    Json(json!({
        "name": "sandboxed",
        "version": state.version,
        "description": "Code execution sandboxes on Kubernetes pods",
        "endpoints": {
            "health": "GET /health",
            "sandbox_create": "POST /api/v1/sandbox/create",
            "sandbox_execute": "POST /api/v1/execute",
            "sandbox_exec_script": "POST /api/v1/exec",
            "sandbox_destroy": "POST /api/v1/sandbox/destroy",
            "sandbox_list": "GET /api/v1/sandboxes",
            "sandbox_get": "GET /api/v1/sandboxes/{name}",
            "sandbox_logs": "GET /api/v1/sandboxes/{name}/logs",
            "pods": "GET /api/v1/pods",
            "run": "POST /api/v1/run",
        },
    }))
}

pub async fn create_sandbox(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let options = req.sandbox_options()?;
    let name = req.name.clone().unwrap_or_else(|| {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("sandbox-{}", &id[..8])
    });

    let sandbox = state.engine.create(&name, &req.language, &options).await?;
    info!(sandbox = %name, language = %sandbox.language(), "sandbox created via http");
    Ok(Json(json!({
        "success": true,
        "sandbox_id": sandbox.name(),
        "sandbox": sandbox.info().await,
        "timestamp": now(),
    })))
}

pub async fn execute(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let sandbox = lookup(&state.engine, &req.sandbox_id, req.namespace.as_deref()).await?;
    let result = sandbox.run(&req.code).await?;
    Ok(Json(command_response(Some(sandbox.name()), &result)))
}

pub async fn exec_script(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<ScriptRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let sandbox = lookup(&state.engine, &req.sandbox_id, req.namespace.as_deref()).await?;
    let result = sandbox.exec(&req.script).await?;
    Ok(Json(command_response(Some(sandbox.name()), &result)))
}

pub async fn destroy_sandbox(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<DestroyRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    state
        .engine
        .destroy(&req.sandbox_id, req.namespace.as_deref())
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Sandbox {} destroyed successfully", req.sandbox_id),
        "timestamp": now(),
    })))
}

pub async fn list_sandboxes(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    let mut sandboxes = Vec::new();
    for sandbox in state.engine.list().await {
        sandboxes.push(sandbox.info().await);
    }
    Json(json!({
        "success": true,
        "count": sandboxes.len(),
        "sandboxes": sandboxes,
    }))
}

pub async fn get_sandbox(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> ApiResult {
    let sandbox = state.engine.get(&name).await?;
    Ok(Json(json!({
        "success": true,
        "sandbox": sandbox.info().await,
    })))
}

pub async fn sandbox_logs(
    State(state): State<Arc<GatewayState>>,
    Path(name): Path<String>,
) -> ApiResult {
    let logs = state.engine.logs(&name).await?;
    Ok(Json(json!({
        "success": true,
        "sandbox_id": name,
        "logs": logs,
    })))
}

pub async fn list_pods(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult {
    let pods = state.engine.list_pods(query.namespace.as_deref()).await?;
    Ok(Json(json!({
        "success": true,
        "count": pods.len(),
        "pods": pods,
    })))
}

pub async fn run_oneshot(
    State(state): State<Arc<GatewayState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = payload?;
    let options: Vec<SandboxOption> = req
        .namespace
        .iter()
        .map(|ns| SandboxOption::Namespace(ns.clone()))
        .collect();
    let result = state
        .engine
        .run_oneshot(&req.language, &req.code, &options)
        .await?;
    let mut body = command_response(None, &result);
    body["language"] = json!(req.language);
    Ok(Json(body))
}
