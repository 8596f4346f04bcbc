//! Sandbox tools exposed over MCP.

use std::collections::{BTreeMap, HashMap};

use {
    async_trait::async_trait,
    sandboxed_engine::{ErrorKind, SandboxEngine, SandboxError, SandboxOption},
    serde::{Deserialize, de::DeserializeOwned},
    serde_json::{Value, json},
    thiserror::Error,
};

use crate::types::McpToolDef;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParams(_) => ErrorKind::InvalidRequest,
            Self::Sandbox(e) => e.kind(),
        }
    }
}

/// What a successful tool call returns: text for the model plus a
/// machine-readable payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub data: Value,
}

/// Tool callable through `tools/call`.
#[async_trait]
pub trait SandboxTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError>;
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, ToolError> {
    let params = if params.is_null() {
        json!({})
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| ToolError::InvalidParams(e.to_string()))
}

/// Registry of the tools served to clients.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn SandboxTool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry holding every sandbox tool, backed by `engine`.
    pub fn with_sandbox_tools(engine: SandboxEngine) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CreateSandboxTool {
            engine: engine.clone(),
        }));
        registry.register(Box::new(RunCodeTool {
            engine: engine.clone(),
        }));
        registry.register(Box::new(ExecScriptTool {
            engine: engine.clone(),
        }));
        registry.register(Box::new(DestroySandboxTool {
            engine: engine.clone(),
        }));
        registry.register(Box::new(ListSandboxesTool { engine }));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn SandboxTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SandboxTool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Tool definitions sorted by name.
    pub fn list_defs(&self) -> Vec<McpToolDef> {
        let mut defs: Vec<McpToolDef> = self
            .tools
            .values()
            .map(|t| McpToolDef {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

// ── create_sandbox ───────────────────────────────────────────────────────────

pub struct CreateSandboxTool {
    engine: SandboxEngine,
}

#[derive(Deserialize)]
struct CreateParams {
    name: String,
    language: String,
    namespace: Option<String>,
    labels: Option<BTreeMap<String, String>>,
}

#[async_trait]
impl SandboxTool for CreateSandboxTool {
    fn name(&self) -> &str {
        "create_sandbox"
    }

    fn description(&self) -> &str {
        "Creates a new sandbox environment for code execution"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Sandbox name (lowercase letters, digits, '-')"},
                "language": {"type": "string", "description": "python, go, node, java, ruby, php or rust"},
                "namespace": {"type": "string"},
                "labels": {"type": "object", "additionalProperties": {"type": "string"}},
            },
            "required": ["name", "language"],
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let params: CreateParams = parse_params(params)?;
        let mut options = Vec::new();
        if let Some(ns) = params.namespace {
            options.push(SandboxOption::Namespace(ns));
        }
        if let Some(labels) = params.labels {
            options.push(SandboxOption::Labels(labels));
        }
        let sandbox = self
            .engine
            .create(&params.name, &params.language, &options)
            .await?;
        Ok(ToolOutput {
            text: format!(
                "Successfully created sandbox '{}' with language '{}'",
                sandbox.name(),
                sandbox.language()
            ),
            data: json!({"success": true, "sandbox": sandbox.info().await}),
        })
    }
}

// ── run_code / exec_script ───────────────────────────────────────────────────

fn command_output(sandbox: &str, result: &sandboxed_engine::CommandResult) -> ToolOutput {
    let mut text = format!(
        "Code executed in sandbox '{sandbox}':\n\nOutput:\n{}\n\nExit Code: {}",
        result.stdout, result.exit_code
    );
    if !result.stderr.is_empty() {
        text.push_str(&format!("\n\nStderr:\n{}", result.stderr));
    }
    ToolOutput {
        text,
        data: json!({
            "success": result.success(),
            "stdout": result.stdout,
            "stderr": result.stderr,
            "exit_code": result.exit_code,
            "duration_ms": result.duration_ms,
        }),
    }
}

pub struct RunCodeTool {
    engine: SandboxEngine,
}

#[derive(Deserialize)]
struct RunCodeParams {
    sandbox_name: String,
    code: String,
}

#[async_trait]
impl SandboxTool for RunCodeTool {
    fn name(&self) -> &str {
        "run_code"
    }

    fn description(&self) -> &str {
        "Runs a shell command in an existing sandbox environment"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sandbox_name": {"type": "string"},
                "code": {"type": "string", "description": "Command passed to sh -c"},
            },
            "required": ["sandbox_name", "code"],
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let params: RunCodeParams = parse_params(params)?;
        let result = self.engine.run(&params.sandbox_name, &params.code).await?;
        Ok(command_output(&params.sandbox_name, &result))
    }
}

pub struct ExecScriptTool {
    engine: SandboxEngine,
}

#[derive(Deserialize)]
struct ExecScriptParams {
    sandbox_name: String,
    script: String,
}

#[async_trait]
impl SandboxTool for ExecScriptTool {
    fn name(&self) -> &str {
        "exec_script"
    }

    fn description(&self) -> &str {
        "Stores a script in the sandbox and runs it with the sandbox's language"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sandbox_name": {"type": "string"},
                "script": {"type": "string", "description": "Program source"},
            },
            "required": ["sandbox_name", "script"],
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let params: ExecScriptParams = parse_params(params)?;
        let result = self
            .engine
            .exec(&params.sandbox_name, &params.script)
            .await?;
        Ok(command_output(&params.sandbox_name, &result))
    }
}

// ── destroy_sandbox ──────────────────────────────────────────────────────────

pub struct DestroySandboxTool {
    engine: SandboxEngine,
}

#[derive(Deserialize)]
struct DestroyParams {
    sandbox_name: String,
}

#[async_trait]
impl SandboxTool for DestroySandboxTool {
    fn name(&self) -> &str {
        "destroy_sandbox"
    }

    fn description(&self) -> &str {
        "Destroys an existing sandbox environment and cleans up resources"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"sandbox_name": {"type": "string"}},
            "required": ["sandbox_name"],
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let params: DestroyParams = parse_params(params)?;
        let sandbox = self.engine.get(&params.sandbox_name).await?;
        sandbox.destroy().await?;
        Ok(ToolOutput {
            text: format!("Successfully destroyed sandbox '{}'", params.sandbox_name),
            data: json!({"success": true}),
        })
    }
}

// ── list_sandboxes ───────────────────────────────────────────────────────────

pub struct ListSandboxesTool {
    engine: SandboxEngine,
}

#[async_trait]
impl SandboxTool for ListSandboxesTool {
    fn name(&self) -> &str {
        "list_sandboxes"
    }

    fn description(&self) -> &str {
        "Lists all active sandbox environments"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: Value) -> Result<ToolOutput, ToolError> {
        let names: Vec<String> = self
            .engine
            .list()
            .await
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        let text = if names.is_empty() {
            "No active sandboxes found".to_string()
        } else {
            let mut text = format!("Active sandboxes ({}):\n", names.len());
            for (i, name) in names.iter().enumerate() {
                text.push_str(&format!("{}. {name}\n", i + 1));
            }
            text
        };
        Ok(ToolOutput {
            text,
            data: json!({"sandboxes": names, "count": names.len()}),
        })
    }
}
