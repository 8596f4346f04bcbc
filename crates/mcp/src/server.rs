//! Line-delimited JSON-RPC server speaking MCP over stdio.

use std::sync::Arc;

use {
    anyhow::Result,
    serde_json::{Value, json},
    tokio::{
        io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
        sync::mpsc,
    },
    tracing::{debug, info, trace, warn},
};

use crate::{
    tools::ToolRegistry,
    types::{
        INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, InitializeResult, JsonRpcRequest,
        JsonRpcResponse, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION, ServerInfo, ToolContent,
        ToolsCallParams, ToolsCallResult,
    },
};

pub struct McpServer {
    tools: ToolRegistry,
    version: String,
}

impl McpServer {
    pub fn new(tools: ToolRegistry) -> Self {
        Self {
            tools,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Handle one raw input line. Notifications produce no response.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    Value::Null,
                    PARSE_ERROR,
                    format!("parse error: {e}"),
                ));
            },
        };
        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(req) => self.handle_request(req).await,
            Err(e) => Some(JsonRpcResponse::failure(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                format!("invalid request: {e}"),
            )),
        }
    }

    pub async fn handle_request(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = req.id else {
            debug!(method = %req.method, "notification");
            return None;
        };
        if req.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                id,
                INVALID_REQUEST,
                "jsonrpc must be \"2.0\"",
            ));
        }

        let response = match req.method.as_str() {
            "initialize" => {
                let result = InitializeResult {
                    protocol_version: PROTOCOL_VERSION.into(),
                    capabilities: json!({"tools": {"listChanged": false}}),
                    server_info: ServerInfo {
                        name: "sandboxed".into(),
                        version: self.version.clone(),
                    },
                };
                to_response(id, &result)
            },
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({"tools": self.tools.list_defs()})),
            "tools/call" => self.call_tool(id, req.params.unwrap_or(Value::Null)).await,
            other => JsonRpcResponse::failure(
                id,
                METHOD_NOT_FOUND,
                format!("method not found: {other}"),
            ),
        };
        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Value) -> JsonRpcResponse {
        let params: ToolsCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return JsonRpcResponse::failure(
                    id,
                    INVALID_PARAMS,
                    format!("invalid tools/call params: {e}"),
                );
            },
        };
        let Some(tool) = self.tools.get(&params.name) else {
            return JsonRpcResponse::failure(
                id,
                INVALID_PARAMS,
                format!("unknown tool: {}", params.name),
            );
        };

        info!(tool = %params.name, "tool call");
        let result = match tool.execute(params.arguments).await {
            Ok(output) => ToolsCallResult {
                content: vec![ToolContent::Text { text: output.text }],
                structured_content: Some(output.data),
                is_error: false,
            },
            Err(e) => {
                warn!(tool = %params.name, error = %e, "tool call failed");
                ToolsCallResult {
                    content: vec![ToolContent::Text {
                        text: format!("Error: {e}"),
                    }],
                    structured_content: Some(json!({
                        "success": false,
                        "error": e.to_string(),
                        "error_kind": e.kind().as_str(),
                    })),
                    is_error: true,
                }
            },
        };
        to_response(id, &result)
    }

    /// Serve requests read from `reader` until EOF. Requests are handled
    /// concurrently and responses are written one per line as they complete.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        // Dropped at EOF so `rx` closes once in-flight handlers finish.
        let mut tx = Some(tx);
        let mut lines = reader.lines();

        loop {
            tokio::select! {
                line = lines.next_line(), if tx.is_some() => match line? {
                    Some(line) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        trace!(raw = %line, "client -> server");
                        let Some(tx) = tx.clone() else { continue };
                        let server = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Some(resp) = server.handle_line(&line).await {
                                let _ = tx.send(resp);
                            }
                        });
                    },
                    None => {
                        debug!("input closed, draining in-flight requests");
                        tx = None;
                    },
                },
                resp = rx.recv() => {
                    let Some(resp) = resp else { break };
                    let mut payload = serde_json::to_string(&resp)?;
                    payload.push('\n');
                    writer.write_all(payload.as_bytes()).await?;
                    writer.flush().await?;
                },
            }
        }
        Ok(())
    }

    /// Serve over the process's stdin and stdout.
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }
}

fn to_response<T: serde::Serialize>(id: Value, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::failure(id, INTERNAL_ERROR, format!("internal error: {e}")),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        sandboxed_engine::{EngineConfig, SandboxEngine, local::LocalCluster},
        tokio::io::AsyncReadExt,
    };

    fn server() -> Arc<McpServer> {
        let engine = SandboxEngine::new(Arc::new(LocalCluster::new()), EngineConfig::default());
        Arc::new(McpServer::new(ToolRegistry::with_sandbox_tools(engine)))
    }

    async fn call(server: &McpServer, line: &str) -> Value {
        let resp = server.handle_line(line).await.expect("response");
        serde_json::to_value(resp).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let resp = call(
            &server(),
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(resp["result"]["serverInfo"]["name"], "sandboxed");
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let resp = server()
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let server = server();
        let resp = call(&server, "{not json").await;
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        assert_eq!(resp["id"], Value::Null);

        let resp = call(&server, r#"{"jsonrpc":"2.0","id":2}"#).await;
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
        assert_eq!(resp["id"], 2);

        let resp = call(&server, r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#).await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);

        let resp = call(
            &server,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"format_disk"}}"#,
        )
        .await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let resp = call(&server(), r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#).await;
        let tools = resp["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 5);
        assert_eq!(tools[0]["name"], "create_sandbox");
        assert!(tools[0]["inputSchema"]["required"].is_array());
    }

    #[tokio::test]
    async fn test_tool_failure_is_flagged_not_rpc_error() {
        let resp = call(
            &server(),
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"create_sandbox","arguments":{"name":"s1","language":"cobol"}}}"#,
        )
        .await;
        assert!(resp.get("error").is_none());
        assert_eq!(resp["result"]["isError"], true);
        assert_eq!(resp["result"]["structuredContent"]["error_kind"], "resolution");
        assert_eq!(
            resp["result"]["content"][0]["text"],
            "Error: unsupported language: cobol"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_serve_round_trip() {
        let (client, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let task = tokio::spawn(server().serve(BufReader::new(server_read), server_write));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        let input = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"create_sandbox","arguments":{"name":"s1","language":"python"}}}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
        ];
        for line in input {
            client_write.write_all(line.as_bytes()).await.unwrap();
            client_write.write_all(b"\n").await.unwrap();
        }
        client_write.shutdown().await.unwrap();
        drop(client_write);

        task.await.unwrap().unwrap();
        let mut output = String::new();
        client_read.read_to_string(&mut output).await.unwrap();

        let mut responses: Vec<Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        responses.sort_by_key(|r| r["id"].as_i64());
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["result"]["isError"], false);
        assert_eq!(responses[1]["result"]["structuredContent"]["sandbox"]["name"], "s1");
        assert_eq!(responses[2]["result"], json!({}));
    }
}
