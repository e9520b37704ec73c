use std::collections::HashMap;

use clap::{Args, Subcommand};
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

pub mod credentials;
pub mod fx;
pub mod outfit;
pub mod providers;
pub mod search;

use providers::{QuoteProvider, SearchProvider, TavilySearchProvider, YahooChartProvider, client};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "valet-mcp";

#[derive(Subcommand)]
pub enum McpCommands {
    /// Run a Valet MCP server over stdio
    Serve(McpServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct McpServeArgs {
    /// Tavily API key fallback for search (callers may override per request)
    #[arg(long, env = "TAVILY_API_KEY")]
    pub tavily_api_key: Option<String>,
}

pub async fn run(command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve(args) => {
            let server = McpServer::new(McpRuntimeConfig {
                request_headers: HashMap::new(),
                server_api_key: args.tavily_api_key,
            });
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err,
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
    }
}

/// Per-instance runtime configuration. Over HTTP a fresh server is built for
/// every request with that request's headers; over stdio the header map stays
/// empty and only the process-wide key applies.
#[derive(Clone, Debug, Default)]
pub struct McpRuntimeConfig {
    /// Transport headers for the current request. Keys may arrive in any
    /// casing; the credential resolver normalizes before lookup.
    pub request_headers: HashMap<String, String>,
    /// Process-wide search credential fallback (TAVILY_API_KEY).
    pub server_api_key: Option<String>,
}

pub async fn handle_http_jsonrpc(config: McpRuntimeConfig, incoming: Value) -> Vec<Value> {
    let server = McpServer::new(config);
    server.handle_incoming_message(incoming).await
}

struct McpServer {
    config: McpRuntimeConfig,
    search: Box<dyn SearchProvider>,
    quotes: Box<dyn QuoteProvider>,
}

impl McpServer {
    fn new(config: McpRuntimeConfig) -> Self {
        let http = client();
        Self {
            config,
            search: Box::new(TavilySearchProvider::new(http.clone())),
            quotes: Box::new(YahooChartProvider::new(http)),
        }
    }

    #[cfg(test)]
    fn with_providers(
        config: McpRuntimeConfig,
        search: Box<dyn SearchProvider>,
        quotes: Box<dyn QuoteProvider>,
    ) -> Self {
        Self {
            config,
            search,
            quotes,
        }
    }

    async fn serve_stdio(&self) -> Result<(), String> {
        let stdin = io::stdin();
        let mut reader = BufReader::new(stdin);
        let mut stdout = io::stdout();

        loop {
            let incoming = read_framed_json(&mut reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some(incoming) = incoming else {
                break;
            };

            let responses = self.handle_incoming_message(incoming).await;
            for response in responses {
                write_framed_json(&mut stdout, &response)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }

        Ok(())
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // Most likely a client response; this server issues no outbound requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            self.handle_notification(method, params);
            None
        }
    }

    fn handle_notification(&self, method: &str, _params: Value) {
        if matches!(
            method,
            "notifications/initialized" | "notifications/cancelled"
        ) {
            return;
        }
        // Unknown notifications are intentionally ignored.
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        let instructions = format!(
            "Personal helper tools: convert_pln_to_usd for PLN to USD conversion, \
             get_outfit for the day's outfit recommendation, tavily_search for web search. \
             tavily_search accepts a per-request Tavily key via an 'Authorization: Bearer <key>' \
             or 'X-Tavily-Api-Key' header; without one the server's {} is used.",
            credentials::SERVER_API_KEY_ENV
        );
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": instructions
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let result = self.execute_tool(name, &args).await;
        Ok(match result {
            Ok(text) => build_tool_call_response(text, false),
            Err(err) => build_tool_call_response(err.to_text(), true),
        })
    }

    async fn execute_tool(
        &self,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        tracing::debug!(tool = tool_name, "executing tool call");
        match tool_name {
            "convert_pln_to_usd" => self.tool_convert_pln_to_usd(args).await,
            "get_outfit" => self.tool_get_outfit(args),
            "tavily_search" => self.tool_tavily_search(args).await,
            _ => Err(ToolError::new(
                "unknown_tool",
                format!("Unknown tool '{tool_name}'"),
            )),
        }
    }

    async fn tool_convert_pln_to_usd(
        &self,
        args: &Map<String, Value>,
    ) -> Result<String, ToolError> {
        let amount = require_string_arg(args, "amount")?;
        Ok(fx::convert_pln_to_usd(self.quotes.as_ref(), amount).await)
    }

    fn tool_get_outfit(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let day = require_string_arg(args, "day")?;
        outfit::outfit_for_day(day)
    }

    async fn tool_tavily_search(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let query = require_string_arg(args, "query")?;
        let api_key = credentials::resolve_api_key(
            &self.config.request_headers,
            self.config.server_api_key.as_deref(),
        );
        Ok(search::run_search(self.search.as_ref(), query, api_key.as_deref()).await)
    }
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolError {
    code: String,
    message: String,
    docs_hint: Option<String>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            docs_hint: None,
        }
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    fn to_text(&self) -> String {
        let mut text = format!("{}: {}", self.code, self.message);
        if let Some(docs_hint) = &self.docs_hint {
            text.push(' ');
            text.push_str(docs_hint);
        }
        text
    }
}

fn require_string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    args.get(key).and_then(Value::as_str).ok_or_else(|| {
        ToolError::new(
            "validation_failed",
            format!("tools/call requires string argument '{key}'"),
        )
    })
}

#[derive(Debug)]
struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "convert_pln_to_usd",
            description: "Convert an amount in Polish zloty (PLN) to US dollars (USD) using the latest exchange-rate quote.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "amount": { "type": "string", "description": "Amount in PLN, e.g. '100'" }
                },
                "required": ["amount"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "get_outfit",
            description: "Recommend an outfit for the given day of the week.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "day": { "type": "string", "description": "Weekday name (monday, tuesday, ...)" }
                },
                "required": ["day"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "tavily_search",
            description: "Search the web using Tavily. Returns titles and snippets of the top results.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search question, e.g. 'Who is Leo Messi?'" }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        },
    ]
}

fn tools_list_payload() -> Value {
    let tools: Vec<Value> = tool_definitions()
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn build_tool_call_response(text: String, is_error: bool) -> Value {
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }]
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }]
        })
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

async fn read_framed_json(
    reader: &mut BufReader<tokio::io::Stdin>,
) -> Result<Option<Value>, std::io::Error> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if content_length.is_none() {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        if line == "\r\n" {
            break;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = line
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    let json: Value = serde_json::from_slice(&payload).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Invalid JSON payload: {e}"),
        )
    })?;
    Ok(Some(json))
}

async fn write_framed_json(
    writer: &mut tokio::io::Stdout,
    value: &Value,
) -> Result<(), std::io::Error> {
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    let header = format!(
        "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
        body.len()
    );
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
