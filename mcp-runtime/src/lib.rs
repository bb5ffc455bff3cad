//! MCP stdio runtime for Google Search Console.
//!
//! Speaks JSON-RPC 2.0 over stdin/stdout and exposes two tools,
//! `list_sites` and `search_analytics`, backed by [`analytics::AnalyticsClient`].

pub mod analytics;
pub mod google;
pub mod tools;
pub mod util;

#[cfg(test)]
mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Subcommand;
use gsc_core::GscError;
use gsc_core::credentials::ServiceAccountKey;
use serde_json::{Map, Value, json};
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::analytics::AnalyticsClient;
use crate::google::GoogleSearchConsole;
use crate::tools::{Invocation, LIST_SITES, ToolDispatcher, to_pretty_json};
use crate::util::{client, resolve_credentials_path};

pub use crate::google::DEFAULT_API_URL;

const MCP_SERVER_NAME: &str = "gsc-mcp";
/// Newest first; the first entry is offered when the client asks for
/// something unknown.
const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

/// Largest inbound message body accepted, in bytes.
const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

const EXIT_READY: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_DEGRADED: i32 = 2;

#[derive(Subcommand, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum McpCommands {
    /// Run the MCP server over stdio
    #[default]
    Serve,
    /// Check credentials and backend access, print a JSON readiness report
    Diagnose,
}

#[derive(Clone, Debug)]
pub struct McpRuntimeConfig {
    pub credentials_path: Option<PathBuf>,
    pub api_url: String,
}

pub async fn run(config: McpRuntimeConfig, command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve => {
            let server = McpServer::new(build_dispatcher(&config));
            match server.serve_stdio().await {
                Ok(()) => EXIT_READY,
                Err(err) => {
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err,
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    EXIT_ERROR
                }
            }
        }
        McpCommands::Diagnose => {
            let (report, code) = diagnose(&config).await;
            println!("{}", to_pretty_json(&report));
            code
        }
    }
}

/// Resolve credentials once. Any failure leaves the dispatcher permanently
/// not-initialized; discovery still works.
pub fn build_dispatcher(config: &McpRuntimeConfig) -> ToolDispatcher {
    let path = resolve_credentials_path(config.credentials_path.as_deref());
    dispatcher_for(path.as_deref(), &config.api_url)
}

fn dispatcher_for(path: Option<&Path>, api_url: &str) -> ToolDispatcher {
    let Some(path) = path else {
        return ToolDispatcher::uninitialized();
    };

    match ServiceAccountKey::from_file(path) {
        Ok(key) => {
            tracing::info!(
                client_email = key.client_email(),
                project_id = key.project_id().unwrap_or_default(),
                api_url,
                "search console client initialized"
            );
            let backend = GoogleSearchConsole::new(client(), api_url, key);
            ToolDispatcher::new(AnalyticsClient::new(Arc::new(backend)))
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "failed to load credentials");
            ToolDispatcher::uninitialized()
        }
    }
}

async fn diagnose(config: &McpRuntimeConfig) -> (Value, i32) {
    let path = resolve_credentials_path(config.credentials_path.as_deref());
    let dispatcher = dispatcher_for(path.as_deref(), &config.api_url);
    let mut report = json!({
        "server": MCP_SERVER_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "api_url": config.api_url,
        "credentials_path": path.as_ref().map(|p| p.display().to_string()),
        "initialized": dispatcher.is_initialized(),
        "tools": dispatcher.list_tools().iter().map(|tool| tool.name).collect::<Vec<_>>(),
    });

    if !dispatcher.is_initialized() {
        report["status"] = json!("degraded");
        report["message"] = json!(GscError::NotInitialized.to_string());
        return (report, EXIT_DEGRADED);
    }

    match dispatcher.call_tool(&Invocation::new(LIST_SITES, None)).await {
        Ok(result) => {
            let total_sites = result
                .text()
                .and_then(|text| serde_json::from_str::<Value>(text).ok())
                .and_then(|value| value.get("totalSites").cloned())
                .unwrap_or(Value::Null);
            report["status"] = json!("ready");
            report["total_sites"] = total_sites;
            (report, EXIT_READY)
        }
        Err(err) => {
            report["status"] = json!("error");
            report["error"] = json!(err.code());
            report["message"] = json!(err.to_string());
            (report, EXIT_ERROR)
        }
    }
}

/// Wire framing of one inbound message; the reply mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Line,
    ContentLength,
}

/// A message the reader could not accept still gets an error reply in its
/// framing; only I/O failures end the session.
struct InboundMessage {
    framing: Framing,
    payload: Result<Value, RpcError>,
}

impl InboundMessage {
    fn rejected(framing: Framing, error: RpcError) -> Self {
        Self {
            framing,
            payload: Err(error),
        }
    }
}

pub struct McpServer {
    dispatcher: ToolDispatcher,
    session_id: String,
}

impl McpServer {
    pub fn new(dispatcher: ToolDispatcher) -> Self {
        Self {
            dispatcher,
            session_id: format!("stdio-{}", Uuid::now_v7()),
        }
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        let span = tracing::info_span!("mcp_session", session_id = %self.session_id);
        async {
            tracing::info!(
                initialized = self.dispatcher.is_initialized(),
                "mcp session started"
            );
            let mut reader = BufReader::new(io::stdin());
            let mut stdout = io::stdout();
            let result = self.serve(&mut reader, &mut stdout).await;
            tracing::info!(ok = result.is_ok(), "mcp session ended");
            result
        }
        .instrument(span)
        .await
    }

    /// Read until EOF, answering each message in its own framing.
    pub async fn serve<R, W>(&self, reader: &mut R, writer: &mut W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let message = read_message(reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some(message) = message else {
                break;
            };

            let response = match message.payload {
                Ok(incoming) => self.handle_incoming_message(incoming).await,
                Err(err) => {
                    tracing::warn!(
                        code = err.code,
                        error = %err.message,
                        "rejected inbound message"
                    );
                    Some(error_response(Value::Null, err))
                }
            };
            if let Some(response) = response {
                write_message(writer, message.framing, &response)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }
        Ok(())
    }

    async fn handle_incoming_message(&self, incoming: Value) -> Option<Value> {
        let Value::Array(batch) = incoming else {
            return self.handle_single_message(incoming).await;
        };

        if batch.is_empty() {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Batch request must not be empty"),
            ));
        }
        let mut responses = Vec::with_capacity(batch.len());
        for item in batch {
            if let Some(response) = self.handle_single_message(item).await {
                responses.push(response);
            }
        }
        (!responses.is_empty()).then_some(Value::Array(responses))
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

        // Responses to server-initiated requests; this server never sends any.
        let method = obj.get("method").and_then(Value::as_str)?;

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => {
                tracing::debug!(method, "request");
                Some(match self.handle_request(method, params).await {
                    Ok(payload) => success_response(id, payload),
                    Err(err) => error_response(id, err),
                })
            }
            None => {
                tracing::debug!(method, "notification");
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload(&params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.dispatcher.list_tools() })),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self, params: &Value) -> Value {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let protocol_version = requested
            .filter(|version| SUPPORTED_PROTOCOL_VERSIONS.contains(version))
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);

        let instructions = if self.dispatcher.is_initialized() {
            "Call list_sites to find the properties this account can read, then \
             search_analytics with a siteUrl from that list and a YYYY-MM-DD date range."
        } else {
            "Search Console credentials are not configured; tools will fail until the \
             server is restarted with GOOGLE_APPLICATION_CREDENTIALS or --credentials."
        };

        json!({
            "protocolVersion": protocol_version,
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
        let Value::Object(mut params) = params else {
            return Err(RpcError::invalid_params("tools/call params must be an object"));
        };
        let name = match params.get("name") {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => return Err(RpcError::invalid_params("tools/call requires a 'name'")),
        };
        let arguments = match params.remove("arguments") {
            None | Some(Value::Null) => None,
            Some(Value::Object(arguments)) => Some(arguments),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let invocation = Invocation::new(name, arguments);
        match self.dispatcher.call_tool(&invocation).await {
            Ok(result) => {
                tracing::info!(tool = %invocation.tool_name, "tool call succeeded");
                serde_json::to_value(&result).map_err(|e| RpcError::internal(e.to_string()))
            }
            Err(err) => {
                tracing::warn!(
                    tool = %invocation.tool_name,
                    code = err.code(),
                    error = %err,
                    "tool call failed"
                );
                Ok(tool_error_response(&invocation.tool_name, &err))
            }
        }
    }
}

fn tool_error_response(tool_name: &str, err: &GscError) -> Value {
    let mut envelope = Map::new();
    envelope.insert("error".to_string(), json!(err.code()));
    envelope.insert("message".to_string(), json!(err.to_string()));
    envelope.insert("tool".to_string(), json!(tool_name));
    if let Some(field) = err.field() {
        envelope.insert("field".to_string(), json!(field));
    }

    json!({
        "isError": true,
        "content": [{ "type": "text", "text": err.to_string() }],
        "structuredContent": envelope
    })
}

#[derive(Debug)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn parse_error(cause: impl std::fmt::Display) -> Self {
        Self {
            code: -32700,
            message: format!("Parse error: {cause}"),
        }
    }

    fn message_too_large(size: u64) -> Self {
        Self::invalid_request(format!(
            "Message of {size} bytes exceeds the {MAX_MESSAGE_BYTES} byte limit"
        ))
    }

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

    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
        }
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

/// Next message, or `None` at a clean EOF. Blank lines between messages are
/// skipped. A line opening with `Content-Length:` starts a header block;
/// anything else is one newline-delimited JSON message.
async fn read_message<R>(reader: &mut R) -> Result<Option<InboundMessage>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut first = Vec::new();
    loop {
        first.clear();
        let consumed = read_line_bounded(reader, &mut first).await?;
        if consumed == 0 {
            return Ok(None);
        }
        if consumed > MAX_MESSAGE_BYTES {
            return Ok(Some(InboundMessage::rejected(
                Framing::Line,
                RpcError::message_too_large(consumed as u64),
            )));
        }
        if !first.trim_ascii().is_empty() {
            break;
        }
    }

    let Some(mut content_length) = parse_content_length(&first) else {
        return Ok(Some(InboundMessage {
            framing: Framing::Line,
            payload: parse_payload(first.trim_ascii()),
        }));
    };

    let mut header = Vec::new();
    loop {
        header.clear();
        if read_line_bounded(reader, &mut header).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }
        if header.trim_ascii().is_empty() {
            break;
        }
        if let Some(parsed) = parse_content_length(&header) {
            content_length = parsed;
        }
    }

    let content_length = match content_length {
        Ok(length) => length,
        Err(err) => return Ok(Some(InboundMessage::rejected(Framing::ContentLength, err))),
    };
    if content_length > MAX_MESSAGE_BYTES as u64 {
        // Drain the oversized body so the next message starts on a boundary.
        let mut body = (&mut *reader).take(content_length);
        tokio::io::copy(&mut body, &mut tokio::io::sink()).await?;
        return Ok(Some(InboundMessage::rejected(
            Framing::ContentLength,
            RpcError::message_too_large(content_length),
        )));
    }

    let mut payload = vec![0_u8; content_length as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some(InboundMessage {
        framing: Framing::ContentLength,
        payload: parse_payload(&payload),
    }))
}

fn parse_payload(bytes: &[u8]) -> Result<Value, RpcError> {
    serde_json::from_slice(bytes).map_err(RpcError::parse_error)
}

/// `None` when `line` is not a `Content-Length` header.
fn parse_content_length(line: &[u8]) -> Option<Result<u64, RpcError>> {
    let line = std::str::from_utf8(line).ok()?;
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return None;
    }
    let value = value.trim();
    Some(
        value
            .parse::<u64>()
            .map_err(|_| RpcError::parse_error(format!("invalid Content-Length '{value}'"))),
    )
}

/// Consume one line through `\n` (or EOF), keeping at most
/// `MAX_MESSAGE_BYTES + 1` bytes of it. Returns the bytes consumed.
async fn read_line_bounded<R>(reader: &mut R, line: &mut Vec<u8>) -> Result<usize, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumed = 0;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(consumed);
        }
        let (taken, done) = match available.iter().position(|byte| *byte == b'\n') {
            Some(end) => (end + 1, true),
            None => (available.len(), false),
        };
        let room = (MAX_MESSAGE_BYTES + 1).saturating_sub(line.len());
        line.extend_from_slice(&available[..taken.min(room)]);
        reader.consume(taken);
        consumed += taken;
        if done {
            return Ok(consumed);
        }
    }
}

async fn write_message<W>(
    writer: &mut W,
    framing: Framing,
    value: &Value,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::testing::StubBackend;

    fn stub_server() -> McpServer {
        let backend = Arc::new(StubBackend::with_site("https://example.com/", "siteOwner"));
        McpServer::new(ToolDispatcher::new(AnalyticsClient::new(backend)))
    }

    async fn exchange(server: &McpServer, input: impl AsRef<[u8]>) -> String {
        let mut reader = BufReader::new(input.as_ref());
        let mut output = Vec::new();
        server.serve(&mut reader, &mut output).await.unwrap();
        String::from_utf8(output).unwrap()
    }

    fn replies(output: &str) -> Vec<Value> {
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Split one `Content-Length` framed reply off the front of `output`.
    fn split_framed(output: &str) -> (Value, &str) {
        let (header, rest) = output.split_once("\r\n\r\n").unwrap();
        let length: usize = header
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();
        (serde_json::from_str(&rest[..length]).unwrap(), &rest[length..])
    }

    fn ping_line(id: u64) -> String {
        format!("{}\n", json!({"jsonrpc": "2.0", "id": id, "method": "ping"}))
    }

    fn lines(messages: &[Value]) -> String {
        messages
            .iter()
            .map(|message| format!("{message}\n"))
            .collect()
    }

    #[tokio::test]
    async fn initialize_list_and_call_over_one_stream() {
        let server = stub_server();
        let input = lines(&[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2024-11-05"}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "list_sites", "arguments": {}}}),
        ]);

        let replies = replies(&exchange(&server, &input).await);
        assert_eq!(replies.len(), 3);

        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[0]["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(replies[0]["result"]["serverInfo"]["name"], "gsc-mcp");

        let tools = replies[1]["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[1]["name"], "search_analytics");
        assert!(tools[1].get("inputSchema").is_some());

        let result = &replies[2]["result"];
        assert!(result.get("isError").is_none());
        let text = result["content"][0]["text"].as_str().unwrap();
        let payload: Value = serde_json::from_str(text).unwrap();
        assert_eq!(payload["totalSites"], 1);
        assert_eq!(payload["sites"][0]["siteUrl"], "https://example.com/");
    }

    #[tokio::test]
    async fn unknown_protocol_version_gets_the_latest() {
        let server = stub_server();
        let payload = server.initialize_payload(&json!({"protocolVersion": "1999-01-01"}));
        assert_eq!(payload["protocolVersion"], SUPPORTED_PROTOCOL_VERSIONS[0]);
    }

    #[tokio::test]
    async fn notifications_produce_no_reply() {
        let server = stub_server();
        let input = lines(&[
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 1}}),
        ]);
        assert_eq!(exchange(&server, &input).await, "");
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let server = stub_server();
        let input = lines(&[json!({"jsonrpc": "2.0", "id": 7, "method": "sampling/createMessage"})]);
        let replies = replies(&exchange(&server, &input).await);
        assert_eq!(replies[0]["id"], 7);
        assert_eq!(replies[0]["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn unparsable_line_is_answered_and_session_continues() {
        let server = stub_server();
        let input = format!(
            "{{not json\n{}\n",
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})
        );
        let replies = replies(&exchange(&server, &input).await);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["error"]["code"], -32700);
        assert_eq!(replies[0]["id"], Value::Null);
        assert_eq!(replies[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn non_utf8_line_is_a_parse_error_and_session_continues() {
        let server = stub_server();
        let mut input = b"\xff\xfe garbage\n".to_vec();
        input.extend_from_slice(ping_line(2).as_bytes());

        let replies = replies(&exchange(&server, &input).await);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["error"]["code"], -32700);
        assert_eq!(replies[1]["id"], 2);
        assert_eq!(replies[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn bad_content_length_is_answered_and_session_continues() {
        let server = stub_server();
        let input = format!("Content-Length: abc\r\n\r\n{}", ping_line(3));

        let output = exchange(&server, &input).await;
        let (rejected, rest) = split_framed(&output);
        assert_eq!(rejected["error"]["code"], -32700);
        assert_eq!(rejected["id"], Value::Null);
        let replies = replies(rest);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["id"], 3);
    }

    #[tokio::test]
    async fn huge_content_length_is_rejected_without_allocating() {
        let server = stub_server();
        let input = format!("Content-Length: {}\r\n\r\n{{}}", u64::MAX);

        let output = exchange(&server, &input).await;
        let (rejected, rest) = split_framed(&output);
        assert_eq!(rejected["error"]["code"], -32600);
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_drained_and_next_message_answered() {
        let server = stub_server();
        let size = MAX_MESSAGE_BYTES + 1;
        let input = format!(
            "Content-Length: {size}\r\n\r\n{}{}",
            "x".repeat(size),
            ping_line(4)
        );

        let output = exchange(&server, &input).await;
        let (rejected, rest) = split_framed(&output);
        assert_eq!(rejected["error"]["code"], -32600);
        let replies = replies(rest);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["id"], 4);
    }

    #[tokio::test]
    async fn oversized_line_is_rejected_and_next_line_answered() {
        let server = stub_server();
        let input = format!("{}\n{}", "x".repeat(MAX_MESSAGE_BYTES + 10), ping_line(5));

        let replies = replies(&exchange(&server, &input).await);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["error"]["code"], -32600);
        assert_eq!(replies[1]["id"], 5);
    }

    #[tokio::test]
    async fn eof_inside_headers_ends_the_session_with_an_error() {
        let server = stub_server();
        let mut reader = BufReader::new("Content-Length: 10\r\n".as_bytes());
        let mut output = Vec::new();
        let err = server.serve(&mut reader, &mut output).await.unwrap_err();
        assert!(err.contains("Unexpected EOF"));
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_is_invalid_request() {
        let server = stub_server();
        let input = lines(&[json!({"jsonrpc": "1.0", "id": 4, "method": "ping"})]);
        let replies = replies(&exchange(&server, &input).await);
        assert_eq!(replies[0]["error"]["code"], -32600);
        assert_eq!(replies[0]["id"], 4);
    }

    #[tokio::test]
    async fn batches_are_answered_with_an_array() {
        let server = stub_server();
        let input = lines(&[json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            {"jsonrpc": "2.0", "id": 2, "method": "prompts/list"}
        ])]);
        let replies = replies(&exchange(&server, &input).await);
        let batch = replies[0].as_array().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1]["result"], json!({"prompts": []}));
    }

    #[tokio::test]
    async fn content_length_requests_get_content_length_replies() {
        let server = stub_server();
        let body = json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}).to_string();
        let input = format!("Content-Length: {}\r\n\r\n{body}", body.len());

        let output = exchange(&server, &input).await;
        let (header, reply) = output.split_once("\r\n\r\n").unwrap();
        assert!(header.starts_with("Content-Length: "));
        let reply: Value = serde_json::from_str(reply).unwrap();
        assert_eq!(reply["id"], 9);
        assert_eq!(reply["result"], json!({}));
    }

    #[tokio::test]
    async fn tool_call_without_credentials_is_a_tool_error() {
        let server = McpServer::new(ToolDispatcher::uninitialized());
        let input = lines(&[json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "tools/call",
            "params": {"name": "list_sites"}
        })]);

        let replies = replies(&exchange(&server, &input).await);
        let result = &replies[0]["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["error"], "not_initialized");
        assert_eq!(result["structuredContent"]["tool"], "list_sites");
        assert!(
            result["content"][0]["text"]
                .as_str()
                .unwrap()
                .contains("not initialized")
        );
    }

    #[tokio::test]
    async fn validation_failures_carry_the_field() {
        let server = stub_server();
        let response = server
            .handle_tools_call(json!({
                "name": "search_analytics",
                "arguments": {
                    "siteUrl": "https://example.com/",
                    "startDate": "2024-01-01",
                    "endDate": "2024-01-31",
                    "type": "podcasts"
                }
            }))
            .await
            .unwrap();
        assert_eq!(response["isError"], true);
        assert_eq!(response["structuredContent"]["error"], "validation_failed");
        assert_eq!(response["structuredContent"]["field"], "type");
    }

    #[tokio::test]
    async fn malformed_tool_call_params_are_invalid_params() {
        let server = stub_server();
        for params in [
            json!({}),
            json!({"name": ""}),
            json!({"name": "list_sites", "arguments": "query"}),
            json!("list_sites"),
        ] {
            let err = server.handle_tools_call(params).await.unwrap_err();
            assert_eq!(err.code, -32602);
        }
    }

    #[tokio::test]
    async fn diagnose_reports_degraded_without_credentials() {
        let config = McpRuntimeConfig {
            credentials_path: Some(PathBuf::from("/nonexistent/gsc-key.json")),
            api_url: DEFAULT_API_URL.to_string(),
        };
        let (report, code) = diagnose(&config).await;
        assert_eq!(code, EXIT_DEGRADED);
        assert_eq!(report["status"], "degraded");
        assert_eq!(report["initialized"], false);
        assert_eq!(report["tools"], json!(["list_sites", "search_analytics"]));
    }

    #[test]
    fn unreadable_key_file_leaves_dispatcher_uninitialized() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{\"type\": \"service_account\"}").unwrap();
        let dispatcher = dispatcher_for(Some(file.path()), DEFAULT_API_URL);
        assert!(!dispatcher.is_initialized());
    }
}
