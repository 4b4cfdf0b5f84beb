//! Minimal MCP client speaking newline-delimited JSON-RPC 2.0.
//!
//! The client is strictly sequential: one request is in flight at a time, and
//! any message that is not the response to it (server notifications, server
//! requests) is skipped.

use std::error::Error;
use std::ffi::OsStr;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const NO_CONTENT: &str = "No content in result";

#[derive(Debug)]
pub enum ClientError {
    Spawn { command: String, source: std::io::Error },
    Io(std::io::Error),
    Protocol(String),
    Rpc { code: i64, message: String },
    Closed,
    Timeout(Duration),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { command, source } => {
                write!(f, "failed to start server '{command}': {source}")
            }
            Self::Io(err) => write!(f, "server I/O failed: {err}"),
            Self::Protocol(message) => write!(f, "protocol error: {message}"),
            Self::Rpc { code, message } => write!(f, "server returned error {code}: {message}"),
            Self::Closed => f.write_str("server closed the connection"),
            Self::Timeout(after) => {
                write!(f, "server did not respond within {}s", after.as_secs_f32())
            }
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Name and version sent in `initialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

impl Default for Implementation {
    fn default() -> Self {
        Self {
            name: "bq-mcp-client".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    pub server_info: Implementation,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolsPage {
    #[serde(default)]
    tools: Vec<ToolInfo>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentItem {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    /// First text content item, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|item| match item {
            ContentItem::Text { text } => Some(text.as_str()),
            ContentItem::Other => None,
        })
    }
}

/// Renders a tool result for display: the first text item, pretty-printed
/// when it is JSON.
#[must_use]
pub fn render_tool_result(result: &ToolCallResult) -> String {
    let Some(text) = result.first_text() else {
        return NO_CONTENT.to_string();
    };
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| text.to_string())
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Sequential MCP client over any async reader/writer pair.
pub struct McpClient<R, W> {
    lines: Lines<BufReader<R>>,
    writer: W,
    client_info: Implementation,
    next_id: u64,
}

impl<R, W> McpClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            client_info: Implementation::default(),
            next_id: 1,
        }
    }

    #[must_use]
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client_info = Implementation {
            name: name.into(),
            version: version.into(),
        };
        self
    }

    /// Performs the `initialize` handshake followed by the
    /// `notifications/initialized` notification.
    ///
    /// # Errors
    /// Returns `ClientError` on transport failure or an error response.
    pub async fn connect(&mut self) -> Result<InitializeResult, ClientError> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": self.client_info,
                }),
            )
            .await?;
        let init: InitializeResult = decode(result)?;
        self.notify("notifications/initialized").await?;
        debug!(
            server = %init.server_info.name,
            version = %init.server_info.version,
            protocol = %init.protocol_version,
            "mcp session initialized"
        );
        Ok(init)
    }

    /// Like [`McpClient::connect`], giving up after `timeout`.
    ///
    /// # Errors
    /// Returns `ClientError::Timeout` when the handshake does not finish in
    /// time, or any error from `connect`.
    pub async fn connect_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<InitializeResult, ClientError> {
        tokio::time::timeout(timeout, self.connect())
            .await
            .map_err(|_| ClientError::Timeout(timeout))?
    }

    /// Lists every tool, following `nextCursor`.
    ///
    /// # Errors
    /// Returns `ClientError` on transport failure or an error response.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolInfo>, ClientError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor
                .take()
                .map_or_else(|| json!({}), |cursor| json!({ "cursor": cursor }));
            let page: ToolsPage = decode(self.request("tools/list", params).await?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Invokes a tool by name.
    ///
    /// # Errors
    /// Returns `ClientError::Rpc` when the server rejects the call.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, ClientError> {
        let params = json!({ "name": name, "arguments": arguments });
        decode(self.request("tools/call", params).await?)
    }

    async fn request(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Err(ClientError::Closed);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message: Value = serde_json::from_str(line)
                .map_err(|err| ClientError::Protocol(format!("invalid JSON from server: {err}")))?;
            if message.get("id").and_then(Value::as_u64) != Some(id)
                || message.get("method").is_some()
            {
                let method = message.get("method").and_then(Value::as_str).unwrap_or("-");
                debug!(method, "skipping unrelated server message");
                continue;
            }
            if let Some(error) = message.get("error") {
                let error: RpcError = decode(error.clone())?;
                return Err(ClientError::Rpc {
                    code: error.code,
                    message: error.message,
                });
            }
            return message
                .get("result")
                .cloned()
                .ok_or_else(|| ClientError::Protocol(format!("response {id} has no result")));
        }
    }

    async fn notify(&mut self, method: &str) -> Result<(), ClientError> {
        self.send(&json!({ "jsonrpc": "2.0", "method": method })).await
    }

    async fn send(&mut self, message: &Value) -> Result<(), ClientError> {
        let mut line = message.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(value)
        .map_err(|err| ClientError::Protocol(format!("unexpected response shape: {err}")))
}

/// A server subprocess with its stdio wired to an [`McpClient`].
pub struct StdioServer {
    child: Child,
    client: McpClient<ChildStdout, ChildStdin>,
}

impl StdioServer {
    /// Spawns `command` with piped stdin/stdout. Stderr and the environment
    /// are inherited.
    ///
    /// # Errors
    /// Returns `ClientError::Spawn` if the process cannot be started.
    pub fn spawn<S: AsRef<OsStr>>(command: &str, args: &[S]) -> Result<Self, ClientError> {
        let spawn_err = |source: std::io::Error| ClientError::Spawn {
            command: command.to_string(),
            source,
        };
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ClientError::Protocol(
                "child process has no piped stdio".to_string(),
            ));
        };
        debug!(command, pid = child.id(), "spawned server");
        Ok(Self {
            child,
            client: McpClient::new(stdout, stdin),
        })
    }

    #[must_use]
    pub fn with_client_info(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.client = self.client.with_client_info(name, version);
        self
    }

    pub const fn client(&mut self) -> &mut McpClient<ChildStdout, ChildStdin> {
        &mut self.client
    }

    /// Handshakes with the server, killing it if no answer arrives in time.
    ///
    /// # Errors
    /// Returns `ClientError::Timeout` on expiry, or any handshake error.
    pub async fn connect_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<InitializeResult, ClientError> {
        let result = self.client.connect_with_timeout(timeout).await;
        if matches!(result, Err(ClientError::Timeout(_))) {
            warn!(timeout_secs = timeout.as_secs(), "server handshake timed out");
            if let Err(err) = self.child.start_kill() {
                warn!(error = %err, "failed to kill server");
            }
        }
        result
    }

    /// Closes the server's stdin and waits for it to exit, killing it after a
    /// short grace period.
    ///
    /// # Errors
    /// Returns `ClientError::Io` if waiting on or killing the child fails.
    pub async fn shutdown(self) -> Result<ExitStatus, ClientError> {
        let Self { mut child, client } = self;
        drop(client);
        if let Ok(status) = tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            return Ok(status?);
        }
        warn!("server did not exit after stdin closed, killing it");
        child.kill().await?;
        Ok(child.wait().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_result(text: &str) -> ToolCallResult {
        ToolCallResult {
            content: vec![ContentItem::Text {
                text: text.to_string(),
            }],
            is_error: None,
        }
    }

    #[test]
    fn renders_json_pretty() {
        let rendered = render_tool_result(&text_result(r#"["a","b"]"#));
        assert_eq!(rendered, "[\n  \"a\",\n  \"b\"\n]");
    }

    #[test]
    fn renders_plain_text_verbatim() {
        assert_eq!(render_tool_result(&text_result("ok")), "ok");
    }

    #[test]
    fn renders_placeholder_when_empty() {
        assert_eq!(render_tool_result(&ToolCallResult::default()), NO_CONTENT);
        let images_only = ToolCallResult {
            content: vec![ContentItem::Other],
            is_error: None,
        };
        assert_eq!(render_tool_result(&images_only), NO_CONTENT);
    }

    #[test]
    fn content_items_tolerate_unknown_types() {
        let result: ToolCallResult = serde_json::from_value(json!({
            "content": [
                { "type": "image", "data": "...", "mimeType": "image/png" },
                { "type": "text", "text": "hello" }
            ],
            "isError": true
        }))
        .expect("tool result");
        assert!(result.is_error());
        assert_eq!(result.first_text(), Some("hello"));
    }

    #[tokio::test]
    async fn skips_notifications_and_surfaces_rpc_errors() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);

        let server = tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let request = lines.next_line().await.expect("read").expect("request");
            let request: Value = serde_json::from_str(&request).expect("json");
            assert_eq!(request["method"], "tools/call");
            let id = request["id"].clone();
            let replies = [
                json!({ "jsonrpc": "2.0", "method": "notifications/message", "params": {} }),
                json!({ "jsonrpc": "2.0", "id": 999, "result": {} }),
                json!({ "jsonrpc": "2.0", "id": id, "error": { "code": -32602, "message": "bad params" } }),
            ];
            for reply in replies {
                let mut line = reply.to_string();
                line.push('\n');
                server_write.write_all(line.as_bytes()).await.expect("write");
            }
        });

        let mut client = McpClient::new(client_read, client_write);
        let err = client
            .call_tool("describe_table", json!({}))
            .await
            .expect_err("rpc error");
        assert!(matches!(err, ClientError::Rpc { code: -32602, .. }));
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn handshake_times_out_on_silent_server() {
        let (client_io, _server_io) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(client_io);
        let mut client = McpClient::new(read, write);
        let err = client
            .connect_with_timeout(Duration::from_millis(50))
            .await
            .expect_err("timeout");
        assert!(matches!(err, ClientError::Timeout(_)));
    }
}
