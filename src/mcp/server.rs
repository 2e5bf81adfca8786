//! MCP Server Implementation
//!
//! Connection handling and message routing for a newline-delimited JSON-RPC
//! transport. `serve_stdio` binds it to the process streams; `serve` accepts
//! any reader and writer.

use crate::mcp::errors::{ErrorHandler, McpError};
use crate::mcp::protocol::*;
use crate::mcp::validation::McpValidator;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

const INSTRUCTIONS: &str = "Personal notes server. Use search_notes to look up related notes \
    before answering and add_note to save something worth remembering.";

/// MCP Server state and configuration
pub struct McpServer {
    pub server_info: Implementation,
    pub capabilities: ServerCapabilities,
    /// Registered tools, listed in name order
    pub tools: Arc<RwLock<BTreeMap<String, Tool>>>,
    pub tool_handlers: Arc<RwLock<BTreeMap<String, Box<dyn ToolHandler>>>>,
    pub connection_state: Arc<RwLock<ConnectionState>>,
    pub validator: Arc<McpValidator>,
}

/// Connection state tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

/// Message handler for processing incoming messages
pub struct MessageHandler {
    server: Arc<McpServer>,
}

/// Tool calls that have not answered yet, keyed by request id
#[derive(Default)]
struct InFlightCalls {
    tasks: JoinSet<(RequestId, JsonRpcMessage)>,
    handles: HashMap<RequestId, AbortHandle>,
}

impl InFlightCalls {
    fn spawn<F>(&mut self, id: RequestId, call: F)
    where
        F: Future<Output = JsonRpcMessage> + Send + 'static,
    {
        if self.handles.contains_key(&id) {
            warn!("Request id {:?} reused while a call is still running", id);
        }
        let task_id = id.clone();
        let handle = self.tasks.spawn(async move { (task_id, call.await) });
        self.handles.insert(id, handle);
    }

    /// Abort the call named by a cancellation; it will not be answered
    fn cancel(&mut self, cancelled: &CancelledParams) {
        match self.handles.remove(&cancelled.request_id) {
            Some(handle) => {
                handle.abort();
                info!(
                    "Cancelled request {:?}: {}",
                    cancelled.request_id,
                    cancelled.reason.as_deref().unwrap_or("no reason given")
                );
            }
            None => debug!(
                "Cancellation for unknown or finished request {:?}",
                cancelled.request_id
            ),
        }
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the next call to finish; `None` once nothing is running.
    /// Aborted calls are skipped.
    async fn next_response(&mut self) -> Option<JsonRpcMessage> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((id, response)) => {
                    self.handles.remove(&id);
                    return Some(response);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => error!("Tool call task failed: {}", e),
            }
        }
        None
    }
}

impl McpServer {
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        let server_info = Implementation { name, version };

        let capabilities = ServerCapabilities {
            experimental: None,
            logging: Some(LoggingCapability {}),
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        Self {
            server_info,
            capabilities,
            tools: Arc::new(RwLock::new(BTreeMap::new())),
            tool_handlers: Arc::new(RwLock::new(BTreeMap::new())),
            connection_state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
            validator: Arc::new(McpValidator::new()),
        }
    }

    /// Register a tool with the server
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();

        {
            let mut tools = self.tools.write().await;
            tools.insert(tool_name.clone(), tool);
        }

        {
            let mut handlers = self.tool_handlers.write().await;
            handlers.insert(tool_name.clone(), Box::new(handler));
        }

        debug!("Registered tool: {}", tool_name);
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Process newline-delimited messages from `reader` until EOF.
    ///
    /// Tool calls run as separate tasks so the connection keeps reading while
    /// they execute; their responses are written as they complete. Other
    /// requests are answered in order. Calls still running at EOF are awaited
    /// before returning.
    #[inline]
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut calls = InFlightCalls::default();
        let mut reading = true;

        while reading || !calls.is_empty() {
            tokio::select! {
                next = lines.next_line(), if reading => match next {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if !line.is_empty() {
                            self.process_line(line, &mut writer, &mut calls).await?;
                        }
                    }
                    Ok(None) => {
                        info!("EOF reached, closing connection");
                        reading = false;
                    }
                    Err(e) => {
                        error!("Error reading from input: {}", e);
                        reading = false;
                    }
                },
                Some(response) = calls.next_response() => {
                    self.send_message(&mut writer, &response).await?;
                }
                else => break,
            }
        }

        {
            let mut state = self.connection_state.write().await;
            *state = ConnectionState::Closed;
        }

        info!("MCP server stopped");
        Ok(())
    }

    async fn process_line<W>(
        self: &Arc<Self>,
        line: &str,
        writer: &mut W,
        calls: &mut InFlightCalls,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let raw_value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                let error = McpError::ParseError {
                    message: format!("Parse error: {e}"),
                };
                error.log();
                return self.send_message(writer, &error.to_error_response(None)).await;
            }
        };

        let message = match self.validator.validate_raw_message(&raw_value) {
            Ok(message) => message,
            Err(e) => {
                e.log();
                let id = raw_value
                    .get("id")
                    .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
                // Notifications never get a response, even malformed ones
                if id.is_none() && raw_value.get("method").is_some() {
                    return Ok(());
                }
                return self.send_message(writer, &e.to_error_response(id)).await;
            }
        };

        let handler = MessageHandler::new(Arc::clone(self));
        match message {
            JsonRpcMessage::Request(request) if request.method == "tools/call" => {
                let id = request.id.clone();
                calls.spawn(id, async move { handler.handle_request(request).await });
                Ok(())
            }
            JsonRpcMessage::Request(request) => {
                let response = handler.handle_request(request).await;
                self.send_message(writer, &response).await
            }
            JsonRpcMessage::Notification(notification)
                if notification.method == "notifications/cancelled" =>
            {
                let cancelled = notification
                    .params
                    .and_then(|params| serde_json::from_value::<CancelledParams>(params).ok());
                if let Some(cancelled) = cancelled {
                    calls.cancel(&cancelled);
                }
                Ok(())
            }
            JsonRpcMessage::Notification(notification) => {
                handler.handle_notification(notification).await;
                Ok(())
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Received unexpected response message from client");
                Ok(())
            }
        }
    }

    /// Send a message to the client
    async fn send_message<W>(&self, writer: &mut W, message: &JsonRpcMessage) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let json = serde_json::to_string(message)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection_state.read().await.clone()
    }
}

impl MessageHandler {
    #[inline]
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// Answer a request; failures become JSON-RPC error responses
    #[inline]
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        debug!("Handling request: {}", request.method);

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => Err(McpError::MethodNotFound {
                method: method.to_string(),
            }
            .into()),
        };

        match response {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(e) => ErrorHandler::handle_error(&e, Some(request.id)),
        }
    }

    /// Handle a notification other than cancellation
    #[inline]
    pub async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => {
                let mut state = self.server.connection_state.write().await;
                *state = ConnectionState::Ready;
                info!("Server ready to handle requests");
            }
            _ => {
                debug!("Ignoring notification: {}", notification.method);
            }
        }
    }

    /// Handle initialize request
    #[inline]
    pub async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p).map_err(McpError::from)?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Initialize request missing parameters".to_string(),
                }
                .into());
            }
        };

        let protocol_version = negotiate_protocol_version(&params.protocol_version);
        if protocol_version != params.protocol_version {
            warn!(
                "Client requested protocol {}, offering {}",
                params.protocol_version, protocol_version
            );
        }

        {
            let mut state = self.server.connection_state.write().await;
            *state = ConnectionState::Initializing;
        }

        let result = InitializeResult {
            protocol_version: protocol_version.to_string(),
            capabilities: self.server.capabilities.clone(),
            server_info: self.server.server_info.clone(),
            instructions: Some(INSTRUCTIONS.to_string()),
        };

        info!(
            "Client initialized: {} {}",
            params.client_info.name, params.client_info.version
        );
        Ok(serde_json::to_value(result)?)
    }

    /// Handle list tools request
    #[inline]
    pub async fn handle_list_tools(&self) -> Result<Value> {
        let tools = self.server.tools.read().await;
        let result = ListToolsResult {
            tools: tools.values().cloned().collect(),
        };
        Ok(serde_json::to_value(result)?)
    }

    /// Handle call tool request
    #[inline]
    pub async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p).map_err(McpError::from)?,
            None => {
                return Err(McpError::InvalidParameters {
                    message: "Tool call request missing parameters".to_string(),
                }
                .into());
            }
        };

        let handlers = self.server.tool_handlers.read().await;
        let handler = handlers
            .get(&params.name)
            .ok_or_else(|| McpError::ToolNotFound {
                name: params.name.clone(),
            })?;

        let result = handler.handle(params).await?;
        Ok(serde_json::to_value(result)?)
    }
}
