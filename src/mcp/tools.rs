//! MCP Tools Implementation
//!
//! The two tools exposed to clients: `search_notes` and `add_note`, both
//! backed by a shared `NotesService`.

use crate::NotesError;
use crate::mcp::errors::McpError;
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use crate::notes::NotesService;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const SEARCH_NOTES_TOOL: &str = "search_notes";
pub const ADD_NOTE_TOOL: &str = "add_note";
pub const ADD_NOTE_SUCCESS: &str = "Successfully added note.";

/// Note search tool handler
pub struct SearchNotesHandler {
    notes: Arc<NotesService>,
}

/// Note ingestion tool handler
pub struct AddNoteHandler {
    notes: Arc<NotesService>,
}

impl SearchNotesHandler {
    #[inline]
    pub fn new(notes: Arc<NotesService>) -> Self {
        Self { notes }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: SEARCH_NOTES_TOOL.to_string(),
            description: Some(
                "Search the user's notes across every namespace and return the three \
                 closest matches"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look for"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchNotesHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let query = string_argument(&args, SEARCH_NOTES_TOOL, "query")?;

        debug!("search_notes: query='{}'", query);

        let documents = match self.notes.search(query).await {
            Ok(results) => {
                if results.is_partial() {
                    warn!(
                        "search_notes skipped namespaces: {}",
                        results.failed_namespaces.join(", ")
                    );
                }
                results.matches
            }
            Err(NotesError::InvalidInput(message)) => {
                warn!("search_notes rejected query: {}", message);
                Vec::new()
            }
            Err(e) => {
                error!("search_notes failed: {}", e);
                Vec::new()
            }
        };

        let response = json!({ "documents": documents });
        Ok(CallToolResult::text(serde_json::to_string_pretty(&response)?))
    }
}

impl AddNoteHandler {
    #[inline]
    pub fn new(notes: Arc<NotesService>) -> Self {
        Self { notes }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: ADD_NOTE_TOOL.to_string(),
            description: Some("Save a note for later retrieval".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "note": {
                        "type": "string",
                        "description": "Text of the note"
                    }
                },
                "required": ["note"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for AddNoteHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let note = string_argument(&args, ADD_NOTE_TOOL, "note")?;

        match self.notes.add_note(note).await {
            Ok(receipt) => {
                debug!("add_note stored {}", receipt.id);
                let response = json!({ "message": ADD_NOTE_SUCCESS });
                Ok(CallToolResult::text(serde_json::to_string_pretty(&response)?))
            }
            Err(e) => {
                error!("add_note failed: {}", e);
                Ok(CallToolResult::error(format!("Failed to add note: {e}")))
            }
        }
    }
}

/// Register both notes tools on `server`
#[inline]
pub async fn register_notes_tools(server: &McpServer, notes: Arc<NotesService>) {
    server
        .register_tool(
            SearchNotesHandler::tool_definition(),
            SearchNotesHandler::new(Arc::clone(&notes)),
        )
        .await;
    server
        .register_tool(AddNoteHandler::tool_definition(), AddNoteHandler::new(notes))
        .await;
}

fn string_argument<'a>(
    args: &'a HashMap<String, Value>,
    tool: &str,
    name: &str,
) -> std::result::Result<&'a str, McpError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::InvalidToolParameters {
            tool: tool.to_string(),
            message: format!("missing required string parameter: {name}"),
        })
}
