#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

//! MCP Server Integration Tests
//!
//! A full client session over an in-memory transport: handshake, tool
//! discovery, note capture and search through the public API.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use notes_mcp::database::{IndexStats, NamespaceStats, ScoredVector, VectorRecord, VectorStore};
use notes_mcp::embeddings::Embedder;
use notes_mcp::mcp::{
    CallToolParams, ConnectionState, McpServer, SERVER_NAME, SearchNotesHandler, ToolContent,
    ToolHandler, register_notes_tools,
};
use notes_mcp::notes::NotesService;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Embeds text as its length so notes of different size are distinguishable
struct LengthEmbedder;

#[async_trait]
impl Embedder for LengthEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
    }
}

/// Keeps records in memory and scores every record 0.5
#[derive(Default)]
struct MemoryStore {
    records: Mutex<BTreeMap<String, Vec<VectorRecord>>>,
    offline: bool,
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<u64> {
        let count = records.len() as u64;
        self.records
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .entry(namespace.to_string())
            .or_default()
            .extend(records);
        Ok(count)
    }

    async fn query(
        &self,
        namespace: &str,
        _vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<ScoredVector>> {
        let records = self.records.lock().map_err(|_| anyhow!("poisoned"))?;
        Ok(records
            .get(namespace)
            .into_iter()
            .flatten()
            .take(top_k)
            .map(|record| ScoredVector {
                id: record.id.clone(),
                score: Some(0.5),
                metadata: include_metadata.then(|| record.metadata.clone()),
            })
            .collect())
    }

    async fn describe_index_stats(&self) -> Result<IndexStats> {
        if self.offline {
            return Err(anyhow!("connection refused"));
        }
        let records = self.records.lock().map_err(|_| anyhow!("poisoned"))?;
        Ok(IndexStats {
            namespaces: records
                .iter()
                .map(|(name, list)| {
                    let stats = NamespaceStats {
                        vector_count: list.len() as u64,
                    };
                    (name.clone(), stats)
                })
                .collect(),
            dimension: Some(2),
            total_vector_count: records.values().map(Vec::len).sum::<usize>() as u64,
        })
    }
}

async fn start_server(store: MemoryStore) -> Arc<McpServer> {
    let notes = Arc::new(NotesService::new(
        Arc::new(LengthEmbedder),
        Arc::new(store),
        "mcp",
    ));
    let server = McpServer::new(SERVER_NAME.to_string(), "1.0.0".to_string());
    register_notes_tools(&server, notes).await;
    Arc::new(server)
}

async fn run_session(server: &Arc<McpServer>, messages: &[Value]) -> Vec<Value> {
    let input: String = messages.iter().map(|m| format!("{m}\n")).collect();
    let mut output = Vec::new();

    Arc::clone(server)
        .serve(input.as_bytes(), &mut output)
        .await
        .expect("session completes");

    String::from_utf8(output)
        .expect("utf-8 output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("JSON line"))
        .collect()
}

fn tool_text(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"]
        .as_str()
        .expect("text content");
    serde_json::from_str(text).expect("tool output is JSON")
}

#[tokio::test]
async fn mcp_server_initialization() {
    let server = start_server(MemoryStore::default()).await;

    assert_eq!(server.server_info.name, "pinecone_notes");
    assert_eq!(server.connection_state().await, ConnectionState::Uninitialized);
    assert_eq!(server.tools.read().await.len(), 2);
}

#[tokio::test]
async fn full_session_adds_then_finds_note() {
    let server = start_server(MemoryStore::default()).await;

    let responses = run_session(
        &server,
        &[
            json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {
                    "protocolVersion": "2025-06-18",
                    "capabilities": {},
                    "clientInfo": {"name": "integration", "version": "1.0"}
                }
            }),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "add_note", "arguments": {"note": "hello"}}
            }),
        ],
    )
    .await;

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["result"]["protocolVersion"], "2025-06-18");
    assert_eq!(responses[1]["result"]["tools"].as_array().map(Vec::len), Some(2));
    assert_eq!(
        tool_text(&responses[2]),
        json!({"message": "Successfully added note."})
    );

    // Tool calls within a session run concurrently, so search in a later one
    let responses = run_session(
        &server,
        &[json!({
            "jsonrpc": "2.0", "id": 4, "method": "tools/call",
            "params": {"name": "search_notes", "arguments": {"query": "greeting"}}
        })],
    )
    .await;

    let documents = tool_text(&responses[0])["documents"].clone();
    assert_eq!(
        documents,
        json!([{"content": "hello", "score": 0.5, "source": "aichat", "namespace": "mcp"}])
    );
    assert_eq!(server.connection_state().await, ConnectionState::Closed);
}

#[tokio::test]
async fn search_handler_hides_store_outage() {
    let store = MemoryStore {
        offline: true,
        ..MemoryStore::default()
    };
    let notes = Arc::new(NotesService::new(Arc::new(LengthEmbedder), Arc::new(store), "mcp"));
    let handler = SearchNotesHandler::new(notes);

    let mut arguments = HashMap::new();
    arguments.insert("query".to_string(), json!("anything"));
    let result = handler
        .handle(CallToolParams {
            name: "search_notes".to_string(),
            arguments: Some(arguments),
        })
        .await
        .expect("handler returns a result");

    assert_eq!(result.is_error, Some(false));
    let ToolContent::Text { text } = &result.content[0];
    let payload: Value = serde_json::from_str(text).expect("JSON payload");
    assert_eq!(payload, json!({"documents": []}));
}
