//! MCP (Model Context Protocol) Server Implementation
//!
//! A JSON-RPC 2.0 server over stdio exposing the notes tools.


pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod validation;

pub use errors::{ErrorHandler, McpError, McpResult};
pub use protocol::*;
pub use server::{ConnectionState, McpServer, ToolHandler};
pub use tools::{AddNoteHandler, SearchNotesHandler, register_notes_tools};

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "pinecone_notes";
