//! ThreadBox MCP Server
//!
//! Exposes the ThreadBox virtual filesystem as MCP tools so AI agents can
//! persist and retrieve artefacts in versioned, session-scoped trees.
//!
//! The [`Dispatcher`] maps named tool invocations with JSON argument maps
//! onto storage operations and encodes the outcome as a [`ToolResult`]; the
//! [`ThreadBoxServer`] is a thin rmcp adapter around it. Keeping the
//! dispatch layer transport-free lets the tool semantics be tested without
//! a live stdio session.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    model::*,
    schemars::{self, JsonSchema},
    service::{RequestContext, RoleServer},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use threadbox::{StorageError, ThreadBox, VirtualEntry};

/// Arguments for the `write_file` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileParams {
    /// Virtual path of the file to create or overwrite.
    pub path: String,
    /// File content; UTF-8 text unless `base64` is true.
    pub content: String,
    /// When true, `content` carries base64-encoded binary data.
    #[serde(default)]
    pub base64: Option<bool>,
    /// Session to operate in; omit for the default session.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Arguments for the `read_file` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileParams {
    /// Virtual path of the file to read.
    pub path: String,
    /// Session to operate in; omit for the default session.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Arguments for the `list_directory` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListDirectoryParams {
    /// Virtual path of the directory to list.
    pub path: String,
    /// Session to operate in; omit for the default session.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Arguments for the `rename_node` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameNodeParams {
    /// Virtual path of the file to rename.
    pub path: String,
    /// New basename; must not contain `/`.
    pub new_name: String,
    /// Session to operate in; omit for the default session.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Arguments for the `move_node` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MoveNodeParams {
    /// Virtual path of the file to move.
    pub path: String,
    /// Destination directory; created if missing.
    pub new_directory: String,
    /// Session to operate in; omit for the default session.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Arguments for the `export_session_zip` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExportSessionZipParams {
    /// Session to export; omit for the default session.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Host directory to write the archive into; defaults to the system
    /// temporary directory.
    #[serde(default)]
    pub destination: Option<String>,
}

/// Outcome of one tool invocation.
///
/// Successful payloads are JSON; error payloads are a human-readable
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub is_error: bool,
    pub payload: String,
}

impl ToolResult {
    fn success(payload: String) -> Self {
        Self {
            is_error: false,
            payload,
        }
    }

    fn error(message: String) -> Self {
        Self {
            is_error: true,
            payload: message,
        }
    }
}

/// Internal error carrying the message that becomes an error payload.
struct ToolError(String);

impl From<StorageError> for ToolError {
    fn from(err: StorageError) -> Self {
        Self(err.to_string())
    }
}

/// Maps named tool invocations onto storage engine operations.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: ThreadBox,
}

impl Dispatcher {
    pub fn new(store: ThreadBox) -> Self {
        Self { store }
    }

    /// Dispatch one tool call. Returns `None` for an unknown tool name;
    /// every other outcome, including argument and storage errors, is a
    /// [`ToolResult`].
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Option<ToolResult> {
        let outcome = match name {
            "write_file" => self
                .run(arguments, |p: WriteFileParams| self.write_file(p))
                .await,
            "read_file" => self
                .run(arguments, |p: ReadFileParams| self.read_file(p))
                .await,
            "list_directory" => self
                .run(arguments, |p: ListDirectoryParams| self.list_directory(p))
                .await,
            "rename_node" => self
                .run(arguments, |p: RenameNodeParams| self.rename_node(p))
                .await,
            "move_node" => self
                .run(arguments, |p: MoveNodeParams| self.move_node(p))
                .await,
            "export_session_zip" => self
                .run(arguments, |p: ExportSessionZipParams| {
                    self.export_session_zip(p)
                })
                .await,
            _ => return None,
        };

        Some(match outcome {
            Ok(value) => match serde_json::to_string(&value) {
                Ok(payload) => ToolResult::success(payload),
                Err(e) => ToolResult::error(format!("failed to encode response: {e}")),
            },
            Err(ToolError(message)) => ToolResult::error(message),
        })
    }

    /// Parse arguments and invoke a handler.
    async fn run<P, F, Fut>(
        &self,
        arguments: Option<JsonObject>,
        handler: F,
    ) -> Result<Value, ToolError>
    where
        P: DeserializeOwned,
        F: FnOnce(P) -> Fut,
        Fut: std::future::Future<Output = Result<Value, ToolError>>,
    {
        let params = parse_args::<P>(arguments)?;
        handler(params).await
    }

    async fn write_file(&self, params: WriteFileParams) -> Result<Value, ToolError> {
        let content = if params.base64.unwrap_or(false) {
            BASE64.decode(params.content.as_bytes()).map_err(|e| {
                ToolError::from(StorageError::Decode(format!(
                    "invalid base64 content: {e}"
                )))
            })?
        } else {
            params.content.into_bytes()
        };

        let entry = self
            .store
            .write_file(&params.path, content, params.session_id.as_deref())
            .await?;
        Ok(entry_payload(&entry))
    }

    async fn read_file(&self, params: ReadFileParams) -> Result<Value, ToolError> {
        let entry = self
            .store
            .read_file(&params.path, params.session_id.as_deref())
            .await?;
        let Some(entry) = entry else {
            return Err(ToolError(format!("File not found: {}", params.path)));
        };

        let bytes = entry.content.clone().unwrap_or_default();
        let (content, encoded) = match String::from_utf8(bytes) {
            Ok(text) => (text, false),
            Err(err) => (BASE64.encode(err.into_bytes()), true),
        };

        Ok(json!({
            "inodeId": entry.id,
            "path": entry.path,
            "version": entry.version,
            "content": content,
            "base64": encoded,
            "sessionId": entry.session,
        }))
    }

    async fn list_directory(&self, params: ListDirectoryParams) -> Result<Value, ToolError> {
        let listing = self
            .store
            .list_directory(&params.path, params.session_id.as_deref())
            .await?;

        let directories: Vec<Value> = listing
            .directories
            .iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "path": d.path,
                    "inodeId": d.id,
                    "updatedAt": d.updated_at,
                })
            })
            .collect();
        let files: Vec<Value> = listing
            .files
            .iter()
            .map(|f| {
                json!({
                    "name": f.name,
                    "path": f.path,
                    "inodeId": f.id,
                    "version": f.version,
                    "updatedAt": f.updated_at,
                })
            })
            .collect();

        Ok(json!({
            "path": listing.path,
            "sessionId": listing.session,
            "directories": directories,
            "files": files,
        }))
    }

    async fn rename_node(&self, params: RenameNodeParams) -> Result<Value, ToolError> {
        let entry = self
            .store
            .rename_node(&params.path, &params.new_name, params.session_id.as_deref())
            .await?;
        Ok(entry_payload(&entry))
    }

    async fn move_node(&self, params: MoveNodeParams) -> Result<Value, ToolError> {
        let entry = self
            .store
            .move_node(
                &params.path,
                &params.new_directory,
                params.session_id.as_deref(),
            )
            .await?;
        Ok(entry_payload(&entry))
    }

    async fn export_session_zip(
        &self,
        params: ExportSessionZipParams,
    ) -> Result<Value, ToolError> {
        let destination = params.destination.as_ref().map(std::path::Path::new);
        let path = self
            .store
            .export_session_zip(params.session_id.as_deref(), destination)
            .await?;
        Ok(json!({
            "sessionId": params.session_id.as_deref().map(str::trim).unwrap_or(""),
            "downloadPath": path.display().to_string(),
        }))
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Option<JsonObject>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default()))
        .map_err(|e| ToolError(format!("invalid arguments: {e}")))
}

fn entry_payload(entry: &VirtualEntry) -> Value {
    json!({
        "inodeId": entry.id,
        "path": entry.path,
        "version": entry.version,
        "sessionId": entry.session,
    })
}

/// MCP server exposing the ThreadBox tool set.
#[derive(Clone)]
pub struct ThreadBoxServer {
    dispatcher: Arc<Dispatcher>,
}

impl std::fmt::Debug for ThreadBoxServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadBoxServer").finish_non_exhaustive()
    }
}

impl ThreadBoxServer {
    pub fn new(store: ThreadBox) -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new(store)),
        }
    }

    fn tools() -> Vec<Tool> {
        vec![
            tool_descriptor::<WriteFileParams>(
                "write_file",
                "Write a file into the virtual filesystem. Missing parent \
                 directories are created automatically and every write appends \
                 a new immutable version.",
            ),
            tool_descriptor::<ReadFileParams>(
                "read_file",
                "Read the latest version of a file from the virtual filesystem. \
                 Binary content is returned base64-encoded.",
            ),
            tool_descriptor::<ListDirectoryParams>(
                "list_directory",
                "List the files and subdirectories of a virtual directory, \
                 each partition sorted by name.",
            ),
            tool_descriptor::<RenameNodeParams>(
                "rename_node",
                "Rename a file within its directory. The file keeps its \
                 identity and version history.",
            ),
            tool_descriptor::<MoveNodeParams>(
                "move_node",
                "Move a file into another directory, keeping its basename, \
                 identity, and version history.",
            ),
            tool_descriptor::<ExportSessionZipParams>(
                "export_session_zip",
                "Export every file of a session as a ZIP archive on the host \
                 filesystem and return the archive path.",
            ),
        ]
    }
}

fn tool_descriptor<P: JsonSchema>(name: &'static str, description: &'static str) -> Tool {
    let schema = schemars::schema_for!(P);
    let schema_json = serde_json::to_value(schema).unwrap_or_default();
    let input_schema = match schema_json {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };

    Tool {
        name: name.into(),
        title: None,
        description: Some(description.into()),
        input_schema,
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

impl ServerHandler for ThreadBoxServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "ThreadBox provides a versioned virtual filesystem for agent \
                 artefacts. Files live in session-scoped trees; every write \
                 appends a new version and nothing is ever deleted. Use \
                 write_file/read_file for content, list_directory to explore, \
                 rename_node/move_node to reorganise, and export_session_zip \
                 to download a whole session."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .dispatcher
            .dispatch(request.name.as_ref(), request.arguments)
            .await
        {
            Some(ToolResult { is_error: false, payload }) => {
                Ok(CallToolResult::success(vec![Content::text(payload)]))
            }
            Some(ToolResult { is_error: true, payload }) => {
                Ok(CallToolResult::error(vec![Content::text(payload)]))
            }
            None => Err(McpError::invalid_params(
                format!("Unknown tool: {}", request.name),
                None,
            )),
        }
    }
}

/// Serve the tool set over stdio until the client disconnects.
pub async fn serve_stdio(store: ThreadBox) -> anyhow::Result<()> {
    let service = ThreadBoxServer::new(store)
        .serve(rmcp::transport::stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("failed to start MCP service: {e}");
        })?;
    service.waiting().await?;
    Ok(())
}
