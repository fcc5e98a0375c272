//! Integration tests for the ThreadBox MCP server.
//!
//! These tests spawn the actual server binary and communicate with it over
//! stdio using JSON-RPC, catching transport-level issues that unit tests
//! would miss.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;

/// Helper to spawn the MCP server process against its own data directory.
struct McpServerProcess {
    child: Child,
    stdout: BufReader<ChildStdout>,
    _data_dir: TempDir,
}

impl McpServerProcess {
    fn spawn() -> Self {
        let data_dir = TempDir::new().expect("create data dir");

        let mut child = Command::new(env!("CARGO_BIN_EXE_threadbox-mcp"))
            .arg("--data-path")
            .arg(data_dir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn threadbox-mcp");

        let stdout = BufReader::new(child.stdout.take().expect("stdout not captured"));

        Self {
            child,
            stdout,
            _data_dir: data_dir,
        }
    }

    /// Send a JSON-RPC request and read the response line.
    fn request(&mut self, request: Value) -> Value {
        let stdin = self.child.stdin.as_mut().expect("stdin not captured");
        let request_str = serde_json::to_string(&request).expect("serialize request");
        writeln!(stdin, "{}", request_str).expect("write request");
        stdin.flush().expect("flush stdin");

        let mut response_line = String::new();
        self.stdout
            .read_line(&mut response_line)
            .expect("read response");

        serde_json::from_str(&response_line)
            .unwrap_or_else(|e| panic!("parse response '{}': {}", response_line.trim(), e))
    }

    /// Send a notification (no response expected).
    fn notify(&mut self, notification: Value) {
        let stdin = self.child.stdin.as_mut().expect("stdin not captured");
        let notification_str =
            serde_json::to_string(&notification).expect("serialize notification");
        writeln!(stdin, "{}", notification_str).expect("write notification");
        stdin.flush().expect("flush stdin");
    }

    /// Call one tool and return the result object.
    fn call_tool(&mut self, id: u64, name: &str, arguments: Value) -> Value {
        let response = self.request(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        }));
        assert!(
            response.get("result").is_some(),
            "expected result for {name}, got: {response}"
        );
        response["result"].clone()
    }
}

impl Drop for McpServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Perform the MCP initialization handshake.
fn initialize(server: &mut McpServerProcess) -> Value {
    let init_response = server.request(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "threadbox-mcp-test",
                "version": "0.1.0"
            }
        }
    }));

    assert_eq!(init_response["jsonrpc"], "2.0");
    assert_eq!(init_response["id"], 1);
    assert!(
        init_response.get("result").is_some(),
        "expected result in initialize response, got: {}",
        init_response
    );

    server.notify(json!({
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }));

    std::thread::sleep(Duration::from_millis(50));

    init_response
}

/// Extract the text payload from a tool call result.
fn result_text(result: &Value) -> &str {
    result["content"][0]["text"]
        .as_str()
        .expect("text content")
}

#[test]
fn test_mcp_initialize() {
    let mut server = McpServerProcess::spawn();
    let response = initialize(&mut server);

    let result = &response["result"];
    assert!(result.get("serverInfo").is_some(), "expected serverInfo");
    assert!(
        result["capabilities"].get("tools").is_some(),
        "expected tools capability"
    );
}

#[test]
fn test_mcp_list_tools() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let response = server.request(json!({
        "jsonrpc": "2.0",
        "id": 2,
        "method": "tools/list",
        "params": {}
    }));

    let tools = response["result"]["tools"]
        .as_array()
        .expect("tools should be an array");
    let names: Vec<&str> = tools
        .iter()
        .filter_map(|t| t["name"].as_str())
        .collect();

    for expected in [
        "write_file",
        "read_file",
        "list_directory",
        "rename_node",
        "move_node",
        "export_session_zip",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }

    for tool in tools {
        assert!(tool.get("inputSchema").is_some(), "tool should have schema");
    }
}

#[test]
fn test_mcp_write_and_read() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let write = server.call_tool(
        3,
        "write_file",
        json!({"path": "/docs/readme.md", "content": "hello mcp"}),
    );
    let write_payload: Value =
        serde_json::from_str(result_text(&write)).expect("write payload is JSON");
    assert_eq!(write_payload["version"], 1);
    assert_eq!(write_payload["path"], "/docs/readme.md");

    let read = server.call_tool(4, "read_file", json!({"path": "/docs/readme.md"}));
    let read_payload: Value =
        serde_json::from_str(result_text(&read)).expect("read payload is JSON");
    assert_eq!(read_payload["content"], "hello mcp");
    assert_eq!(read_payload["base64"], false);
}

#[test]
fn test_mcp_versions_accumulate() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    for (id, content) in [(5, "V1"), (6, "V2")] {
        server.call_tool(
            id,
            "write_file",
            json!({"path": "/versioned.txt", "content": content}),
        );
    }

    let read = server.call_tool(7, "read_file", json!({"path": "/versioned.txt"}));
    let payload: Value = serde_json::from_str(result_text(&read)).expect("payload");
    assert_eq!(payload["version"], 2);
    assert_eq!(payload["content"], "V2");
}

#[test]
fn test_mcp_read_missing_file_is_error_result() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let result = server.call_tool(8, "read_file", json!({"path": "/ghost.txt"}));
    assert_eq!(result["isError"], true, "expected error result: {result}");
    assert_eq!(result_text(&result), "File not found: /ghost.txt");
}

#[test]
fn test_mcp_list_directory() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    server.call_tool(
        9,
        "write_file",
        json!({"path": "/dir/a.txt", "content": "A"}),
    );
    server.call_tool(
        10,
        "write_file",
        json!({"path": "/dir/nested/b.txt", "content": "B"}),
    );

    let result = server.call_tool(11, "list_directory", json!({"path": "/dir"}));
    let payload: Value = serde_json::from_str(result_text(&result)).expect("payload");

    assert_eq!(payload["directories"][0]["name"], "nested");
    assert_eq!(payload["files"][0]["name"], "a.txt");
}

#[test]
fn test_mcp_unknown_tool() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    let response = server.request(json!({
        "jsonrpc": "2.0",
        "id": 12,
        "method": "tools/call",
        "params": { "name": "nonexistent_tool", "arguments": {} }
    }));

    assert!(
        response.get("error").is_some(),
        "expected protocol error for unknown tool, got: {}",
        response
    );
}

#[test]
fn test_mcp_session_isolation() {
    let mut server = McpServerProcess::spawn();
    initialize(&mut server);

    server.call_tool(
        13,
        "write_file",
        json!({"path": "/shared.txt", "content": "Alpha", "sessionId": "alpha"}),
    );
    server.call_tool(
        14,
        "write_file",
        json!({"path": "/shared.txt", "content": "Beta", "sessionId": "beta"}),
    );

    let alpha = server.call_tool(
        15,
        "read_file",
        json!({"path": "/shared.txt", "sessionId": "alpha"}),
    );
    let payload: Value = serde_json::from_str(result_text(&alpha)).expect("payload");
    assert_eq!(payload["content"], "Alpha");
    assert_eq!(payload["sessionId"], "alpha");
}
