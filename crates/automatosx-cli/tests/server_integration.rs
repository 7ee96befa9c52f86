//! End-to-end smoke test: a project built with `automatosx-testing`
//! fixtures, wired through `automatosx-server`'s `Server` exactly the
//! way `automatosx_cli::run` wires it, exercising `initialize` and
//! `tools/call` against a real (mock-backed) service graph rather than
//! `automatosx-server`'s own unit-level handler tests.

use automatosx_cli::default_providers;
use automatosx_server::{JsonRpcRequest, Server, ServerDeps};
use automatosx_testing::{ProfileBuilder, TestProject};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn a_fresh_project_initializes_and_runs_an_unstaged_agent() {
    let project = TestProject::new();
    project.write_profile(&ProfileBuilder::new("writer").system_prompt("Write a short note.").build()).unwrap();

    let deps = ServerDeps { config: project.config(), providers: default_providers(), fallback_enabled: true };
    let server = Arc::new(Server::new(deps));

    let init = server
        .handle_request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "initialize".to_string(),
            params: None,
        })
        .await;
    assert!(init.error.is_none(), "initialize failed: {:?}", init.error);

    let response = server
        .handle_request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(2)),
            method: "tools/call".to_string(),
            params: Some(json!({
                "name": "run_agent",
                "arguments": {"agent": "writer", "task": "summarize the README"},
            })),
        })
        .await;

    assert!(response.error.is_none(), "tools/call failed at the protocol level: {:?}", response.error);
    let result = response.result.unwrap();
    assert!(result.get("isError").is_none(), "run_agent reported a domain error: {result:?}");
}

#[tokio::test]
async fn listing_agents_reflects_profiles_written_to_the_project() {
    let project = TestProject::new();
    project.write_profile(&ProfileBuilder::new("writer").build()).unwrap();
    project.write_profile(&ProfileBuilder::new("reviewer").build()).unwrap();

    let deps = ServerDeps { config: project.config(), providers: default_providers(), fallback_enabled: true };
    let server = Arc::new(Server::new(deps));

    server
        .handle_request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "initialize".to_string(),
            params: None,
        })
        .await;

    let response = server
        .handle_request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(2)),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "list_agents", "arguments": {}})),
        })
        .await;

    let result = response.result.unwrap();
    let content = result["content"][0]["text"].as_str().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(content).unwrap();
    let names: Vec<&str> = parsed["agents"].as_array().unwrap().iter().map(|a| a["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"writer"));
    assert!(names.contains(&"reviewer"));
}
