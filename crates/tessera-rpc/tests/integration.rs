//! Integration tests for the stdio transport.
//!
//! These tests drive the `mock-plugin` binary through the full protocol.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tessera_rpc::{Genesis, RpcError, ServiceClient, StdioTransport, Style, TransportConfig};
use tessera_value::{OrderedMap, Value};

/// Get the path to the mock plugin binary.
fn mock_plugin_path() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // crates
    path.pop(); // workspace root
    path.push("target");
    path.push(if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    });
    path.push("mock-plugin");
    path
}

fn mock_plugin_exists() -> bool {
    mock_plugin_path().exists()
}

fn connect() -> ServiceClient {
    let config = TransportConfig::new(mock_plugin_path().to_string_lossy().to_string())
        .with_request_timeout(Duration::from_secs(5));
    let transport = StdioTransport::spawn(config).expect("Failed to spawn mock plugin");
    ServiceClient::new(Arc::new(transport))
}

#[derive(Default)]
struct RecordingGenesis {
    notices: Mutex<Vec<Value>>,
    resources: Mutex<Vec<OrderedMap>>,
}

#[async_trait]
impl Genesis for RecordingGenesis {
    async fn resource(&self, request: OrderedMap) -> tessera_rpc::Result<Value> {
        self.resources.lock().push(request);
        Ok(Value::Map(OrderedMap::from([("id", Value::from("D1"))])))
    }

    async fn notice(&self, message: Value) -> tessera_rpc::Result<()> {
        self.notices.lock().push(message);
        Ok(())
    }
}

fn action_args(input: OrderedMap) -> Value {
    Value::Map(OrderedMap::from([
        ("name", Value::from("greet")),
        ("input", Value::Map(input)),
    ]))
}

#[tokio::test]
async fn test_metadata() {
    if !mock_plugin_exists() {
        eprintln!("Skipping test: mock-plugin not built. Run `cargo build --package tessera-rpc` first.");
        return;
    }

    let client = connect();
    let metadata = client.metadata().await.expect("metadata");
    assert_eq!(metadata.service_id, "mock");
    assert_eq!(metadata.types.len(), 1);
    assert_eq!(metadata.types[0].provided_attributes(), vec!["id"]);

    let greet = metadata
        .definitions
        .iter()
        .find(|d| d.name == "greet")
        .expect("greet definition");
    assert_eq!(greet.style, Style::Action);
    assert!(metadata.definitions.iter().any(|d| d.handler_for.as_deref() == Some("Host")));
}

#[tokio::test]
async fn test_invoke_do() {
    if !mock_plugin_exists() {
        eprintln!("Skipping test: mock-plugin not built");
        return;
    }

    let client = connect();
    let input = Value::Map(OrderedMap::from([("name", Value::from("alice"))]));
    let result = client.invoke("greet", "do", vec![input]).await.expect("invoke");
    assert_eq!(result.get("greeting"), Some(&Value::from("hello alice")));
}

#[tokio::test]
async fn test_invoke_unknown_method() {
    if !mock_plugin_exists() {
        eprintln!("Skipping test: mock-plugin not built");
        return;
    }

    let client = connect();
    let err = client.invoke("greet", "explode", vec![]).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(_)));
}

#[tokio::test]
async fn test_get_actor_and_invoke_action() {
    if !mock_plugin_exists() {
        eprintln!("Skipping test: mock-plugin not built");
        return;
    }

    let client = connect();
    let actors = client.actors();
    let actor = actors.get_actor("greeter").await.expect("get actor");
    assert_eq!(actor.name, "greeter");
    assert_eq!(actor.actions.len(), 1);

    let genesis = RecordingGenesis::default();
    let args = action_args(OrderedMap::from([("who", Value::from("bob"))]));
    let result = actors.invoke_action(args, &genesis).await.expect("invoke action");
    assert_eq!(result.get("greeting"), Some(&Value::from("hello bob")));
    assert!(genesis.notices.lock().is_empty());
}

#[tokio::test]
async fn test_invoke_action_with_callbacks() {
    if !mock_plugin_exists() {
        eprintln!("Skipping test: mock-plugin not built");
        return;
    }

    let client = connect();
    let genesis = RecordingGenesis::default();
    let args = action_args(OrderedMap::from([("mode", Value::from("callbacks"))]));
    let result = client
        .actors()
        .invoke_action(args, &genesis)
        .await
        .expect("invoke action");

    assert_eq!(result.get("ok"), Some(&Value::from(true)));
    assert_eq!(result.get("dep").and_then(|d| d.get("id")), Some(&Value::from("D1")));
    assert_eq!(*genesis.notices.lock(), vec![Value::from("starting")]);
    assert_eq!(genesis.resources.lock()[0].get("type"), Some(&Value::from("Dep")));
}

#[tokio::test]
async fn test_invoke_action_bogus_id() {
    if !mock_plugin_exists() {
        eprintln!("Skipping test: mock-plugin not built");
        return;
    }

    let client = connect();
    let genesis = RecordingGenesis::default();
    let args = action_args(OrderedMap::from([("mode", Value::from("bogus"))]));
    let err = client.actors().invoke_action(args, &genesis).await.unwrap_err();
    assert!(matches!(err, RpcError::UnexpectedMessageId(42)));

    // the connection survives a failed stream
    let metadata = client.metadata().await.expect("metadata after failure");
    assert_eq!(metadata.service_id, "mock");
}
