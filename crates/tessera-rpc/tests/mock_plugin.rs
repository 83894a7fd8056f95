//! Mock plugin for integration testing.
//!
//! Speaks the framed stdio protocol and serves:
//!
//! - `Service.Metadata`: service `mock` with a `greet` action, a `Host` type
//!   and a `Host` handler (create/read/delete, no update)
//! - `Service.Invoke`: `do` on `greet`, and the handler methods
//! - `Service.State`: echoes the input map back
//! - `Actors.GetActor` / `Actors.InvokeAction`: actor `greeter`; an action
//!   input with `mode: "callbacks"` sends a notice and a resource callback
//!   before answering, `mode: "bogus"` sends message id 42

use std::collections::{HashMap, HashSet};

use tessera_rpc::protocol::{GetActorParams, InvokeParams, StateParams};
use tessera_rpc::{
    ActionDefinition, ActorDefinition, Definition, Frame, GENESIS_NOTICE, GENESIS_RESOURCE,
    INVOKE_ACTION, Message, ServiceMetadata, Style, read_frame, write_frame,
};
use tessera_value::{Attribute, Interface, ObjectType, OrderedMap, Parameter, Type, TypedObject, Value};
use tokio::io::{BufReader, Stdout};

#[derive(Default)]
struct State {
    hosts: HashMap<String, TypedObject>,
    next_host: u32,
    /// Streams waiting for the answer to a resource callback.
    awaiting_dep: HashSet<u64>,
}

fn host_type() -> ObjectType {
    ObjectType::new("Host")
        .with_attribute(Attribute::new("name", Type::String))
        .with_attribute(Attribute::new("ip", Type::String))
        .with_attribute(Attribute::new("id", Type::String))
        .with_provided_attributes(&["id"])
}

fn metadata() -> ServiceMetadata {
    ServiceMetadata {
        service_id: "mock".into(),
        types: vec![host_type()],
        definitions: vec![
            Definition::new("greet", Style::Action)
                .with_input(Parameter::new("name", Type::String))
                .with_output(Parameter::new("greeting", Type::String)),
            Definition::handler(
                "HostHandler",
                "Host",
                Interface::new("Host::Handler", ["create", "read", "delete"]),
            ),
        ],
    }
}

fn actor(name: &str) -> ActorDefinition {
    ActorDefinition {
        name: name.into(),
        input: vec![Parameter::new("who", Type::String)],
        output: vec![Parameter::new("greeting", Type::String)],
        actions: vec![ActionDefinition {
            name: "greet".into(),
            input: vec![
                Parameter::new("who", Type::String),
                Parameter::new("mode", Type::Optional(Box::new(Type::String))),
            ],
            output: vec![Parameter::new("greeting", Type::String)],
            when: None,
        }],
    }
}

fn greeting(input: &Value, key: &str) -> Value {
    let who = input.get(key).map(ToString::to_string).unwrap_or_default();
    Value::Map(OrderedMap::from([("greeting", Value::from(format!("hello {who}")))]))
}

fn invoke(state: &mut State, params: InvokeParams) -> Result<Value, String> {
    let first = params.arguments.into_iter().next().unwrap_or_default();
    match params.method.as_str() {
        "do" => Ok(greeting(&first, "name")),
        "create" => {
            let mut obj = match first {
                Value::Object(obj) => obj,
                Value::Map(map) => TypedObject::new("Host", map),
                other => return Err(format!("create expects an object, got {}", other.type_label())),
            };
            state.next_host += 1;
            let id = format!("H{}", state.next_host);
            obj.attributes.insert("id", Value::from(id.clone()));
            state.hosts.insert(id.clone(), obj.clone());
            Ok(Value::List(vec![Value::Object(obj), Value::from(id)]))
        }
        "read" => {
            let id = first.as_str().unwrap_or_default();
            state
                .hosts
                .get(id)
                .cloned()
                .map(Value::Object)
                .ok_or_else(|| format!("no host {id}"))
        }
        "delete" => {
            let id = first.as_str().unwrap_or_default();
            state.hosts.remove(id);
            Ok(Value::Null)
        }
        other => Err(format!("unknown method {other}")),
    }
}

fn handle_request(state: &mut State, method: &str, params: serde_json::Value) -> Result<serde_json::Value, String> {
    let to_json = |v: Value| serde_json::to_value(v).map_err(|e| e.to_string());
    match method {
        "Service.Metadata" => serde_json::to_value(metadata()).map_err(|e| e.to_string()),
        "Service.Invoke" => {
            let params: InvokeParams = serde_json::from_value(params).map_err(|e| e.to_string())?;
            to_json(invoke(state, params)?)
        }
        "Service.State" => {
            let params: StateParams = serde_json::from_value(params).map_err(|e| e.to_string())?;
            to_json(Value::Map(params.input))
        }
        "Actors.GetActor" => {
            let params: GetActorParams = serde_json::from_value(params).map_err(|e| e.to_string())?;
            serde_json::to_value(actor(&params.name)).map_err(|e| e.to_string())
        }
        other => Err(format!("unknown method {other}")),
    }
}

async fn send(out: &mut Stdout, stream: u64, message: Message) {
    let _ = write_frame(out, &Frame::Message { stream, message }).await;
}

async fn handle_message(state: &mut State, out: &mut Stdout, stream: u64, message: Message) {
    match message.id {
        INVOKE_ACTION => {
            let input = message.value.get("input").cloned().unwrap_or_default();
            match input.get("mode").and_then(Value::as_str) {
                Some("callbacks") => {
                    send(out, stream, Message::new(GENESIS_NOTICE, "starting")).await;
                    let dep = OrderedMap::from([("type", Value::from("Dep"))]);
                    send(out, stream, Message::new(GENESIS_RESOURCE, dep)).await;
                    state.awaiting_dep.insert(stream);
                }
                Some("bogus") => send(out, stream, Message::new(42, Value::Null)).await,
                _ => send(out, stream, Message::new(INVOKE_ACTION, greeting(&input, "who"))).await,
            }
        }
        GENESIS_RESOURCE if state.awaiting_dep.remove(&stream) => {
            let done = OrderedMap::from([("ok", Value::from(true)), ("dep", message.value)]);
            send(out, stream, Message::new(INVOKE_ACTION, done)).await;
        }
        other => {
            let _ = write_frame(
                out,
                &Frame::Close {
                    stream,
                    error: Some(format!("unexpected message {other}")),
                },
            )
            .await;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut input = BufReader::new(tokio::io::stdin());
    let mut out = tokio::io::stdout();
    let mut state = State::default();

    while let Ok(Some(frame)) = read_frame(&mut input).await {
        match frame {
            Frame::Request { id, method, params } => {
                let reply = match handle_request(&mut state, &method, params) {
                    Ok(result) => Frame::Response {
                        id,
                        result: Some(result),
                        error: None,
                    },
                    Err(error) => Frame::Response {
                        id,
                        result: None,
                        error: Some(error),
                    },
                };
                let _ = write_frame(&mut out, &reply).await;
            }
            Frame::Open { .. } => {}
            Frame::Message { stream, message } => {
                handle_message(&mut state, &mut out, stream, message).await;
            }
            Frame::CloseSend { stream } => {
                let _ = write_frame(&mut out, &Frame::Close { stream, error: None }).await;
            }
            Frame::Close { stream, .. } => {
                state.awaiting_dep.remove(&stream);
            }
            Frame::Response { .. } => {}
        }
    }
}
