//! Wire protocol types.
//!
//! Two layers travel over a plugin connection:
//!
//! - [`Message`]: the `{id, value}` unit exchanged on an `InvokeAction`
//!   stream, where `id` is a message *kind* rather than a request id.
//! - [`Frame`]: the envelope the stdio transport uses to multiplex unary
//!   calls and streams over a single pair of pipes.

use serde::{Deserialize, Serialize};
use tessera_value::{ObjectType, OrderedMap, Parameter, Value};

use crate::definition::Definition;

/// Engine → plugin request and plugin → engine final response.
pub const INVOKE_ACTION: u32 = 1;

/// Plugin → engine request to resolve a nested resource.
pub const GENESIS_RESOURCE: u32 = 2;

/// Plugin → engine notice. Never answered.
pub const GENESIS_NOTICE: u32 = 3;

/// Method names understood by plugins.
pub mod methods {
    pub const GET_ACTOR: &str = "Actors.GetActor";
    pub const INVOKE_ACTION: &str = "Actors.InvokeAction";
    pub const METADATA: &str = "Service.Metadata";
    pub const INVOKE: &str = "Service.Invoke";
    pub const STATE: &str = "Service.State";
}

/// A single message on an action stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: u32,
    #[serde(default)]
    pub value: Value,
}

impl Message {
    pub fn new(id: u32, value: impl Into<Value>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }
}

/// Transport envelope for the stdio protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// Unary request.
    Request {
        id: u64,
        method: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Unary response; exactly one of `result` and `error` is set.
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Open a new stream.
    Open { stream: u64, method: String },
    /// A message on an open stream.
    Message { stream: u64, message: Message },
    /// The sender will write no further messages on the stream.
    CloseSend { stream: u64 },
    /// Tear down the stream, optionally with an error.
    Close {
        stream: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Parameters of `Actors.GetActor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetActorParams {
    pub name: String,
}

/// Parameters of `Service.Invoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeParams {
    pub identifier: String,
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

/// Parameters of `Service.State`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateParams {
    pub name: String,
    #[serde(default)]
    pub input: OrderedMap,
}

/// Static definition of an actor returned by `GetActor`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorDefinition {
    pub name: String,
    #[serde(default)]
    pub input: Vec<Parameter>,
    #[serde(default)]
    pub output: Vec<Parameter>,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

/// One action of an actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    #[serde(default)]
    pub input: Vec<Parameter>,
    #[serde(default)]
    pub output: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
}

/// Result of `Service.Metadata`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub service_id: String,
    #[serde(default)]
    pub types: Vec<ObjectType>,
    #[serde(default)]
    pub definitions: Vec<Definition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let msg = Message::new(GENESIS_NOTICE, "starting");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"id": 3, "value": {"t": "str", "v": "starting"}}));
    }

    #[test]
    fn test_frame_tagging() {
        let frame = Frame::Message {
            stream: 7,
            message: Message::new(INVOKE_ACTION, true),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["kind"], "message");
        assert_eq!(json["stream"], 7);

        let frame: Frame = serde_json::from_value(json!({"kind": "close_send", "stream": 7})).unwrap();
        assert_eq!(frame, Frame::CloseSend { stream: 7 });

        let frame: Frame = serde_json::from_value(json!({"kind": "response", "id": 1, "error": "boom"})).unwrap();
        assert!(matches!(frame, Frame::Response { result: None, error: Some(_), .. }));
    }

    #[test]
    fn test_actor_definition_defaults() {
        let actor: ActorDefinition =
            serde_json::from_value(json!({"name": "deploy", "actions": [{"name": "build"}]})).unwrap();
        assert_eq!(actor.actions.len(), 1);
        assert!(actor.actions[0].input.is_empty());
        assert!(actor.actions[0].when.is_none());
    }
}
