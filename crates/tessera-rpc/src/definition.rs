//! Service metadata: activity definitions and typed registry names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tessera_value::{Interface, Parameter};

use crate::error::RpcError;

/// Kind of activity a definition describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Action,
    Resource,
    Reference,
    Workflow,
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Style::Action => "action",
            Style::Resource => "resource",
            Style::Reference => "reference",
            Style::Workflow => "workflow",
        })
    }
}

/// Registry namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    Service,
    Handler,
    Definition,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Namespace::Service => "Service",
            Namespace::Handler => "Handler",
            Namespace::Definition => "Definition",
        })
    }
}

/// A name qualified by its registry namespace, displayed as `Namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypedName {
    pub namespace: Namespace,
    pub name: String,
}

impl TypedName {
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::new(Namespace::Service, name)
    }

    pub fn handler(name: impl Into<String>) -> Self {
        Self::new(Namespace::Handler, name)
    }

    pub fn definition(name: impl Into<String>) -> Self {
        Self::new(Namespace::Definition, name)
    }
}

impl fmt::Display for TypedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for TypedName {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ns, name) = s
            .split_once('/')
            .ok_or_else(|| RpcError::protocol(format!("typed name '{s}' has no namespace")))?;
        let namespace = match ns {
            "Service" => Namespace::Service,
            "Handler" => Namespace::Handler,
            "Definition" => Namespace::Definition,
            other => return Err(RpcError::protocol(format!("unknown namespace '{other}'"))),
        };
        if name.is_empty() {
            return Err(RpcError::protocol(format!("typed name '{s}' has no name")));
        }
        Ok(TypedName::new(namespace, name))
    }
}

/// Wire description of an activity, or of a resource handler when
/// `handler_for` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    /// Id of the service that defined this activity. Filled in by the loader
    /// when the plugin leaves it empty.
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub input: Vec<Parameter>,
    #[serde(default)]
    pub output: Vec<Parameter>,
    /// Guard condition in textual form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    /// Name of the referenced definition (reference style).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Name of the managed object type (resource style).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Object type this definition handles (handler definitions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_for: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<Interface>,
    /// Nested activities (workflow style).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activities: Vec<Definition>,
}

impl Definition {
    pub fn new(name: impl Into<String>, style: Style) -> Self {
        Self {
            name: name.into(),
            style,
            ..Default::default()
        }
    }

    /// A handler definition for `type_name`.
    pub fn handler(name: impl Into<String>, type_name: impl Into<String>, interface: Interface) -> Self {
        Self {
            name: name.into(),
            handler_for: Some(type_name.into()),
            interface: Some(interface),
            ..Default::default()
        }
    }

    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = service_id.into();
        self
    }

    pub fn with_input(mut self, param: Parameter) -> Self {
        self.input.push(param);
        self
    }

    pub fn with_output(mut self, param: Parameter) -> Self {
        self.output.push(param);
        self
    }

    pub fn with_when(mut self, when: impl Into<String>) -> Self {
        self.when = Some(when.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_resource_type(mut self, type_name: impl Into<String>) -> Self {
        self.resource_type = Some(type_name.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_activity(mut self, activity: Definition) -> Self {
        self.activities.push(activity);
        self
    }

    pub fn is_handler(&self) -> bool {
        self.handler_for.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_value::Type;

    #[test]
    fn test_typed_name_round_trip() {
        let name = TypedName::handler("Host");
        assert_eq!(name.to_string(), "Handler/Host");
        assert_eq!("Handler/Host".parse::<TypedName>().unwrap(), name);

        assert!("Host".parse::<TypedName>().is_err());
        assert!("Thing/Host".parse::<TypedName>().is_err());
        assert!("Service/".parse::<TypedName>().is_err());
    }

    #[test]
    fn test_definition_json_defaults() {
        let def: Definition = serde_json::from_str(r#"{"name": "greet"}"#).unwrap();
        assert_eq!(def.style, Style::Action);
        assert!(def.input.is_empty());
        assert!(!def.is_handler());

        let def = Definition::new("host", Style::Resource)
            .with_resource_type("Host")
            .with_input(Parameter::new("name", Type::String));
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["style"], "resource");
        assert_eq!(json["resource_type"], "Host");
        assert!(json.get("external_id").is_none());
    }

    #[test]
    fn test_handler_definition() {
        let def = Definition::handler("HostHandler", "Host", Interface::new("Host::Handler", ["read"]));
        assert!(def.is_handler());
        assert_eq!(def.handler_for.as_deref(), Some("Host"));
    }
}
