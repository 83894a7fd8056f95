//! Activity parameters.

use serde::{Deserialize, Serialize};

use crate::types::Type;
use crate::value::Value;

/// A declared input or output of an activity.
///
/// The optional `value` has three meanings depending on its shape:
///
/// - a string is an *alias*: the external dataflow key bound to this parameter;
/// - a list of strings is a *projection*: the parameter becomes a sub-map of
///   the named attributes of a produced object;
/// - any other literal is a constant default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: Type,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            value: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_alias(self, alias: impl Into<String>) -> Self {
        self.with_value(Value::Str(alias.into()))
    }

    pub fn alias(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_str)
    }

    pub fn projection(&self) -> Option<Vec<&str>> {
        let items = self.value.as_ref()?.as_list()?;
        items.iter().map(Value::as_str).collect()
    }

    /// The literal default, if the value is neither an alias nor a projection.
    pub fn default_value(&self) -> Option<&Value> {
        let value = self.value.as_ref()?;
        if self.alias().is_some() || self.projection().is_some() {
            return None;
        }
        Some(value)
    }

    /// The dataflow key this parameter is bound to: its alias or its name.
    pub fn external_key(&self) -> &str {
        self.alias().unwrap_or(&self.name)
    }

    pub fn is_required(&self) -> bool {
        !self.ty.is_optional() && self.default_value().is_none()
    }
}
