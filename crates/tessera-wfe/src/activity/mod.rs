//! Activities: the steps of a workflow.
//!
//! Every activity reads its input from the workflow dataflow and writes its
//! output back into it. Parameters carrying a string value are aliased: the
//! dataflow key is the alias while the activity sees the parameter name.
//!
//! | Style | Type | Runs |
//! |-------|------|------|
//! | `action` | [`Action`] | `do` on the defining service |
//! | `resource` | [`Resource`] | reconciliation through the type's handler |
//! | `reference` | [`Reference`] | another registered definition |
//! | `workflow` | [`WorkflowEngine`](crate::engine::WorkflowEngine) | nested activities |
//!
//! Actors fetched over `GetActor` contribute [`RemoteAction`]s.

mod action;
mod reference;
mod remote;
mod resource;

use std::sync::Arc;

use async_trait::async_trait;
use tessera_rpc::{Definition, Style};
use tessera_value::{OrderedMap, Parameter, TypedObject, Value};

use crate::condition::Condition;
use crate::context::ActivityContext;
use crate::engine::WorkflowEngine;
use crate::error::{Result, WfeError};
use crate::operation::Operation;
use crate::registry::Registry;

pub use action::Action;
pub use reference::Reference;
pub use remote::RemoteAction;
pub use resource::Resource;

/// URL scheme of activity identifiers.
pub const IDENTIFIER_SCHEME: &str = "wfe";

/// A workflow step.
#[async_trait]
pub trait Activity: Send + Sync {
    fn name(&self) -> &str;

    fn style(&self) -> Style;

    /// Id of the service that defined this activity.
    fn service_id(&self) -> &str;

    fn input(&self) -> Vec<Parameter>;

    fn output(&self) -> Vec<Parameter>;

    fn when(&self) -> Option<Condition>;

    /// Stable identifier used as the identity store key.
    fn identifier(&self) -> String {
        activity_identifier(self.service_id(), self.name())
    }

    /// Human readable label, e.g. `resource 'web'`.
    fn label(&self) -> String {
        format!("{} '{}'", self.style(), self.name())
    }

    /// Dataflow keys this activity reads.
    fn consumes(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for param in self.input() {
            push_unique(&mut keys, param.external_key());
        }
        if let Some(when) = self.when() {
            for name in when.names() {
                push_unique(&mut keys, name);
            }
        }
        keys
    }

    /// Dataflow keys this activity writes.
    fn produces(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for param in self.output() {
            push_unique(&mut keys, param.external_key());
        }
        keys
    }

    /// Run against `input`, a view of the dataflow keyed by external keys,
    /// and return output keyed the same way.
    async fn run(&self, ctx: &ActivityContext, input: OrderedMap) -> Result<OrderedMap>;
}

fn push_unique(keys: &mut Vec<String>, key: &str) {
    if !keys.iter().any(|k| k == key) {
        keys.push(key.to_string());
    }
}

/// `wfe:///<service-id>/<name>`
pub fn activity_identifier(service_id: &str, name: &str) -> String {
    format!("{IDENTIFIER_SCHEME}:///{service_id}/{name}")
}

/// Fields shared by the concrete activities.
#[derive(Debug, Clone, Default)]
pub(crate) struct ActivityBase {
    pub name: String,
    pub service_id: String,
    pub input: Vec<Parameter>,
    pub output: Vec<Parameter>,
    pub when: Option<Condition>,
}

impl ActivityBase {
    pub fn from_definition(def: &Definition) -> Result<Self> {
        Ok(Self {
            name: def.name.clone(),
            service_id: def.service_id.clone(),
            input: def.input.clone(),
            output: def.output.clone(),
            when: def.when.as_deref().map(Condition::parse).transpose()?,
        })
    }
}

/// Select the declared input from the dataflow, renaming aliased keys to
/// parameter names and filling literal defaults.
///
/// A missing required key is an error only under `Upsert`.
pub fn project_input(
    label: &str,
    params: &[Parameter],
    dataflow: &OrderedMap,
    operation: Operation,
) -> Result<OrderedMap> {
    select_input(label, params, dataflow, operation == Operation::Upsert)
}

/// Like [`project_input`], but a missing required key is an error under
/// every operation.
pub fn require_input(label: &str, params: &[Parameter], dataflow: &OrderedMap) -> Result<OrderedMap> {
    select_input(label, params, dataflow, true)
}

fn select_input(label: &str, params: &[Parameter], dataflow: &OrderedMap, strict: bool) -> Result<OrderedMap> {
    let mut out = OrderedMap::with_capacity(params.len());
    for param in params {
        if let Some(value) = dataflow.get(param.external_key()) {
            out.insert(param.name.clone(), value.clone());
        } else if let Some(default) = param.default_value() {
            out.insert(param.name.clone(), default.clone());
        } else if strict && param.is_required() {
            return Err(WfeError::MissingInput {
                activity: label.to_string(),
                key: param.external_key().to_string(),
            });
        }
    }
    Ok(out)
}

/// Rename output parameter names to their aliases. Undeclared keys pass
/// through unchanged.
pub fn map_output(params: &[Parameter], output: OrderedMap) -> OrderedMap {
    output
        .into_iter()
        .map(|(key, value)| {
            let key = params
                .iter()
                .find(|p| p.name == key)
                .map(|p| p.external_key().to_string())
                .unwrap_or(key);
            (key, value)
        })
        .collect()
}

/// Inverse of [`map_output`]: rename aliases back to parameter names.
pub fn unmap_output(params: &[Parameter], output: OrderedMap) -> OrderedMap {
    output
        .into_iter()
        .map(|(key, value)| {
            let key = params
                .iter()
                .find(|p| p.external_key() == key)
                .map(|p| p.name.clone())
                .unwrap_or(key);
            (key, value)
        })
        .collect()
}

/// Keep only the keys named by `params`.
pub(crate) fn restrict(params: &[Parameter], output: OrderedMap) -> OrderedMap {
    if params.is_empty() {
        return output;
    }
    output
        .into_iter()
        .filter(|(key, _)| params.iter().any(|p| p.name == *key))
        .collect()
}

/// Project resource outputs from a reconciled object.
///
/// A string value names the source attribute, a list of strings builds a
/// sub-map of the named attributes; otherwise the attribute has the
/// parameter's name. The output key is always the parameter name.
pub fn project_object(label: &str, params: &[Parameter], object: &TypedObject) -> Result<OrderedMap> {
    let attribute = |name: &str| {
        object.get(name).cloned().ok_or_else(|| WfeError::NoSuchAttribute {
            activity: label.to_string(),
            name: name.to_string(),
        })
    };

    let mut out = OrderedMap::with_capacity(params.len());
    for param in params {
        let value = if let Some(names) = param.projection() {
            let mut sub = OrderedMap::with_capacity(names.len());
            for name in names {
                sub.insert(name, attribute(name)?);
            }
            Value::Map(sub)
        } else {
            attribute(param.alias().unwrap_or(&param.name))?
        };
        out.insert(param.name.clone(), value);
    }
    Ok(out)
}

/// Build the activity described by `def`.
pub fn create_activity(def: &Definition, registry: &Registry) -> Result<Arc<dyn Activity>> {
    tracing::debug!(activity = %def.name, style = %def.style, "creating activity");
    Ok(match def.style {
        Style::Action => Arc::new(Action::from_definition(def)?),
        Style::Resource => Arc::new(Resource::from_definition(def, registry)?),
        Style::Reference => Arc::new(Reference::from_definition(def, registry)?),
        Style::Workflow => {
            let mut engine = WorkflowEngine::new(def.name.clone(), def.input.clone(), def.output.clone())
                .with_service_id(def.service_id.clone());
            if let Some(when) = &def.when {
                engine = engine.with_when(Condition::parse(when)?);
            }
            for nested in &def.activities {
                let mut nested = nested.clone();
                if nested.service_id.is_empty() {
                    nested.service_id = def.service_id.clone();
                }
                engine.add_activity(create_activity(&nested, registry)?);
            }
            Arc::new(engine)
        }
    })
}
