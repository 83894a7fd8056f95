use async_trait::async_trait;
use tessera_rpc::{Definition, Style};
use tessera_value::{OrderedMap, Parameter, Value};

use super::{Activity, ActivityBase, map_output, require_input, restrict};
use crate::condition::Condition;
use crate::context::ActivityContext;
use crate::error::{Result, WfeError};

/// Method invoked on the defining service.
const DO_METHOD: &str = "do";

/// An activity backed by a `do` method of the service that defined it.
#[derive(Debug, Clone)]
pub struct Action {
    base: ActivityBase,
}

impl Action {
    pub fn from_definition(def: &Definition) -> Result<Self> {
        Ok(Self {
            base: ActivityBase::from_definition(def)?,
        })
    }
}

#[async_trait]
impl Activity for Action {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn style(&self) -> Style {
        Style::Action
    }

    fn service_id(&self) -> &str {
        &self.base.service_id
    }

    fn input(&self) -> Vec<Parameter> {
        self.base.input.clone()
    }

    fn output(&self) -> Vec<Parameter> {
        self.base.output.clone()
    }

    fn when(&self) -> Option<Condition> {
        self.base.when.clone()
    }

    async fn run(&self, ctx: &ActivityContext, input: OrderedMap) -> Result<OrderedMap> {
        let label = self.label();
        let input = require_input(&label, &self.base.input, &input)?;
        let service = ctx
            .registry()
            .service(&self.base.service_id)
            .ok_or_else(|| WfeError::UnknownReference(format!("Service/{}", self.base.service_id)))?;

        tracing::debug!(activity = %self.base.name, "invoking action");
        let result = service
            .invoke(&self.base.name, DO_METHOD, vec![Value::Map(input)])
            .await?;

        match result {
            Value::Map(output) => Ok(map_output(&self.base.output, restrict(&self.base.output, output))),
            other => Err(WfeError::bad_shape(format!(
                "{label} returned {}, expected a hash",
                other.type_label()
            ))),
        }
    }
}
