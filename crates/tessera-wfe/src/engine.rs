//! Workflow engine.
//!
//! A workflow is a set of activities connected by the dataflow: activity B
//! depends on activity A when A produces a key B consumes. The engine checks
//! that this graph is a DAG, then runs activities as soon as their
//! dependencies complete, up to `max_parallel` at a time.
//!
//! ```text
//!   input ──► [host] ──host_id──► [dns] ──► output
//!         └─► [greet] ─────────────────────┘
//! ```
//!
//! Under [`Operation::Delete`] the edges are reversed so dependents are torn
//! down before what they depend on.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tessera_rpc::Style;
use tessera_value::{OrderedMap, Parameter};

use crate::activity::{Activity, map_output, project_input};
use crate::condition::Condition;
use crate::context::ActivityContext;
use crate::error::{Result, WfeError};
use crate::operation::Operation;

/// Validated execution plan: prerequisites per activity index.
#[derive(Debug)]
struct Plan {
    requires: Vec<Vec<usize>>,
}

/// A workflow: named input and output plus a set of activities.
pub struct WorkflowEngine {
    name: String,
    service_id: String,
    input: Vec<Parameter>,
    output: Vec<Parameter>,
    when: Option<Condition>,
    activities: Vec<Arc<dyn Activity>>,
    plan: Mutex<Option<Arc<Plan>>>,
}

impl WorkflowEngine {
    pub fn new(name: impl Into<String>, input: Vec<Parameter>, output: Vec<Parameter>) -> Self {
        Self {
            name: name.into(),
            service_id: String::new(),
            input,
            output,
            when: None,
            activities: Vec::new(),
            plan: Mutex::new(None),
        }
    }

    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = service_id.into();
        self
    }

    pub fn with_when(mut self, when: Condition) -> Self {
        self.when = Some(when);
        self
    }

    pub fn add_activity(&mut self, activity: Arc<dyn Activity>) {
        self.activities.push(activity);
        *self.plan.get_mut() = None;
    }

    pub fn activities(&self) -> &[Arc<dyn Activity>] {
        &self.activities
    }

    /// Check the dataflow graph.
    ///
    /// Rejects duplicate activity names, keys with two producers, required
    /// inputs and guard variables nobody provides, and dependency cycles.
    pub fn validate(&self) -> Result<()> {
        self.plan().map(|_| ())
    }

    fn plan(&self) -> Result<Arc<Plan>> {
        let mut cached = self.plan.lock();
        if let Some(plan) = cached.as_ref() {
            return Ok(plan.clone());
        }
        let plan = Arc::new(self.build_plan()?);
        *cached = Some(plan.clone());
        Ok(plan)
    }

    fn build_plan(&self) -> Result<Plan> {
        let n = self.activities.len();

        let mut names: HashMap<&str, usize> = HashMap::with_capacity(n);
        for (i, activity) in self.activities.iter().enumerate() {
            if names.insert(activity.name(), i).is_some() {
                return Err(WfeError::DuplicateActivity(activity.name().to_string()));
            }
        }

        let mut producers: HashMap<String, usize> = HashMap::new();
        for (i, activity) in self.activities.iter().enumerate() {
            for key in activity.produces() {
                if let Some(&first) = producers.get(&key) {
                    return Err(WfeError::AmbiguousOutput {
                        key,
                        first: self.activities[first].name().to_string(),
                        second: activity.name().to_string(),
                    });
                }
                producers.insert(key, i);
            }
        }

        let workflow_input = |key: &str| self.input.iter().any(|p| p.name == key);

        let mut requires: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, activity) in self.activities.iter().enumerate() {
            let mut depend = |key: &str| -> bool {
                match producers.get(key) {
                    Some(&producer) => {
                        if !requires[i].contains(&producer) {
                            requires[i].push(producer);
                        }
                        true
                    }
                    None => workflow_input(key),
                }
            };

            for param in activity.input() {
                let key = param.external_key();
                if !depend(key) && param.is_required() {
                    return Err(WfeError::UnknownReference(format!(
                        "{} requires '{key}' which nothing produces",
                        activity.label()
                    )));
                }
            }
            if let Some(when) = activity.when() {
                for key in when.names() {
                    if !depend(key) {
                        return Err(WfeError::UnknownReference(format!(
                            "{} guard uses '{key}' which nothing produces",
                            activity.label()
                        )));
                    }
                }
            }
        }

        self.check_acyclic(&requires)?;
        Ok(Plan { requires })
    }

    /// Kahn's algorithm over the prerequisite lists.
    fn check_acyclic(&self, requires: &[Vec<usize>]) -> Result<()> {
        let n = requires.len();
        let mut in_degree: Vec<usize> = requires.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, reqs) in requires.iter().enumerate() {
            for &r in reqs {
                dependents[r].push(i);
            }
        }

        let mut queue: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = 0;
        while let Some(node) = queue.pop() {
            visited += 1;
            for &next in &dependents[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push(next);
                }
            }
        }

        if visited != n {
            let activities = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.activities[i].name().to_string())
                .collect();
            return Err(WfeError::CycleInWorkflow {
                workflow: self.name.clone(),
                activities,
            });
        }
        Ok(())
    }

    /// Run the workflow.
    ///
    /// The dataflow starts as `parent_input` overlaid with `leaf_input`. The
    /// result holds the declared outputs found in the final dataflow.
    pub async fn call(
        &self,
        ctx: &ActivityContext,
        parent_input: OrderedMap,
        leaf_input: OrderedMap,
    ) -> Result<OrderedMap> {
        let plan = self.plan()?;
        let mut seed = parent_input;
        seed.merge(leaf_input);
        let scope = ctx.scoped(seed);
        let operation = ctx.operation();

        tracing::debug!(workflow = %self.name, %operation, activities = self.activities.len(), "running workflow");

        // edges point from an activity to the ones that wait for it
        let n = self.activities.len();
        let mut waiting_on = vec![0usize; n];
        let mut unblocks: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, reqs) in plan.requires.iter().enumerate() {
            for &r in reqs {
                let (before, after) = if operation == Operation::Delete { (i, r) } else { (r, i) };
                waiting_on[after] += 1;
                unblocks[before].push(after);
            }
        }

        let mut ready: VecDeque<usize> = (0..n).filter(|&i| waiting_on[i] == 0).collect();
        let mut running: FuturesUnordered<BoxFuture<'_, (usize, Result<OrderedMap>)>> = FuturesUnordered::new();
        let max_parallel = scope.config().max_parallel.max(1);

        loop {
            while running.len() < max_parallel {
                let Some(i) = ready.pop_front() else { break };
                if scope.is_cancelled() {
                    return Err(WfeError::Cancelled.in_activity(self.label()));
                }
                running.push(Box::pin(run_one(i, self.activities[i].clone(), scope.clone())));
            }

            let Some((i, result)) = running.next().await else {
                break;
            };
            let output = result.map_err(|e| e.in_activity(self.activities[i].label()))?;
            scope.publish(output);
            for &next in &unblocks[i] {
                waiting_on[next] -= 1;
                if waiting_on[next] == 0 {
                    ready.push_back(next);
                }
            }
        }

        let dataflow = scope.dataflow();
        let mut out = OrderedMap::with_capacity(self.output.len());
        for param in &self.output {
            if let Some(value) = dataflow.get(&param.name) {
                out.insert(param.name.clone(), value.clone());
            }
        }
        Ok(out)
    }
}

async fn run_one(i: usize, activity: Arc<dyn Activity>, ctx: ActivityContext) -> (usize, Result<OrderedMap>) {
    let dataflow = ctx.dataflow();
    if ctx.operation() != Operation::Delete
        && let Some(when) = activity.when()
        && !when.evaluate(&dataflow)
    {
        tracing::debug!(activity = %activity.name(), guard = %when, "guard is false, skipping");
        return (i, Ok(OrderedMap::new()));
    }

    tracing::debug!(activity = %activity.name(), style = %activity.style(), "running activity");
    let result = if activity.style() == Style::Workflow {
        ctx.cancellable(activity.run(&ctx, dataflow)).await
    } else {
        ctx.guard(activity.run(&ctx, dataflow)).await
    };
    (i, result)
}

#[async_trait]
impl Activity for WorkflowEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn style(&self) -> Style {
        Style::Workflow
    }

    fn service_id(&self) -> &str {
        &self.service_id
    }

    fn input(&self) -> Vec<Parameter> {
        self.input.clone()
    }

    fn output(&self) -> Vec<Parameter> {
        self.output.clone()
    }

    fn when(&self) -> Option<Condition> {
        self.when.clone()
    }

    async fn run(&self, ctx: &ActivityContext, input: OrderedMap) -> Result<OrderedMap> {
        let input = project_input(&self.label(), &self.input, &input, ctx.operation())?;
        let output = self.call(ctx, input, OrderedMap::new()).await?;
        Ok(map_output(&self.output, output))
    }
}
