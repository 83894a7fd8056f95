//! Tessera workflow engine.
//!
//! Workflows are graphs of activities connected by their data: an activity
//! runs once every key it reads has been produced. Resource activities
//! reconcile an external object through the handler registered for its type
//! and remember the object's external id between runs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  Loader                                      │
//! │  goplugins/*, workflows/*.ll, *.pp, *.yaml   │
//! └──────────────────────────────────────────────┘
//!                        │ Registry
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │  WorkflowEngine                              │
//! │  validate (DAG) ─► run activities in order   │
//! │  Action │ Resource │ Reference │ Workflow    │
//! └──────────────────────────────────────────────┘
//!          │ Service.Invoke / State    ▲ Genesis callbacks
//!          ▼                           │
//! ┌──────────────────────────────────────────────┐
//! │  tessera-rpc plugins                         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tessera_wfe::{ActivityContext, EngineConfig, Loader, Operation, Registry, create_activity};
//!
//! let config = EngineConfig::load("tessera.toml".as_ref())?;
//! let registry = Arc::new(Registry::new());
//! Loader::stdio(&config).load_all(&registry).await?;
//!
//! let def = registry.definition("deploy").expect("loaded");
//! let workflow = create_activity(&def, &registry)?;
//! let ctx = ActivityContext::open(registry, config)?.with_operation(Operation::Upsert);
//! let output = workflow.run(&ctx, input).await?;
//! ```

pub mod activity;
pub mod actor;
pub mod condition;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod genesis;
pub mod identity;
pub mod loader;
pub mod operation;
pub mod registry;
pub mod service;

pub use activity::{
    Action, Activity, Reference, RemoteAction, Resource, activity_identifier, create_activity, map_output,
    project_input, project_object, require_input, unmap_output,
};
pub use actor::{actor_engine, run_actor};
pub use condition::Condition;
pub use config::{CONFIG_FILE_NAME, ConfigError, EngineConfig};
pub use context::ActivityContext;
pub use engine::WorkflowEngine;
pub use error::{Result, WfeError};
pub use genesis::{EngineGenesis, GENESIS_SERVICE_ID};
pub use identity::{Identity, IdentityGuard, IdentityRecord, IdentityStore, MemoryIdentity, SqliteIdentity};
pub use loader::{LinkPath, Loader, ManifestPath, PluginLauncher, PluginPath, SmartPath, StdioLauncher};
pub use operation::Operation;
pub use registry::{Entry, Registry};
pub use service::{RemoteService, Service};
