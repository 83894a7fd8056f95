//! Loading plugins, link files and manifests into a [`Registry`].
//!
//! Directory layout:
//!
//! ```text
//! <root>/
//!   goplugins/          plugin executables
//!   workflows/
//!     hosts.ll          link file: {executable, arguments}
//!     deploy.pp         manifest, loaded by the Puppet service
//!     deploy.yaml       manifest, loaded by the Puppet service
//! ```
//!
//! Plugins are loaded before anything in `workflows/` so that manifests can
//! reach the `Puppet` service.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tessera_rpc::{Definition, Namespace, ServiceClient, StdioTransport, TransportConfig};
use tessera_value::Value;

use crate::config::EngineConfig;
use crate::error::{Result, WfeError};
use crate::registry::Registry;
use crate::service::{RemoteService, Service};

/// Id of the side-service that turns manifests into definitions.
pub const PUPPET_SERVICE_ID: &str = "Puppet";

const MANIFEST_LOADER: &str = "Puppet::ManifestLoader";
const LOAD_MANIFEST: &str = "loadManifest";

/// Starts plugin executables.
#[async_trait]
pub trait PluginLauncher: Send + Sync {
    async fn launch(&self, executable: &Path, args: &[String]) -> Result<Arc<dyn Service>>;
}

/// Launches plugins as child processes speaking the stdio transport.
#[derive(Debug, Clone)]
pub struct StdioLauncher {
    request_timeout: Duration,
}

impl StdioLauncher {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl PluginLauncher for StdioLauncher {
    async fn launch(&self, executable: &Path, args: &[String]) -> Result<Arc<dyn Service>> {
        let config = TransportConfig::new(executable.display().to_string())
            .with_args(args.to_vec())
            .with_request_timeout(self.request_timeout);
        let transport = StdioTransport::spawn(config)
            .map_err(|e| WfeError::plugin_load(executable.display().to_string(), e.to_string()))?;
        Ok(Arc::new(RemoteService::new(ServiceClient::new(Arc::new(transport)))))
    }
}

/// A loader for one kind of file in one directory.
#[async_trait]
pub trait SmartPath: Send + Sync {
    /// Directory the provider reads from.
    fn root(&self) -> &Path;

    /// Registry namespaces the provider can fill.
    fn namespaces(&self) -> &'static [Namespace];

    fn matches(&self, path: &Path) -> bool;

    async fn load(&self, path: &Path, registry: &Registry) -> Result<()>;
}

/// Launch an executable and register its metadata.
async fn load_plugin(
    launcher: &dyn PluginLauncher,
    executable: &Path,
    args: &[String],
    registry: &Registry,
) -> Result<()> {
    let plugin = executable.display().to_string();
    let service = launcher.launch(executable, args).await?;
    let metadata = service
        .metadata()
        .await
        .map_err(|e| WfeError::plugin_load(&plugin, e.to_string()))?;

    tracing::info!(
        %plugin,
        service = %metadata.service_id,
        definitions = metadata.definitions.len(),
        types = metadata.types.len(),
        "loaded plugin"
    );
    registry.register_metadata(service, metadata);
    Ok(())
}

/// Pre-packaged plugin executables.
pub struct PluginPath {
    dir: PathBuf,
    launcher: Arc<dyn PluginLauncher>,
}

impl PluginPath {
    pub fn new(dir: impl Into<PathBuf>, launcher: Arc<dyn PluginLauncher>) -> Self {
        Self {
            dir: dir.into(),
            launcher,
        }
    }
}

#[async_trait]
impl SmartPath for PluginPath {
    fn root(&self) -> &Path {
        &self.dir
    }

    fn namespaces(&self) -> &'static [Namespace] {
        &[Namespace::Service, Namespace::Handler, Namespace::Definition]
    }

    fn matches(&self, path: &Path) -> bool {
        path.is_file()
    }

    async fn load(&self, path: &Path, registry: &Registry) -> Result<()> {
        load_plugin(self.launcher.as_ref(), path, &[], registry).await
    }
}

/// `.ll` link files pointing at an executable elsewhere.
pub struct LinkPath {
    dir: PathBuf,
    launcher: Arc<dyn PluginLauncher>,
}

impl LinkPath {
    pub fn new(dir: impl Into<PathBuf>, launcher: Arc<dyn PluginLauncher>) -> Self {
        Self {
            dir: dir.into(),
            launcher,
        }
    }
}

/// Parsed contents of a link file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub executable: String,
    pub arguments: Vec<String>,
}

impl Link {
    /// Parse link file YAML, expanding environment variables.
    pub fn parse(path: &Path, text: &str) -> Result<Link> {
        let location = path.display().to_string();
        let doc: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| WfeError::plugin_load(&location, e.to_string()))?;
        let serde_yaml::Value::Mapping(map) = doc else {
            return Err(WfeError::plugin_load(location, "link file is not a map"));
        };

        let executable = match map.get("executable") {
            Some(serde_yaml::Value::String(exe)) if !exe.is_empty() => expand_env(exe),
            _ => return Err(WfeError::plugin_load(location, "link file has no executable")),
        };
        let arguments = match map.get("arguments") {
            Some(serde_yaml::Value::Sequence(items)) => items
                .iter()
                .map(|item| match item {
                    serde_yaml::Value::String(s) => expand_env(s),
                    other => yaml_scalar(other),
                })
                .collect(),
            Some(serde_yaml::Value::String(arg)) => vec![expand_env(arg)],
            _ => Vec::new(),
        };

        Ok(Link {
            executable,
            arguments,
        })
    }
}

fn yaml_scalar(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

#[async_trait]
impl SmartPath for LinkPath {
    fn root(&self) -> &Path {
        &self.dir
    }

    fn namespaces(&self) -> &'static [Namespace] {
        &[Namespace::Definition]
    }

    fn matches(&self, path: &Path) -> bool {
        has_extension(path, &["ll"])
    }

    async fn load(&self, path: &Path, registry: &Registry) -> Result<()> {
        tracing::debug!(file = %path.display(), "reading link file");
        let text = std::fs::read_to_string(path)?;
        let link = Link::parse(path, &text)?;
        load_plugin(
            self.launcher.as_ref(),
            Path::new(&link.executable),
            &link.arguments,
            registry,
        )
        .await
    }
}

/// `.pp` and `.yaml` manifests, turned into definitions by the `Puppet`
/// service.
pub struct ManifestPath {
    dir: PathBuf,
}

impl ManifestPath {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestDefinitions {
    One(Box<Definition>),
    Many(Vec<Definition>),
}

#[async_trait]
impl SmartPath for ManifestPath {
    fn root(&self) -> &Path {
        &self.dir
    }

    fn namespaces(&self) -> &'static [Namespace] {
        &[Namespace::Definition]
    }

    fn matches(&self, path: &Path) -> bool {
        has_extension(path, &["pp", "yaml"])
    }

    async fn load(&self, path: &Path, registry: &Registry) -> Result<()> {
        let location = path.display().to_string();
        let puppet = registry
            .service(PUPPET_SERVICE_ID)
            .ok_or_else(|| WfeError::plugin_load(&location, "Service/Puppet is not loaded"))?;

        // types are searched for next to the workflows directory
        let search_root = path
            .parent()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("."));
        tracing::debug!(file = %location, "loading manifest");

        let result = puppet
            .invoke(
                MANIFEST_LOADER,
                LOAD_MANIFEST,
                vec![
                    Value::from(search_root.display().to_string()),
                    Value::from(location.clone()),
                ],
            )
            .await
            .map_err(|e| WfeError::plugin_load(&location, e.to_string()))?;

        let Value::Str(json) = result else {
            return Err(WfeError::plugin_load(&location, "manifest loader returned no definition"));
        };
        let definitions = match serde_json::from_str(&json)
            .map_err(|e| WfeError::plugin_load(&location, e.to_string()))?
        {
            ManifestDefinitions::One(def) => vec![*def],
            ManifestDefinitions::Many(defs) => defs,
        };

        for mut def in definitions {
            if def.service_id.is_empty() {
                def.service_id = PUPPET_SERVICE_ID.to_string();
            }
            tracing::debug!(definition = %def.name, "registered definition");
            registry.register_definition(def);
        }
        Ok(())
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

/// Expand `$VAR` and `${VAR}` from the environment. Unset variables expand
/// to the empty string.
pub fn expand_env(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        if consumed == 0 {
            out.push('$');
        } else {
            out.push_str(&std::env::var(name).unwrap_or_default());
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

/// Loads every provider's directory into a registry.
pub struct Loader {
    providers: Vec<Box<dyn SmartPath>>,
}

impl Loader {
    /// The standard providers for `config`'s directories.
    pub fn new(config: &EngineConfig, launcher: Arc<dyn PluginLauncher>) -> Self {
        Self {
            providers: vec![
                Box::new(PluginPath::new(&config.plugin_dir, launcher.clone())),
                Box::new(LinkPath::new(&config.workflow_dir, launcher)),
                Box::new(ManifestPath::new(&config.workflow_dir)),
            ],
        }
    }

    /// Standard providers launching plugins over stdio.
    pub fn stdio(config: &EngineConfig) -> Self {
        Self::new(config, Arc::new(StdioLauncher::new(config.rpc_timeout())))
    }

    pub fn with_provider(mut self, provider: Box<dyn SmartPath>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Load everything, one directory at a time in provider order, files
    /// in name order.
    pub async fn load_all(&self, registry: &Registry) -> Result<()> {
        let mut roots: Vec<&Path> = Vec::new();
        for provider in &self.providers {
            if !roots.contains(&provider.root()) {
                roots.push(provider.root());
            }
        }

        for root in roots {
            for path in list_files(root)? {
                let provider = self
                    .providers
                    .iter()
                    .find(|p| p.root() == root && p.matches(&path));
                match provider {
                    Some(provider) => {
                        tracing::debug!(file = %path.display(), namespaces = ?provider.namespaces(), "loading file");
                        provider.load(&path, registry).await?
                    }
                    None => tracing::warn!(file = %path.display(), "no loader for file, skipping"),
                }
            }
        }
        Ok(())
    }
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "directory does not exist, skipping");
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
