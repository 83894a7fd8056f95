//! Engine-hosted callback interface.

use async_trait::async_trait;
use tessera_value::{OrderedMap, Value};

use crate::error::Result;

/// Services a plugin can reach through an `InvokeAction` stream while its
/// action is running.
#[async_trait]
pub trait Genesis: Send + Sync {
    /// Resolve a nested resource described by `request` (`type`, optional
    /// `name`, desired attributes) and return its reconciled state.
    async fn resource(&self, request: OrderedMap) -> Result<Value>;

    /// Record a notice from the plugin.
    async fn notice(&self, message: Value) -> Result<()>;
}
