use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Anything that can deliver one `(target, method)` command
///
/// [`SynergyClient`](crate::SynergyClient) is the production implementation;
/// [`CommandScheduler`](crate::CommandScheduler) forwards its reduced batches
/// into one of these.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, target_id: &str, method: &str) -> Result<Value>;
}

#[async_trait]
impl<T> CommandSink for Arc<T>
where
    T: CommandSink + ?Sized,
{
    async fn send(&self, target_id: &str, method: &str) -> Result<Value> {
        (**self).send(target_id, method).await
    }
}
