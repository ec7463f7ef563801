use crate::config::SynergyConfig;
use crate::error::{Result, SynergyError};
use crate::pool::ConnectionPool;
use crate::protocol::{validate_target_id, Request};
use crate::sink::CommandSink;
use crate::types::{Command, TargetId};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::timeout;

/// Client for a Somfy myLink controller
///
/// Each [`send`](Self::send) checks out a pooled socket, writes one request
/// and resolves with the `result` of the reply whose `id` matches. There is
/// no batching here; see [`CommandScheduler`](crate::CommandScheduler).
///
/// # Example
///
/// ```no_run
/// use mylink_synergy::SynergyClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = SynergyClient::new("192.168.1.50", "MySystem")?;
///     client.target("CC0F1A42.1")?.up().await?;
///     Ok(())
/// }
/// ```
pub struct SynergyClient {
    config: SynergyConfig,
    pool: ConnectionPool,
    next_id: AtomicU64,
}

/// Commands bound to one target of a [`SynergyClient`]
pub struct Target<'a> {
    client: &'a SynergyClient,
    target_id: TargetId,
}

impl SynergyClient {
    /// Create a client for `host` on the default port
    ///
    /// No connection is made until the first command.
    pub fn new(host: impl Into<String>, system_id: impl Into<String>) -> Result<Self> {
        Self::with_config(SynergyConfig::new(host, system_id))
    }

    pub fn with_config(config: SynergyConfig) -> Result<Self> {
        config.validate()?;
        let pool = ConnectionPool::new(
            config.address(),
            config.max_connections,
            config.keepalive,
            config.reuse_connections,
        );

        Ok(Self {
            config,
            pool,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &SynergyConfig {
        &self.config
    }

    /// Check a target ID against this client's validation rule
    pub fn validate(&self, target_id: &str) -> Result<()> {
        validate_target_id(target_id, self.config.strict_target_ids)
    }

    /// Send `method` to `target_id` and wait for the controller's reply
    ///
    /// Fails with [`SynergyError::InvalidTarget`] before touching the pool if
    /// the ID is malformed.
    pub async fn send(&self, target_id: &str, method: &str) -> Result<Value> {
        self.validate(target_id)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request::new(id, method, &self.config.system_id, target_id);

        let mut conn = self.pool.acquire().await?;
        let outcome = match self.config.request_timeout {
            Some(limit) => timeout(limit, conn.round_trip(&request))
                .await
                .unwrap_or(Err(SynergyError::Timeout)),
            None => conn.round_trip(&request).await,
        };

        match outcome {
            Ok(reply) => {
                conn.release();
                reply.into_result()
            }
            Err(e) => {
                tracing::warn!("Request {} to {} failed: {}", id, target_id, e);
                conn.discard();
                Err(e)
            }
        }
    }

    /// Bind commands to one target, validating its ID up front
    pub fn target(&self, target_id: impl Into<TargetId>) -> Result<Target<'_>> {
        let target_id = target_id.into();
        self.validate(&target_id)?;
        Ok(Target {
            client: self,
            target_id,
        })
    }

    /// Number of sockets opened so far
    pub fn connections_opened(&self) -> usize {
        self.pool.connections_opened()
    }
}

impl Target<'_> {
    pub fn id(&self) -> &str {
        &self.target_id
    }

    pub async fn command(&self, command: Command) -> Result<Value> {
        self.client.send(&self.target_id, command.method()).await
    }

    pub async fn up(&self) -> Result<Value> {
        self.command(Command::Up).await
    }

    pub async fn down(&self) -> Result<Value> {
        self.command(Command::Down).await
    }

    pub async fn stop(&self) -> Result<Value> {
        self.command(Command::Stop).await
    }
}

#[async_trait]
impl CommandSink for SynergyClient {
    async fn send(&self, target_id: &str, method: &str) -> Result<Value> {
        SynergyClient::send(self, target_id, method).await
    }
}
