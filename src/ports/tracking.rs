use crate::domain::{RelayStats, Result, TunnelInfo};
use async_trait::async_trait;
use uuid::Uuid;

/// Port for observing the lifecycle of established tunnels
#[async_trait]
pub trait TrackingPort: Send + Sync {
    /// Register a tunnel whose outbound connection was just dialed
    async fn track_tunnel(&self, info: TunnelInfo) -> Result<()>;

    /// Mark a tunnel as closed, called once per tunnel after teardown
    async fn close_tunnel(&self, id: Uuid, stats: RelayStats) -> Result<()>;

    /// Get all tunnels that are still relaying
    async fn active_tunnels(&self) -> Result<Vec<TunnelInfo>>;
}
