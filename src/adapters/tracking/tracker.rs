use crate::domain::{RelayStats, Result, TunnelInfo};
use crate::ports::TrackingPort;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{info, warn};
use uuid::Uuid;

const CLEANUP_INTERVAL: Duration = Duration::from_millis(250);
const CLOSED_RETENTION: Duration = Duration::from_secs(4);

/// In-memory tunnel tracker
pub struct ConnectionTracker {
    tunnels: Arc<RwLock<Vec<TunnelInfo>>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            tunnels: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start background cleanup task
    pub fn start_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let tunnels = self.tunnels.clone();

        tokio::spawn(async move {
            let mut ticker = interval(CLEANUP_INTERVAL);

            loop {
                ticker.tick().await;

                let now = Instant::now();
                tunnels.write().await.retain(|tunnel| match tunnel.closed_at {
                    Some(closed_at) => now.duration_since(closed_at) < CLOSED_RETENTION,
                    None => true,
                });
            }
        })
    }

    /// Every tracked tunnel, closed ones included until the cleanup task forgets them
    pub async fn tunnels(&self) -> Vec<TunnelInfo> {
        self.tunnels.read().await.clone()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackingPort for ConnectionTracker {
    async fn track_tunnel(&self, info: TunnelInfo) -> Result<()> {
        info!("CONNECT {} opened", info.target);

        self.tunnels.write().await.push(info);
        Ok(())
    }

    async fn close_tunnel(&self, id: Uuid, stats: RelayStats) -> Result<()> {
        let mut tunnels = self.tunnels.write().await;

        match tunnels.iter_mut().find(|t| t.id == id) {
            Some(tunnel) if tunnel.is_open() => {
                info!(
                    "CONNECT {} closed ({}): up={} down={} after {:?}",
                    tunnel.target,
                    stats.cause,
                    stats.uploaded,
                    stats.downloaded,
                    tunnel.opened_at.elapsed()
                );
                tunnel.close(stats);
            }
            Some(tunnel) => warn!("Tunnel {} to {} closed twice", id, tunnel.target),
            None => warn!("Closing unknown tunnel {}", id),
        }

        Ok(())
    }

    async fn active_tunnels(&self) -> Result<Vec<TunnelInfo>> {
        let tunnels = self.tunnels.read().await;
        Ok(tunnels.iter().filter(|t| t.is_open()).cloned().collect())
    }
}
