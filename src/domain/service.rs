use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

use super::{ConnectTarget, RelayStats, Result, TunnelConfig, TunnelError, TunnelInfo};
use crate::ports::TrackingPort;

#[derive(Clone)]
pub struct TunnelService {
    config: Arc<TunnelConfig>,
    tracker: Arc<dyn TrackingPort>,
}

impl TunnelService {
    pub fn new(config: TunnelConfig, tracker: Arc<dyn TrackingPort>) -> Self {
        Self {
            config: Arc::new(config),
            tracker,
        }
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// Checks a `CONNECT` target against the allowed ports.
    ///
    /// Without a port restriction the target is not even parsed, a bad one will fail at dial time.
    pub fn authorize(&self, host: &str) -> Result<()> {
        if !self.config.restricts_ports() {
            return Ok(());
        }
        trace!(
            "Checking CONNECT tunnel to {} against allowed ports {:?}",
            host,
            self.config.allowed_ports()
        );

        let target = ConnectTarget::parse(host)?;
        let allowed = u16::try_from(target.port).map_or(false, |port| self.config.allows(port));
        if allowed {
            Ok(())
        } else {
            Err(TunnelError::PortNotAllowed(target.port))
        }
    }

    pub async fn open_tunnel(&self, id: Uuid, target: &str) -> Result<()> {
        self.tracker.track_tunnel(TunnelInfo::new(id, target.to_string())).await
    }

    pub async fn close_tunnel(&self, id: Uuid, stats: RelayStats) -> Result<()> {
        self.tracker.close_tunnel(id, stats).await
    }
}
