use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use super::{Result, TunnelError};

/// Immutable settings shared by every tunnel a handler opens.
///
/// A zero idle timeout disables the idle guard, and an empty port set allows every port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelConfig {
    idle_timeout: Duration,
    allowed_ports: BTreeSet<u16>,
}

impl TunnelConfig {
    pub fn builder() -> TunnelConfigBuilder {
        TunnelConfigBuilder::default()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn allowed_ports(&self) -> &BTreeSet<u16> {
        &self.allowed_ports
    }

    pub fn restricts_ports(&self) -> bool {
        !self.allowed_ports.is_empty()
    }

    pub fn allows(&self, port: u16) -> bool {
        !self.restricts_ports() || self.allowed_ports.contains(&port)
    }
}

#[derive(Debug, Default)]
pub struct TunnelConfigBuilder {
    idle_timeout: Duration,
    allowed_ports: BTreeSet<u16>,
}

impl TunnelConfigBuilder {
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn allowed_ports<I>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.allowed_ports = ports.into_iter().collect();
        self
    }

    /// Replaces the allowed ports with a comma separated list such as `443,8443`.
    ///
    /// Fails on the first entry that is not a valid port number. A blank string clears the restriction.
    pub fn allowed_ports_csv(self, csv: &str) -> Result<Self> {
        let ports = parse_port_list(csv)?;
        Ok(self.allowed_ports(ports))
    }

    pub fn build(self) -> TunnelConfig {
        TunnelConfig {
            idle_timeout: self.idle_timeout,
            allowed_ports: self.allowed_ports,
        }
    }
}

pub fn parse_port_list(csv: &str) -> Result<Vec<u16>> {
    if csv.trim().is_empty() {
        return Ok(Vec::new());
    }
    csv.split(',')
        .map(|field| {
            let field = field.trim();
            field
                .parse::<u16>()
                .map_err(|e| TunnelError::InvalidConfig(format!("invalid port {:?} in allowed ports: {}", field, e)))
        })
        .collect()
}

/// Splits `host:port` the way `CONNECT` request targets are written, IPv6 literals being bracketed.
pub fn split_host_port(hostport: &str) -> Result<(&str, &str)> {
    if let Some(rest) = hostport.strip_prefix('[') {
        let end = rest.find(']').ok_or(TunnelError::MissingPort)?;
        let port = rest[end + 1..].strip_prefix(':').ok_or(TunnelError::MissingPort)?;
        if port.contains(|c| c == ':' || c == '[' || c == ']') {
            return Err(TunnelError::MissingPort);
        }
        return Ok((&rest[..end], port));
    }

    let idx = hostport.rfind(':').ok_or(TunnelError::MissingPort)?;
    let host = &hostport[..idx];
    if host.contains(|c| c == ':' || c == '[' || c == ']') {
        return Err(TunnelError::MissingPort);
    }
    Ok((host, &hostport[idx + 1..]))
}

/// A `CONNECT` target split into host and port.
///
/// The port is any decimal integer, range checks belong to the allow-list: `example.com:70000` is
/// well formed, it just can never be allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: i64,
}

impl ConnectTarget {
    pub fn parse(hostport: &str) -> Result<Self> {
        let (host, port) = split_host_port(hostport)?;
        let port = port.parse::<i64>().map_err(|_| TunnelError::InvalidPort)?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    Eof,
    IdleTimeout,
    Error,
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseCause::Eof => write!(f, "eof"),
            CloseCause::IdleTimeout => write!(f, "idle timeout"),
            CloseCause::Error => write!(f, "error"),
        }
    }
}

/// Byte counts of a finished relay, `uploaded` being client to destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub uploaded: u64,
    pub downloaded: u64,
    pub cause: CloseCause,
}

#[derive(Debug, Clone)]
pub struct TunnelInfo {
    pub id: uuid::Uuid,
    pub target: String,
    pub opened_at: Instant,
    pub closed_at: Option<Instant>,
    pub stats: Option<RelayStats>,
}

impl TunnelInfo {
    pub fn new(id: uuid::Uuid, target: String) -> Self {
        Self {
            id,
            target,
            opened_at: Instant::now(),
            closed_at: None,
            stats: None,
        }
    }

    pub fn close(&mut self, stats: RelayStats) {
        self.closed_at = Some(Instant::now());
        self.stats = Some(stats);
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("example.com:443"), Ok(("example.com", "443")));
        assert_eq!(split_host_port("[::1]:8443"), Ok(("::1", "8443")));
        assert_eq!(split_host_port("example.com:"), Ok(("example.com", "")));
        assert_eq!(split_host_port("example.com"), Err(TunnelError::MissingPort));
        assert_eq!(split_host_port("::1"), Err(TunnelError::MissingPort));
        assert_eq!(split_host_port("[::1]"), Err(TunnelError::MissingPort));
    }

    #[test]
    fn test_connect_target_parse() {
        let target = ConnectTarget::parse("example.com:443").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 443);

        assert_eq!(ConnectTarget::parse("example.com:abc"), Err(TunnelError::InvalidPort));
        assert_eq!(ConnectTarget::parse("example.com:"), Err(TunnelError::InvalidPort));
        assert_eq!(ConnectTarget::parse("example.com"), Err(TunnelError::MissingPort));
        assert_eq!(ConnectTarget::parse("[::1]:443").unwrap().host, "::1");
    }

    #[test]
    fn test_connect_target_keeps_out_of_range_ports() {
        assert_eq!(ConnectTarget::parse("example.com:70000").unwrap().port, 70000);
        assert_eq!(ConnectTarget::parse("example.com:-1").unwrap().port, -1);
        assert_eq!(ConnectTarget::parse("example.com:+443").unwrap().port, 443);
        assert_eq!(
            ConnectTarget::parse("example.com:99999999999999999999"),
            Err(TunnelError::InvalidPort)
        );
    }

    #[test]
    fn test_builder_defaults_allow_everything() {
        let config = TunnelConfig::builder().build();
        assert_eq!(config.idle_timeout(), Duration::ZERO);
        assert!(!config.restricts_ports());
        assert!(config.allows(1));
        assert!(config.allows(65535));
    }

    #[test]
    fn test_allowed_ports_ignore_order_and_duplicates() {
        let config = TunnelConfig::builder().allowed_ports(vec![8443, 443, 443]).build();
        assert_eq!(config.allowed_ports().len(), 2);
        assert!(config.allows(443));
        assert!(config.allows(8443));
        assert!(!config.allows(80));
    }

    #[test]
    fn test_allowed_ports_from_csv() {
        let config = TunnelConfig::builder()
            .idle_timeout(Duration::from_secs(70))
            .allowed_ports_csv("443, 8443")
            .unwrap()
            .build();
        assert_eq!(config.idle_timeout(), Duration::from_secs(70));
        assert!(config.allows(8443));
        assert!(!config.allows(22));

        assert!(TunnelConfig::builder().allowed_ports_csv("").unwrap().build().allows(22));
    }

    #[test]
    fn test_allowed_ports_csv_rejects_garbage() {
        match TunnelConfig::builder().allowed_ports_csv("443,https") {
            Err(TunnelError::InvalidConfig(msg)) => assert!(msg.contains("https"), "{}", msg),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
        assert!(TunnelConfig::builder().allowed_ports_csv("443,,80").is_err());
    }

    #[test]
    fn test_tunnel_info_close() {
        let mut info = TunnelInfo::new(uuid::Uuid::new_v4(), "example.com:443".into());
        assert!(info.is_open());
        info.close(RelayStats {
            uploaded: 10,
            downloaded: 20,
            cause: CloseCause::Eof,
        });
        assert!(!info.is_open());
        assert_eq!(info.stats.unwrap().downloaded, 20);
    }
}
