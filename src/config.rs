use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::{Result, TunnelError};

pub const APP_NAME: &str = "httpconnect";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind: String,
    /// Seconds without traffic before a tunnel is closed, 0 disables the timeout
    pub idle_timeout_secs: u64,
    /// Destination ports CONNECT may reach, empty allows every port
    pub allowed_ports: Vec<u16>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
            idle_timeout_secs: 70,
            allowed_ports: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Loads the configuration file, creating it with defaults when missing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let loaded = match path {
            Some(path) => confy::load_path(path),
            None => confy::load(APP_NAME, None),
        };
        loaded.map_err(|e| TunnelError::InvalidConfig(format!("unable to load configuration: {}", e)))
    }
}
