use std::net::SocketAddr;

use alfred::config::{to_env_var, ConfigError, Settings as AgentSettings};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "server.host".to_string(),
                env_var: to_env_var("server.host"),
                reason: e.to_string(),
            })
    }
}

/// The agent settings plus where to listen
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub agent: AgentSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = AgentSettings::builder()?
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .build()?;

        let server = config.get::<ServerSettings>("server")?;
        let agent = AgentSettings::from_config(config)?;
        Ok(Self { server, agent })
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}
