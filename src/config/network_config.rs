use serde::{Deserialize, Serialize};

use crate::core::network::DEFAULT_CHUNK_SIZE;
use crate::core::publish::server::{ServerSettings, Transport, DEFAULT_PORT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Transport the first publish session starts with.
    pub transport: Transport,

    /// Port text, validated when the server starts. Kept as text so an
    /// invalid value surfaces as a port error instead of a parse failure.
    pub port: String,

    /// Largest TCP read or UDP datagram forwarded in one piece.
    pub receive_chunk_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            transport: Transport::default(),
            port: DEFAULT_PORT.to_string(),
            receive_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl NetworkConfig {
    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings { transport: self.transport, port_input: self.port.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_server_settings() {
        assert_eq!(NetworkConfig::default().server_settings(), ServerSettings::default());
    }

    #[test]
    fn numeric_port_is_rejected_as_json() {
        // Port is text on purpose.
        assert!(serde_json::from_str::<NetworkConfig>(r#"{"port": 9000}"#).is_err());
        let config: NetworkConfig = serde_json::from_str(r#"{"port": "9000"}"#).expect("parse");
        assert_eq!(config.server_settings().port_input, "9000");
    }
}
