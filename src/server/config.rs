// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Server configuration

/// Listen address used when neither `--addr` nor `PORT` is set
pub const DEFAULT_LISTEN_ADDRESS: &str = ":3001";

/// Configuration for the FHIRPath Lab operations server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port`, or `:port` to listen on all interfaces
    pub listen_address: String,
    /// Base URL used for canonical OperationDefinition URLs
    pub base_url: String,
    /// Maximum request body size in MB
    pub max_body_size_mb: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            base_url: String::new(),
            max_body_size_mb: 60,
        }
    }
}

impl ServerConfig {
    /// Get maximum payload size in bytes
    pub fn max_payload_size(&self) -> usize {
        usize::try_from(self.max_body_size_mb)
            .unwrap_or(usize::MAX / (1024 * 1024))
            .saturating_mul(1024 * 1024)
    }

    /// Socket address to bind; `:port` becomes `0.0.0.0:port`
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }
}

/// Listen address precedence: `--addr`, then `PORT`, then `:3001`.
///
/// Blank values are ignored. A `PORT` without `:` is a bare port number.
pub fn resolve_listen_address(flag: Option<&str>, port_env: Option<&str>) -> String {
    if let Some(addr) = flag.map(str::trim).filter(|addr| !addr.is_empty()) {
        return addr.to_string();
    }
    match port_env.map(str::trim).filter(|port| !port.is_empty()) {
        Some(port) if port.contains(':') => port.to_string(),
        Some(port) => format!(":{port}"),
        None => DEFAULT_LISTEN_ADDRESS.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("127.0.0.1:9000"), Some("8080"), "127.0.0.1:9000")]
    #[case(Some("  "), Some("8080"), ":8080")]
    #[case(None, Some("localhost:8081"), "localhost:8081")]
    #[case(None, Some(""), ":3001")]
    #[case(None, None, ":3001")]
    fn listen_address_precedence(#[case] flag: Option<&str>, #[case] port: Option<&str>, #[case] expected: &str) {
        assert_eq!(resolve_listen_address(flag, port), expected);
    }

    #[test]
    fn leading_colon_binds_all_interfaces() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        let config = ServerConfig {
            listen_address: "127.0.0.1:4000".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(config.bind_address(), "127.0.0.1:4000");
        assert_eq!(config.max_payload_size(), 60 * 1024 * 1024);
    }
}
