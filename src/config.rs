use std::net::{Ipv4Addr, SocketAddr};

use crate::error::MimirError;

/// Server configuration.
///
/// All fields can be overridden through `MIMIR_*` environment variables;
/// defaults match a local namecoind with the stock RPC port.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind both the UDP and TCP listeners to
    pub bind_addr: SocketAddr,

    /// Path to the KSK public key file (zone-file DNSKEY line)
    pub public_key: String,

    /// Path to the KSK private key file (PEM)
    pub private_key: String,

    /// Path to the ZSK public key file; empty means a transient ZSK is
    /// generated at startup and lost on exit
    pub zone_public_key: String,

    /// Path to the ZSK private key file (PEM)
    pub zone_private_key: String,

    /// Name suffix served from the name backend, without dots (e.g. "bit")
    pub zone_suffix: String,

    /// Namecoin JSON-RPC endpoint
    pub namecoin_rpc_url: String,

    /// Namecoin RPC username
    pub namecoin_rpc_username: String,

    /// Namecoin RPC password
    pub namecoin_rpc_password: String,

    /// Maximum entries held by the backend lookup cache
    pub cache_max_entries: usize,

    /// The canonical IP address for this service
    pub self_ip: Ipv4Addr,

    /// Canonical name for this nameserver; when unset a pseudo-hostname
    /// resolving to `self_ip` is synthesized under the zone apex
    pub self_name: Option<String>,

    /// Number of worker threads for the Tokio runtime (0 = default)
    pub worker_threads: usize,

    /// Max number of concurrent DNS queries to handle
    pub max_concurrent_queries: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:53".parse().expect("default bind address is valid"),
            public_key: "mimir.key".to_string(),
            private_key: "mimir.private".to_string(),
            zone_public_key: String::new(),
            zone_private_key: String::new(),
            zone_suffix: "bit".to_string(),
            namecoin_rpc_url: "http://127.0.0.1:8336/".to_string(),
            namecoin_rpc_username: String::new(),
            namecoin_rpc_password: String::new(),
            cache_max_entries: 1000,
            self_ip: Ipv4Addr::new(127, 127, 127, 127),
            self_name: None,
            worker_threads: 0,
            max_concurrent_queries: 10000,
        }
    }
}

impl ServerConfig {
    /// Create a ServerConfig from environment variables.
    /// Returns Err if a present variable does not parse.
    pub fn from_env() -> Result<Self, MimirError> {
        let mut config = Self::default();

        if let Ok(bind_addr) = std::env::var("MIMIR_BIND") {
            config.bind_addr = bind_addr
                .parse()
                .map_err(|_| MimirError::InvalidBindAddress(bind_addr))?;
        }

        if let Ok(public_key) = std::env::var("MIMIR_PUBLIC_KEY") {
            config.public_key = public_key;
        }

        if let Ok(private_key) = std::env::var("MIMIR_PRIVATE_KEY") {
            config.private_key = private_key;
        }

        if let Ok(zone_public_key) = std::env::var("MIMIR_ZONE_PUBLIC_KEY") {
            config.zone_public_key = zone_public_key;
        }

        if let Ok(zone_private_key) = std::env::var("MIMIR_ZONE_PRIVATE_KEY") {
            config.zone_private_key = zone_private_key;
        }

        if let Ok(zone_suffix) = std::env::var("MIMIR_ZONE_SUFFIX") {
            let zone_suffix = zone_suffix.trim_matches('.').to_lowercase();
            if zone_suffix.is_empty() {
                return Err(MimirError::ConfigParse(
                    "Zone suffix must not be empty".to_string(),
                ));
            }
            config.zone_suffix = zone_suffix;
        }

        if let Ok(url) = std::env::var("MIMIR_NAMECOIN_RPC_URL") {
            config.namecoin_rpc_url = url;
        }

        if let Ok(username) = std::env::var("MIMIR_NAMECOIN_RPC_USERNAME") {
            config.namecoin_rpc_username = username;
        }

        if let Ok(password) = std::env::var("MIMIR_NAMECOIN_RPC_PASSWORD") {
            config.namecoin_rpc_password = password;
        }

        if let Ok(max_entries) = std::env::var("MIMIR_CACHE_MAX_ENTRIES") {
            let max = max_entries.parse::<usize>().map_err(|_| {
                MimirError::ConfigParse(format!("Invalid cache max entries: {}", max_entries))
            })?;
            if max == 0 {
                return Err(MimirError::ConfigParse(
                    "Cache max entries must be greater than 0".to_string(),
                ));
            }
            config.cache_max_entries = max;
        }

        if let Ok(self_ip) = std::env::var("MIMIR_SELF_IP") {
            config.self_ip = self_ip
                .parse()
                .map_err(|_| MimirError::InvalidSelfIp(self_ip))?;
        }

        if let Ok(self_name) = std::env::var("MIMIR_SELF_NAME") {
            if !self_name.is_empty() {
                config.self_name = Some(self_name.trim_end_matches('.').to_lowercase());
            }
        }

        if let Ok(worker_threads) = std::env::var("MIMIR_WORKER_THREADS") {
            config.worker_threads = worker_threads.parse::<usize>().map_err(|_| {
                MimirError::ConfigParse(format!("Invalid worker threads: {}", worker_threads))
            })?;
        }

        if let Ok(max_concurrent) = std::env::var("MIMIR_MAX_CONCURRENT_QUERIES") {
            let max = max_concurrent.parse::<usize>().map_err(|_| {
                MimirError::ConfigParse(format!(
                    "Invalid max concurrent queries: {}",
                    max_concurrent
                ))
            })?;
            if max == 0 {
                return Err(MimirError::ConfigParse(
                    "Max concurrent queries must be greater than 0".to_string(),
                ));
            }
            config.max_concurrent_queries = max;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 53);
        assert_eq!(config.zone_suffix, "bit");
        assert_eq!(config.cache_max_entries, 1000);
        assert!(config.zone_public_key.is_empty());
    }
}
