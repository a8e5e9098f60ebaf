use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_LOG_FILTER: &str = "info,selah_backend_rust=debug";

/// Process-level settings. Database and auth settings live with their own
/// modules; this covers the listener and the log filter.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_parsed("HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: env_parsed("PORT", DEFAULT_PORT),
            log_filter: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parsed_falls_back_on_missing_or_garbage() {
        assert_eq!(env_parsed("SELAH_NO_SUCH_VAR", 7u16), 7);

        std::env::set_var("SELAH_GARBAGE_PORT", "not-a-port");
        assert_eq!(env_parsed("SELAH_GARBAGE_PORT", 7u16), 7);
        std::env::remove_var("SELAH_GARBAGE_PORT");
    }

    #[test]
    fn test_bind_addr_combines_host_and_port() {
        let config = Config {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 4321,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        };
        assert_eq!(config.bind_addr().to_string(), "127.0.0.1:4321");
    }
}
