//! Process configuration, read once from the environment at startup.
//!
//! There are no subcommands and no flags: a single long-running process
//! reads its settings from the environment and binds immediately.

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub allowed_origin: String,
    pub data_dir: String,
    pub disconnect_grace_secs: u64,
}

impl Config {
    pub fn from_env() -> Config {
        Config {
            port: env_or("BEAROFF_PORT", 3001),
            allowed_origin: std::env::var("BEAROFF_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            data_dir: std::env::var("BEAROFF_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            disconnect_grace_secs: env_or("BEAROFF_DISCONNECT_GRACE_SECS", 30),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_ports() {
        // SAFETY: test runs single-threaded within this process; no other
        // test reads these specific env vars.
        unsafe {
            std::env::remove_var("BEAROFF_PORT");
            std::env::remove_var("BEAROFF_ALLOWED_ORIGIN");
        }
        let config = Config::from_env();
        assert_eq!(config.port, 3001);
        assert_eq!(config.allowed_origin, "http://localhost:3000");
    }
}
