use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub cache_max_size_mb: u64,
    pub cache_max_item_size: usize,
    pub server_address: String,
    pub idle_timeout_secs: u64,
    pub max_connections: i64,
    pub debug_enabled: bool,
    pub debug_address: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_max_size_mb: 64,
            cache_max_item_size: 1_048_576,
            server_address: "127.0.0.1:11211".to_string(),
            idle_timeout_secs: 60,
            max_connections: 1024,
            debug_enabled: false,
            debug_address: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut c = Self::default();

        if let Ok(v) = env::var("LINECACHED_MAX_SIZE_MB") {
            c.cache_max_size_mb = v.parse().unwrap_or(c.cache_max_size_mb);
        }
        if let Ok(v) = env::var("LINECACHED_MAX_ITEM_SIZE") {
            c.cache_max_item_size = v.parse().unwrap_or(c.cache_max_item_size);
        }
        if let Ok(v) = env::var("LINECACHED_ADDRESS") {
            c.server_address = v;
        }
        if let Ok(v) = env::var("LINECACHED_IDLE_TIMEOUT_SECS") {
            c.idle_timeout_secs = v.parse().unwrap_or(c.idle_timeout_secs);
        }
        if let Ok(v) = env::var("LINECACHED_MAX_CONNECTIONS") {
            c.max_connections = v.parse().unwrap_or(c.max_connections);
        }
        if let Ok(v) = env::var("LINECACHED_DEBUG_ENABLED") {
            c.debug_enabled = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = env::var("LINECACHED_DEBUG_ADDRESS") {
            c.debug_address = v;
        }

        c
    }

    pub fn max_cost_bytes(&self) -> u64 {
        self.cache_max_size_mb * 1024 * 1024
    }
}
