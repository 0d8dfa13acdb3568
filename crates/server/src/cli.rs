use std::net::IpAddr;

use clap::Parser;

use dataforge_engine::EngineConfig;

fn default_min_threads() -> usize {
    EngineConfig::default_threads().0
}

fn default_max_threads() -> usize {
    EngineConfig::default_threads().1
}

fn parse_size_bytes(input: &str) -> Result<u64, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("size must not be empty".to_string());
    }

    let lower = s.to_ascii_lowercase();
    let (num, scale) = if let Some(raw) = lower.strip_suffix("kib") {
        (raw, 1024u64)
    } else if let Some(raw) = lower.strip_suffix("mib") {
        (raw, 1024u64 * 1024)
    } else if let Some(raw) = lower.strip_suffix("kb") {
        (raw, 1000u64)
    } else if let Some(raw) = lower.strip_suffix("mb") {
        (raw, 1000u64 * 1000)
    } else if let Some(raw) = lower.strip_suffix('b') {
        (raw, 1u64)
    } else {
        // Bare numbers are bytes.
        (lower.as_str(), 1u64)
    };

    let num = num.trim();
    if num.is_empty() {
        return Err(format!("invalid size: {input:?}"));
    }

    let value: u64 = num
        .parse()
        .map_err(|_| format!("invalid size number: {input:?}"))?;

    value
        .checked_mul(scale)
        .ok_or_else(|| format!("size too large: {input:?}"))
}

#[derive(Debug, Clone, Parser)]
#[command(name = "dataforge", version, about = "JSON-Schema synthetic record service")]
pub struct Cli {
    /// Address to bind.
    #[arg(long, env = "DATAFORGE_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(short = 'p', long, env = "DATAFORGE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Maximum request body size (e.g. `10MB`).
    #[arg(
        long = "body-limit",
        env = "DATAFORGE_BODY_LIMIT",
        default_value = "10MB",
        value_parser = parse_size_bytes
    )]
    pub body_limit_bytes: u64,

    /// API key required on protected endpoints. Auth is disabled when unset.
    #[arg(long = "api-key", env = "DATAFORGE_API_KEY")]
    pub api_key: Option<String>,

    /// Client addresses allowed on protected endpoints (comma separated).
    /// Empty means every address is allowed.
    #[arg(long, env = "DATAFORGE_WHITELIST", value_delimiter = ',')]
    pub whitelist: Vec<IpAddr>,

    /// Abort-store URL (e.g. `redis://127.0.0.1:6379`). Stop marks are
    /// disabled when unset.
    #[arg(long = "abort-store-url", env = "DATAFORGE_ABORT_STORE_URL")]
    pub abort_store_url: Option<String>,

    /// Key prefix for abort-store stop marks.
    #[arg(
        long = "abort-store-prefix",
        env = "DATAFORGE_ABORT_STORE_PREFIX",
        default_value = "dataforge:"
    )]
    pub abort_store_prefix: String,

    /// Lower bound of the generation worker pool.
    #[arg(
        long = "min-threads",
        env = "DATAFORGE_MIN_THREADS",
        default_value_t = default_min_threads()
    )]
    pub min_threads: usize,

    /// Upper bound of the generation worker pool.
    #[arg(
        long = "max-threads",
        env = "DATAFORGE_MAX_THREADS",
        default_value_t = default_max_threads()
    )]
    pub max_threads: usize,

    /// Tracing filter (e.g. `info,dataforge_engine=debug`).
    #[arg(long = "log-filter", env = "DATAFORGE_LOG", default_value = "info")]
    pub log_filter: String,

    /// Seconds to wait for in-flight work at shutdown.
    #[arg(
        long = "drain-timeout",
        env = "DATAFORGE_DRAIN_TIMEOUT",
        default_value_t = 15
    )]
    pub drain_timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::parse_size_bytes;

    #[test]
    fn parses_common_size_suffixes() {
        assert_eq!(parse_size_bytes("10MB").unwrap(), 10_000_000);
        assert_eq!(parse_size_bytes("64kib").unwrap(), 65_536);
        assert_eq!(parse_size_bytes("123").unwrap(), 123);
        assert_eq!(parse_size_bytes("1b").unwrap(), 1);
    }

    #[test]
    fn rejects_garbage_sizes() {
        assert!(parse_size_bytes("").is_err());
        assert!(parse_size_bytes("mb").is_err());
        assert!(parse_size_bytes("ten").is_err());
    }
}
